//! Output dataset naming.
//!
//! Derives the grid output dataset name for an input dataset. The result is
//! deterministic and bounded by [`MAX_DATASET_NAME_LENGTH`], counting the
//! submission suffix and a trailing separator.
//!
//! ```text
//! mc12_8TeV.999999.someProcess.merge.NTUP_SUSY.r4485_p1512/
//!   -> user.alice.mc12_8TeV.999999.someProcess.SusyNt.r4485_p1512_n0146/
//! ```

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NamingConstraintWarning;
use crate::rules::NamingRules;

/// Hard ceiling enforced by the grid catalogue on dataset names.
pub const MAX_DATASET_NAME_LENGTH: usize = 132;

/// Physics group used when submitting with the production role.
pub const GROUP_LABEL: &str = "phys-susy";

/// Separator sequences that must not survive in a final name, with their
/// single-character replacement.
const SEPARATOR_FIXES: [(&str, &str); 4] = [("__", "_"), ("..", "."), ("_.", "."), ("._", ".")];

/// Per-run naming inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingContext {
    /// Ntuple production tag appended to every output (e.g. `n0146`).
    pub tag: String,
    /// Grid nickname used for user-scoped outputs.
    pub nickname: String,
    /// Name outputs under the physics group instead of the user.
    pub use_group_role: bool,
    /// Suffix the submission tool appends to the output name (e.g. `_nt`).
    pub prun_suffix: String,
}

impl NamingContext {
    pub fn new(tag: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            nickname: nickname.into(),
            use_group_role: false,
            prun_suffix: String::new(),
        }
    }

    pub fn with_group_role(mut self, use_group_role: bool) -> Self {
        self.use_group_role = use_group_role;
        self
    }

    pub fn with_prun_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.prun_suffix = suffix.into();
        self
    }

    /// Scope prefix of every output name (`group.phys-susy.` or `user.<nick>.`).
    pub fn prefix(&self) -> String {
        if self.use_group_role {
            group_prefix()
        } else {
            format!("user.{}.", self.nickname)
        }
    }
}

fn group_prefix() -> String {
    format!("group.{GROUP_LABEL}.")
}

/// A derived output dataset name plus any length violation it still carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDatasetName {
    name: String,
    warning: Option<NamingConstraintWarning>,
}

impl OutputDatasetName {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn into_string(self) -> String {
        self.name
    }

    /// Set when the name is over the length ceiling even after shortening.
    pub fn warning(&self) -> Option<&NamingConstraintWarning> {
        self.warning.as_ref()
    }

    pub fn is_over_length(&self) -> bool {
        self.warning.is_some()
    }
}

impl fmt::Display for OutputDatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for OutputDatasetName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Derives output dataset names for one run.
#[derive(Debug, Clone)]
pub struct DatasetNamer<'a> {
    context: &'a NamingContext,
    rules: &'a NamingRules,
    middle_tags: Regex,
}

impl<'a> DatasetNamer<'a> {
    pub fn new(context: &'a NamingContext, rules: &'a NamingRules) -> Self {
        // Everything between "<marker>." and the last "_<anything>_<tag>".
        let pattern = format!(
            r"\.{}\.(?P<middle>.*)_.*_{}",
            regex::escape(&rules.canonical_marker),
            regex::escape(&context.tag)
        );
        let middle_tags = Regex::new(&pattern).expect("escaped literals always form a valid regex");

        Self {
            context,
            rules,
            middle_tags,
        }
    }

    /// Derives the output name for `input`.
    ///
    /// Never fails. When the result is still too long, the returned name
    /// carries a [`NamingConstraintWarning`] for the caller to report.
    pub fn name(&self, input: &str) -> OutputDatasetName {
        let ctx = self.context;
        let mut name = format!("{}{}_{}/", ctx.prefix(), input.replace('/', ""), ctx.tag);

        name = self.rules.normalize.apply(&name);
        name = collapse_group_prefix(&name);
        name = self.rules.abbreviate.apply(&name);

        if self.suffixed_len(&name) > MAX_DATASET_NAME_LENGTH {
            name = self.drop_middle_tags(&name);
        }

        let name = collapse_separators(&name);
        let length = self.suffixed_len(&name);
        let warning = (length > MAX_DATASET_NAME_LENGTH).then(|| NamingConstraintWarning {
            name: name.clone(),
            length,
            limit: MAX_DATASET_NAME_LENGTH,
        });

        OutputDatasetName { name, warning }
    }

    fn suffixed_len(&self, name: &str) -> usize {
        name.len() + self.context.prun_suffix.len() + 1
    }

    /// Last resort shortening: removes the processing tags between the
    /// canonical marker and the final tag before the naming tag.
    fn drop_middle_tags(&self, name: &str) -> String {
        let Some(middle) = self
            .middle_tags
            .captures(name)
            .and_then(|caps| caps.name("middle"))
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty())
        else {
            debug!(name, "No middle tags to drop from over-length name");
            return name.to_string();
        };

        debug!(name, middle, "Dropping middle tags from over-length name");
        name.replace(middle, "")
    }
}

/// Removes the first group prefix when it occurs more than once.
///
/// Inputs that are themselves group outputs (group-produced data skims, for
/// instance) already carry the prefix, so group-role naming doubles it.
pub fn collapse_group_prefix(name: &str) -> String {
    let prefix = group_prefix();
    if name.matches(prefix.as_str()).count() > 1 {
        name.replacen(prefix.as_str(), "", 1)
    } else {
        name.to_string()
    }
}

/// Rewrites doubled separators and separator-dot pairs until none remain.
pub fn collapse_separators(name: &str) -> String {
    let mut name = name.to_string();
    while SEPARATOR_FIXES.iter().any(|(bad, _)| name.contains(bad)) {
        for (bad, good) in SEPARATOR_FIXES {
            name = name.replace(bad, good);
        }
    }
    name
}
