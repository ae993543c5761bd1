//! Ordered replacement tables used for naming.
//!
//! The tables are data, not code: the default set is embedded from
//! `rules/default.yaml` and a different file can be loaded at startup to add
//! campaign-label mappings without touching the naming algorithm.
//!
//! # Example
//!
//! ```ignore
//! use ntsubmit::rules::NamingRules;
//!
//! let rules = NamingRules::builtin()?;
//! assert_eq!(rules.abbreviate.apply("ttbar_2LeptonFilter"), "ttbar_2L");
//! ```

use std::fs;
use std::path::Path;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RulesError;

/// Rules schema version understood by this build.
pub const RULES_VERSION: u32 = 1;

const BUILTIN_RULES: &str = include_str!("../rules/default.yaml");

/// A single `(pattern, replacement)` pair as written in the rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regular expression; every match is rewritten.
    pub pattern: String,
    /// Literal replacement text (no capture expansion).
    #[serde(default)]
    pub replacement: String,
}

/// On-disk layout of a rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesFile {
    pub version: u32,
    pub canonical_marker: String,
    #[serde(default)]
    pub normalize: Vec<RuleSpec>,
    #[serde(default)]
    pub abbreviate: Vec<RuleSpec>,
    #[serde(default)]
    pub sample: Vec<RuleSpec>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    replacement: String,
}

/// An ordered list of compiled replacement rules.
#[derive(Debug, Clone)]
pub struct RuleTable {
    name: &'static str,
    specs: Vec<RuleSpec>,
    rules: Vec<CompiledRule>,
}

impl RuleTable {
    /// Compiles a table, failing on the first invalid pattern.
    pub fn compile(name: &'static str, specs: Vec<RuleSpec>) -> Result<Self, RulesError> {
        let rules = specs
            .iter()
            .map(|spec| {
                Regex::new(&spec.pattern)
                    .map(|regex| CompiledRule {
                        regex,
                        replacement: spec.replacement.clone(),
                    })
                    .map_err(|source| RulesError::InvalidPattern {
                        table: name,
                        pattern: spec.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name, specs, rules })
    }

    /// Applies every rule in order, each one to the output of the previous.
    pub fn apply(&self, input: &str) -> String {
        self.rules.iter().fold(input.to_string(), |text, rule| {
            rule.regex
                .replace_all(&text, NoExpand(&rule.replacement))
                .into_owned()
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn specs(&self) -> &[RuleSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The complete set of tables consumed by the namer and the sample labeler.
#[derive(Debug, Clone)]
pub struct NamingRules {
    pub version: u32,
    /// Label the normalize table assigns to derived ntuples (`SusyNt`).
    pub canonical_marker: String,
    pub normalize: RuleTable,
    pub abbreviate: RuleTable,
    pub sample: RuleTable,
}

impl NamingRules {
    /// Loads the tables shipped with the crate.
    pub fn builtin() -> Result<Self, RulesError> {
        Self::from_yaml_str(BUILTIN_RULES)
    }

    /// Loads tables from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parses and compiles tables from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, RulesError> {
        let file: RulesFile = serde_yaml::from_str(content)?;
        Self::from_file(file)
    }

    pub fn from_file(file: RulesFile) -> Result<Self, RulesError> {
        if file.version != RULES_VERSION {
            return Err(RulesError::UnsupportedVersion {
                found: file.version,
                expected: RULES_VERSION,
            });
        }
        if file.canonical_marker.trim().is_empty() {
            return Err(RulesError::MissingMarker);
        }

        let rules = Self {
            version: file.version,
            canonical_marker: file.canonical_marker,
            normalize: RuleTable::compile("normalize", file.normalize)?,
            abbreviate: RuleTable::compile("abbreviate", file.abbreviate)?,
            sample: RuleTable::compile("sample", file.sample)?,
        };
        for table in rules.tables() {
            debug!(table = table.name(), rules = table.len(), "Compiled rule table");
        }
        Ok(rules)
    }

    /// The tables in application order.
    pub fn tables(&self) -> [&RuleTable; 3] {
        [&self.normalize, &self.abbreviate, &self.sample]
    }

    /// Returns the tables in their serializable form.
    pub fn to_file(&self) -> RulesFile {
        RulesFile {
            version: self.version,
            canonical_marker: self.canonical_marker.clone(),
            normalize: self.normalize.specs().to_vec(),
            abbreviate: self.abbreviate.specs().to_vec(),
            sample: self.sample.specs().to_vec(),
        }
    }
}
