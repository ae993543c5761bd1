//! Grid job command assembly.
//!
//! Two commands are built per job: the executable run on the worker node
//! (`gridScript.sh` with its physics options) and the `prun` invocation that
//! submits it with the input and output datasets.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::era::McProduction;
use crate::manifest::JobDefinition;

/// Worker-node executable, relative to the submitted tarball.
pub const GRID_SCRIPT: &str = "./bash/gridScript.sh";

/// Output stream name registered with prun. Setting it explicitly keeps prun
/// from appending its own default suffix to the output dataset.
pub const OUTPUT_STREAM: &str = "nt";

/// File written by the grid executable.
pub const OUTPUT_FILE: &str = "susyNt.root";

/// Extra sites that receive group-role outputs.
pub const GROUP_STORAGE_SITES: [&str; 2] = ["SWT2_CPB_PHYS-SUSY", "LRZ-LMU_PHYS-SUSY"];

const ROOT_VERSION: &str = "5.34/18";
const DEFAULT_CMT_CONFIG: &str = "x86_64-slc6-gcc47-opt";
const SAFETY_SIZE_MB: u32 = 600;
const PRODUCTION_VOMS_ROLE: &str = "atlas:/atlas/phys-susy/Role=production";

static FAST_SIM_TAG: OnceLock<Regex> = OnceLock::new();

/// Suffix prun adds to the output dataset name.
pub fn prun_suffix() -> String {
    format!("_{OUTPUT_STREAM}")
}

/// True when the dataset carries an ATLFAST-II (`_a<digits>_`) tag.
pub fn is_fast_simulation(dataset: &str) -> bool {
    FAST_SIM_TAG
        .get_or_init(|| Regex::new(r"_a[0-9]*_").expect("static regex is valid"))
        .is_match(dataset)
}

/// Missing transverse momentum flavor used by the ntuple maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum MetFlavor {
    #[value(name = "STVF")]
    Stvf,
    #[value(name = "STVF_JVF")]
    StvfJvf,
    #[default]
    #[value(name = "Default")]
    Default,
}

impl MetFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetFlavor::Stvf => "STVF",
            MetFlavor::StvfJvf => "STVF_JVF",
            MetFlavor::Default => "Default",
        }
    }
}

impl fmt::Display for MetFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options forwarded to the grid executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridOptions {
    pub met: MetFlavor,
    pub n_lep_filter: u32,
    pub n_lep_tau_filter: u32,
    pub do_met_fix: bool,
    pub filter_trig: bool,
    pub save_truth: bool,
    pub filter_off: bool,
    pub systematics: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            met: MetFlavor::Default,
            n_lep_filter: 1,
            n_lep_tau_filter: 2,
            do_met_fix: false,
            filter_trig: false,
            save_truth: false,
            filter_off: false,
            systematics: true,
        }
    }
}

/// How prun splits the input into jobs. Exactly one is passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobSizing {
    FilesPerJob(u32),
    /// Gigabytes per job, or `MAX`.
    GbPerJob(String),
}

impl Default for JobSizing {
    fn default() -> Self {
        JobSizing::GbPerJob("MAX".to_string())
    }
}

/// Options for the prun submission itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunOptions {
    pub dest_se: String,
    pub sizing: JobSizing,
    /// Comma separated sites to exclude, passed verbatim.
    pub excluded_sites: String,
    pub use_group_role: bool,
    /// Replicate group outputs to the group storage sites as well.
    pub store_at_group_sites: bool,
    pub no_submit: bool,
    pub use_short_lived_replicas: bool,
    pub cmt_config: Option<String>,
}

impl Default for PrunOptions {
    fn default() -> Self {
        Self {
            dest_se: "SLACXRD_SCRATCHDISK".to_string(),
            sizing: JobSizing::default(),
            excluded_sites: String::new(),
            use_group_role: false,
            store_at_group_sites: true,
            no_submit: false,
            use_short_lived_replicas: false,
            cmt_config: None,
        }
    }
}

impl PrunOptions {
    fn destinations(&self) -> String {
        if self.use_group_role && self.store_at_group_sites {
            std::iter::once(self.dest_se.as_str())
                .chain(GROUP_STORAGE_SITES)
                .collect::<Vec<_>>()
                .join(",")
        } else {
            self.dest_se.clone()
        }
    }
}

/// A fully assembled job, ready for hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobCommand {
    pub input_dataset: String,
    pub output_dataset: String,
    pub sample: String,
    pub production: Option<String>,
    pub grid_command: String,
    pub prun_command: String,
}

/// Builds the grid and prun commands for a job.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    grid: &'a GridOptions,
    prun: &'a PrunOptions,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(grid: &'a GridOptions, prun: &'a PrunOptions) -> Self {
        Self { grid, prun }
    }

    /// Command line of the worker-node executable.
    pub fn grid_command(
        &self,
        definition: &JobDefinition,
        sample: &str,
        production: Option<McProduction>,
    ) -> String {
        let grid = self.grid;
        let mut args = vec![
            GRID_SCRIPT.to_string(),
            "%IN".to_string(),
            format!("--metFlav {}", grid.met),
            format!("--nLepFilter {}", grid.n_lep_filter),
            format!("--nLepTauFilter {}", grid.n_lep_tau_filter),
            format!("-w {}", definition.sum_of_weights),
            format!("-x {}", definition.cross_section),
            format!("-s {}", sample),
            format!("--errXsec {}", definition.cross_section_error),
        ];

        if let Some(production) = production {
            args.push(format!("-p {}", production));
        }

        // Container taus are always stored.
        args.push("--saveContTau".to_string());

        let flags = [
            (grid.do_met_fix, "--doMetFix"),
            (grid.filter_trig, "--filterTrig"),
            (grid.save_truth, "--saveTruth"),
            (grid.filter_off, "--filterOff"),
            (grid.systematics, "--sys"),
            (is_fast_simulation(&definition.dataset), "--af2"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| flag.to_string()),
        );

        args.join(" ")
    }

    /// The prun invocation submitting `grid_command`.
    pub fn prun_command(&self, input: &str, output: &str, grid_command: &str) -> String {
        let prun = self.prun;
        let mut args = vec![
            "prun".to_string(),
            format!("--exec \"{}\"", grid_command),
            "--useRootCore".to_string(),
            "--tmpDir /tmp".to_string(),
            format!("--inDS {}", input),
            format!("--outDS {}", output),
            "--inTarBall=area.tar".to_string(),
            "--extFile \"*.so,*.root\"".to_string(),
            "--match \"*root*\"".to_string(),
            format!("--safetySize={}", SAFETY_SIZE_MB),
            format!("--outputs \"{}:{}\"", OUTPUT_STREAM, OUTPUT_FILE),
            format!("--destSE={}", prun.destinations()),
            format!("--rootVer={}", ROOT_VERSION),
            format!("--cmtConfig={}", DEFAULT_CMT_CONFIG),
            format!("--excludedSite={}", prun.excluded_sites),
        ];

        if prun.use_group_role {
            args.push("--official".to_string());
            args.push(format!("--voms {}", PRODUCTION_VOMS_ROLE));
        }

        args.push(match &prun.sizing {
            JobSizing::FilesPerJob(n) => format!("--nFilesPerJob={}", n),
            JobSizing::GbPerJob(gb) => format!("--nGBPerJob={}", gb),
        });

        if prun.no_submit {
            args.push("--noSubmit".to_string());
        }
        if prun.use_short_lived_replicas {
            args.push("--useShortLivedReplicas".to_string());
        }
        if let Some(cmt) = &prun.cmt_config {
            args.push(format!("--cmtConfig {}", cmt));
        }

        args.join(" ")
    }
}
