//! CLI command definitions for ntsubmit.
//!
//! `submit` processes dataset manifests and hands one prun command per
//! dataset to the grid tools; `name` previews output dataset names; `rules`
//! prints the replacement tables in effect.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::command::{prun_suffix, JobSizing, MetFlavor};
use crate::config::{
    load_site_blacklist, JobKind, SubmitConfig, DEFAULT_BLACKLIST, DEFAULT_NICKNAME, DEFAULT_TAG,
};
use crate::naming::{DatasetNamer, NamingContext, MAX_DATASET_NAME_LENGTH};
use crate::orchestrator::SubmissionOrchestrator;
use crate::rules::NamingRules;
use crate::submit::{PrunSubmitter, RecordingSubmitter, Submitter};

/// Grid submission helper for ntuple production.
#[derive(Parser)]
#[command(name = "ntsubmit")]
#[command(about = "Submit ntuple production jobs for dataset manifests")]
#[command(version)]
#[command(
    long_about = "ntsubmit reads dataset manifests, derives output dataset names and submits one prun job per dataset.\n\nExample usage:\n  ntsubmit submit susy -f dgemt.txt\n  ntsubmit submit data -p periodB -t n9999"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Submit grid jobs for the datasets in one or more manifests.
    Submit(Box<SubmitArgs>),

    /// Print the output dataset names derived for the given datasets.
    Name(NameArgs),

    /// Print the naming rule tables in effect.
    Rules(RulesArgs),
}

/// Arguments for `ntsubmit submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Job category; selects default manifests and selection pattern.
    #[arg(value_enum)]
    pub job: JobKind,

    /// Manifest files with datasets (overrides the job defaults).
    #[arg(short = 'f', long, num_args = 1..)]
    pub input_files: Vec<PathBuf>,

    /// Pattern selecting manifest lines (overrides the job default).
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Match the selection pattern case-insensitively.
    #[arg(long)]
    pub ignore_case: bool,

    /// Ntuple tag to assign.
    #[arg(short, long, default_value = DEFAULT_TAG, env = "NTSUBMIT_TAG")]
    pub tag: String,

    /// Log the full prun command of every job.
    #[arg(short, long)]
    pub verbose: bool,

    /// Grid nickname, used for naming user output datasets.
    #[arg(long, default_value = DEFAULT_NICKNAME, env = "NTSUBMIT_NICKNAME")]
    pub nickname: String,

    /// Replicate output datasets to this site.
    #[arg(long = "dest-se", alias = "destSE", default_value = "SLACXRD_SCRATCHDISK")]
    pub dest_se: String,

    /// MET flavor to use.
    #[arg(long, value_enum, default_value_t = MetFlavor::Default)]
    pub met: MetFlavor,

    /// Turn on the MET electron-jet overlap fix.
    #[arg(long, alias = "doMetFix")]
    pub do_met_fix: bool,

    /// Number of preselected light leptons to filter on.
    #[arg(long, alias = "nLepFilter", default_value = "1")]
    pub n_lep_filter: u32,

    /// Number of preselected light leptons plus taus to filter on.
    #[arg(long, alias = "nLepTauFilter", default_value = "2")]
    pub n_lep_tau_filter: u32,

    /// Turn on the trigger filter.
    #[arg(long, alias = "filterTrig")]
    pub filter_trig: bool,

    /// Disable systematic variations.
    #[arg(long)]
    pub no_sys: bool,

    /// Store truth information.
    #[arg(long, alias = "saveTruth")]
    pub save_truth: bool,

    /// Disable event filters (GRL ... TileTrip).
    #[arg(long, alias = "filterOff")]
    pub filter_off: bool,

    /// Number of input files per job.
    #[arg(long, alias = "nFilesPerJob", conflicts_with = "n_gb_per_job")]
    pub n_files_per_job: Option<u32>,

    /// Gigabytes of input per job, or MAX (the default).
    #[arg(long, alias = "nGBPerJob")]
    pub n_gb_per_job: Option<String>,

    /// Let prun build everything without submitting.
    #[arg(long, alias = "noSubmit")]
    pub no_submit: bool,

    /// Allow prun to use short-lived replicas.
    #[arg(long, alias = "useShortLivedReplicas")]
    pub use_short_lived_replicas: bool,

    /// Extra cmt config passed to prun.
    #[arg(long, alias = "cmtConfig")]
    pub cmt_config: Option<String>,

    /// Submit with the physics group production role.
    #[arg(long)]
    pub group_role: bool,

    /// Do not replicate group outputs to the group storage sites.
    #[arg(long)]
    pub do_not_store: bool,

    /// File listing sites to exclude.
    #[arg(long, default_value = DEFAULT_BLACKLIST)]
    pub blacklist: PathBuf,

    /// YAML file with naming rule tables (defaults to the built-in tables).
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Build and log commands without running prun.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first failing job instead of skipping it.
    #[arg(long)]
    pub fail_fast: bool,

    /// Output a JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `ntsubmit name`.
#[derive(Parser, Debug)]
pub struct NameArgs {
    /// Input dataset names.
    #[arg(required = true)]
    pub datasets: Vec<String>,

    /// Ntuple tag to assign.
    #[arg(short, long, default_value = DEFAULT_TAG, env = "NTSUBMIT_TAG")]
    pub tag: String,

    /// Grid nickname, used for naming user output datasets.
    #[arg(long, default_value = DEFAULT_NICKNAME, env = "NTSUBMIT_NICKNAME")]
    pub nickname: String,

    /// Name outputs under the physics group.
    #[arg(long)]
    pub group_role: bool,

    /// YAML file with naming rule tables.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `ntsubmit rules`.
#[derive(Parser, Debug)]
pub struct RulesArgs {
    /// YAML file with naming rule tables.
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Submit(args) => {
            run_submit_command(*args).await?;
        }
        Commands::Name(args) => {
            run_name_command(args)?;
        }
        Commands::Rules(args) => {
            run_rules_command(args)?;
        }
    }
    Ok(())
}

fn load_rules(path: Option<&Path>) -> anyhow::Result<NamingRules> {
    match path {
        Some(path) => NamingRules::from_path(path)
            .with_context(|| format!("Failed to load naming rules from {}", path.display())),
        None => NamingRules::builtin().context("Built-in naming rules are invalid"),
    }
}

/// Turns parsed arguments into a run configuration.
fn build_submit_config(args: &SubmitArgs, blacklist: String) -> anyhow::Result<SubmitConfig> {
    let input_files = if args.input_files.is_empty() {
        args.job.default_inputs(Path::new("."))?
    } else {
        args.input_files.clone()
    };

    let mut config = SubmitConfig::new(args.job)
        .with_input_files(input_files)
        .with_tag(&args.tag)
        .with_nickname(&args.nickname)
        .with_group_role(args.group_role);

    if let Some(pattern) = &args.pattern {
        config = config.with_pattern(pattern);
    }
    config.ignore_case = args.ignore_case;
    config.verbose = args.verbose;
    config.fail_fast = args.fail_fast;

    config.grid.met = args.met;
    config.grid.n_lep_filter = args.n_lep_filter;
    config.grid.n_lep_tau_filter = args.n_lep_tau_filter;
    config.grid.do_met_fix = args.do_met_fix;
    config.grid.filter_trig = args.filter_trig;
    config.grid.save_truth = args.save_truth;
    config.grid.filter_off = args.filter_off;
    config.grid.systematics = !args.no_sys;

    config.prun.dest_se = args.dest_se.clone();
    config.prun.sizing = match (&args.n_files_per_job, &args.n_gb_per_job) {
        (Some(files), _) => JobSizing::FilesPerJob(*files),
        (None, Some(gb)) => JobSizing::GbPerJob(gb.clone()),
        (None, None) => JobSizing::default(),
    };
    config.prun.excluded_sites = blacklist;
    config.prun.store_at_group_sites = !args.do_not_store;
    config.prun.no_submit = args.no_submit;
    config.prun.use_short_lived_replicas = args.use_short_lived_replicas;
    config.prun.cmt_config = args.cmt_config.clone();

    config.validate()?;
    Ok(config)
}

async fn run_submit_command(args: SubmitArgs) -> anyhow::Result<()> {
    let rules = load_rules(args.rules.as_deref())?;
    let blacklist = load_site_blacklist(&args.blacklist)
        .with_context(|| format!("Failed to read site blacklist {}", args.blacklist.display()))?;
    let config = build_submit_config(&args, blacklist)?;

    info!(
        job = args.job.as_str(),
        tag = %config.naming.tag,
        pattern = %config.pattern,
        "Submitting"
    );

    let submitter: Arc<dyn Submitter> = if args.dry_run {
        Arc::new(RecordingSubmitter::new())
    } else {
        Arc::new(PrunSubmitter::default())
    };

    let orchestrator = SubmissionOrchestrator::new(config, rules, submitter);
    let summary = orchestrator.run().await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&summary)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        println!("✓ Submission run completed");
        println!(
            "  Jobs: {} attempted, {} submitted, {} failed",
            summary.attempted, summary.submitted, summary.failed
        );
        if summary.length_warnings > 0 {
            println!(
                "  {} output name(s) exceed {} characters",
                summary.length_warnings, MAX_DATASET_NAME_LENGTH
            );
        }
    }

    if summary.failed > 0 {
        anyhow::bail!("{} of {} jobs failed", summary.failed, summary.attempted);
    }
    Ok(())
}

/// JSON output structure for a derived name.
#[derive(Debug, Clone, Serialize)]
pub struct NameOutput {
    pub input: String,
    pub output: String,
    pub length: usize,
    pub over_limit: bool,
}

fn run_name_command(args: NameArgs) -> anyhow::Result<()> {
    let rules = load_rules(args.rules.as_deref())?;
    let context = NamingContext::new(&args.tag, &args.nickname)
        .with_group_role(args.group_role)
        .with_prun_suffix(prun_suffix());
    let namer = DatasetNamer::new(&context, &rules);

    let outputs: Vec<NameOutput> = args
        .datasets
        .iter()
        .map(|dataset| {
            let name = namer.name(dataset);
            if let Some(warning) = name.warning() {
                warn!(%warning, "Output dataset name exceeds the length limit");
            }
            NameOutput {
                input: dataset.clone(),
                length: name.as_str().len() + context.prun_suffix.len() + 1,
                over_limit: name.is_over_length(),
                output: name.into_string(),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        for output in &outputs {
            let marker = if output.over_limit { " (over limit)" } else { "" };
            println!("{}{}", output.output, marker);
        }
    }
    Ok(())
}

fn run_rules_command(args: RulesArgs) -> anyhow::Result<()> {
    let rules = load_rules(args.rules.as_deref())?;
    print!("{}", serde_yaml::to_string(&rules.to_file())?);
    Ok(())
}
