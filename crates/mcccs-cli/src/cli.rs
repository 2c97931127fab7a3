use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "MCCCS Reproducibility Study Contributors",
    version,
    about = "MCCCS Flow - drives melt, cool, equilibration and production runs of the MCCCS-MN Monte Carlo engine over a parameter sweep.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of jobs processed in parallel.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create one job workspace per state point listed in a sweep file.
    Init(InitArgs),
    /// Show the stage, labels and eligible operations of each job.
    Status(StatusArgs),
    /// Execute eligible operations until every job is done or the pass limit is reached.
    Run(RunArgs),
    /// Execute one operation on the chosen jobs, ignoring its preconditions.
    Exec(ExecArgs),
}

/// Arguments for the `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project root; created if it does not exist.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub project: PathBuf,

    /// TOML file with a `[[statepoint]]` array.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub statepoints: PathBuf,
}

/// Project location and pipeline overrides shared by the job-driving subcommands.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root containing the `workspace/` directory.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub project: PathBuf,

    /// Pipeline configuration in TOML format.
    /// Defaults to `mcccs-flow.toml` in the project root, if present.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the path of the engine executable.
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Override the directory holding the per-molecule input sets.
    #[arg(long, value_name = "DIR")]
    pub engine_input: Option<PathBuf>,

    /// Override the number of production replicates per job.
    #[arg(long, value_name = "INT")]
    pub num_prod_replicates: Option<u32>,

    /// Let jobs with missing templates count as ready when the present ones are resolved.
    #[arg(long)]
    pub tolerate_missing_templates: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S pipeline.num-prod-replicates=8
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `status` subcommand.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Restrict to these job ids or unique id prefixes.
    #[arg(long = "job", value_name = "ID")]
    pub jobs: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Only execute these operations. Can be used multiple times.
    #[arg(short, long = "operation", value_name = "NAME")]
    pub operations: Vec<String>,

    /// Only execute operations of this group (e.g. 'ex').
    #[arg(short, long, value_name = "NAME")]
    pub group: Option<String>,

    /// Restrict to these job ids or unique id prefixes.
    #[arg(long = "job", value_name = "ID")]
    pub jobs: Vec<String>,

    /// Maximum number of passes over the operation table.
    #[arg(short = 'n', long, default_value_t = 1, value_name = "INT")]
    pub num_passes: usize,

    /// Stop driving a job for the rest of the run once one of its operations fails.
    #[arg(long)]
    pub fail_fast: bool,
}

/// Arguments for the `exec` subcommand.
#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Name of the operation to execute (e.g. 'run_melt').
    #[arg(required = true, value_name = "OPERATION")]
    pub operation: String,

    /// Restrict to these job ids or unique id prefixes.
    #[arg(long = "job", value_name = "ID")]
    pub jobs: Vec<String>,
}
