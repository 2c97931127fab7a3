pub mod exec;
pub mod init;
pub mod run;
pub mod status;

use crate::cli::ProjectArgs;
use crate::config::PartialProjectConfig;
use crate::error::Result;
use mcccs_flow::core::job::Project;
use mcccs_flow::engine::config::PipelineConfig;
use tracing::{info, warn};

/// Opens the project and resolves its pipeline configuration.
fn load_context(args: &ProjectArgs) -> Result<(Project, PipelineConfig)> {
    let project = Project::open(&args.project)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = PartialProjectConfig::locate(args)?.merge_with_cli(args)?;
    if !config.engine.executable.is_file() {
        warn!(
            "Engine executable {:?} does not exist; stage runs will fail.",
            config.engine.executable
        );
    }
    Ok((project, config))
}
