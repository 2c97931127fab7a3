use super::load_context;
use crate::cli::ExecArgs;
use crate::error::{CliError, Result};
use mcccs_flow::engine::runner::ShellExecutor;
use mcccs_flow::workflows::flow;
use mcccs_flow::workflows::operations::Operation;
use tracing::info;

pub async fn run(args: ExecArgs) -> Result<()> {
    let operation = Operation::from_name(&args.operation)?;
    let (project, config) = load_context(&args.project)?;
    let executor = ShellExecutor::from_config(&config);

    info!("Executing {} regardless of eligibility.", operation);
    let results = tokio::task::block_in_place(|| {
        flow::exec(&project, &config, &executor, operation, &args.jobs)
    })?;

    let mut failed = 0;
    for (job_id, result) in &results {
        let short = job_id.get(..8).unwrap_or(job_id);
        match result {
            Ok(()) => println!("✓ {} {}", short, operation),
            Err(e) => {
                failed += 1;
                eprintln!("✗ {} {}: {}", short, operation, e);
            }
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::JobsFailed { failed })
    }
}
