use super::load_context;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use mcccs_flow::engine::progress::ProgressReporter;
use mcccs_flow::engine::runner::ShellExecutor;
use mcccs_flow::workflows::flow::{self, RunOptions};
use mcccs_flow::workflows::operations::{GROUP_EX, Operation};
use tracing::{error, info};

fn run_options(args: &RunArgs) -> Result<RunOptions> {
    if args.num_passes == 0 {
        return Err(CliError::Argument(
            "--num-passes must be at least 1".to_string(),
        ));
    }
    if let Some(group) = &args.group {
        if group != GROUP_EX {
            return Err(CliError::Argument(format!(
                "Unknown operation group '{}'. Known groups: {}",
                group, GROUP_EX
            )));
        }
    }
    let operations = args
        .operations
        .iter()
        .map(|name| Operation::from_name(name))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RunOptions {
        num_passes: args.num_passes,
        operations,
        group: args.group.clone(),
        job_ids: args.jobs.clone(),
        fail_fast: args.fail_fast,
    })
}

pub async fn run(args: RunArgs) -> Result<()> {
    let options = run_options(&args)?;
    let (project, config) = load_context(&args.project)?;
    let executor = ShellExecutor::from_config(&config);

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Running up to {} pass(es) over {}...",
        options.num_passes,
        project.root().display()
    );
    info!("Invoking the orchestrator...");

    let report = tokio::task::block_in_place(|| {
        flow::run(&project, &config, &executor, &reporter, &options)
    })?;

    println!(
        "Executed {} operation(s) in {} pass(es).",
        report.executed.len(),
        report.passes
    );
    for failure in &report.failures {
        error!(
            "Job {} failed at {}: {}",
            failure.job_id, failure.operation, failure.error
        );
        eprintln!(
            "  ✗ {} {}: {}",
            failure.job_id.get(..8).unwrap_or(&failure.job_id),
            failure.operation,
            failure.error
        );
    }

    if report.succeeded() {
        Ok(())
    } else {
        Err(CliError::JobsFailed {
            failed: report.failed_jobs(),
        })
    }
}
