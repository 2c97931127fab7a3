use super::operations::{Condition, Operation, OperationContext};
use crate::core::document::StageStatus;
use crate::core::job::{Job, Project};
use crate::engine::config::PipelineConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::runner::Executor;
use crate::engine::state::JobState;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub num_passes: usize,
    /// Restrict to these operations; empty means all.
    pub operations: Vec<Operation>,
    pub group: Option<String>,
    /// Restrict to these job ids or id prefixes; empty means all jobs.
    pub job_ids: Vec<String>,
    /// Leave a job alone for the rest of the run once one of its operations fails.
    pub fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            num_passes: 1,
            operations: Vec::new(),
            group: None,
            job_ids: Vec::new(),
            fail_fast: false,
        }
    }
}

impl RunOptions {
    fn selects(&self, op: Operation) -> bool {
        (self.operations.is_empty() || self.operations.contains(&op))
            && self.group.as_deref().is_none_or(|g| op.in_group(g))
    }
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub labels: Vec<&'static str>,
    pub eligible: Vec<Operation>,
    pub stages: BTreeMap<String, StageStatus>,
}

#[derive(Debug)]
pub struct OperationFailure {
    pub job_id: String,
    pub operation: Operation,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub passes: usize,
    pub executed: Vec<(String, Operation)>,
    pub failures: Vec<OperationFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of distinct jobs with at least one failed operation.
    pub fn failed_jobs(&self) -> usize {
        let mut ids: Vec<&str> = self.failures.iter().map(|f| f.job_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

#[derive(Default)]
struct JobPass {
    executed: Vec<Operation>,
    failure: Option<(Operation, EngineError)>,
}

fn select_jobs(project: &Project, job_ids: &[String]) -> Result<Vec<Job>, EngineError> {
    if job_ids.is_empty() {
        return Ok(project.jobs()?);
    }
    let mut jobs: Vec<Job> = Vec::with_capacity(job_ids.len());
    for id in job_ids {
        let job = project.job(id)?;
        if !jobs.iter().any(|j| j.id() == job.id()) {
            jobs.push(job);
        }
    }
    Ok(jobs)
}

pub fn job_status(job: &Job, config: &PipelineConfig) -> JobStatus {
    JobStatus {
        job_id: job.id().to_string(),
        state: JobState::observe(job, config),
        labels: Condition::LABELS
            .iter()
            .filter(|c| c.holds(job, config))
            .map(|c| c.name())
            .collect(),
        eligible: Operation::ALL
            .into_iter()
            .filter(|op| op.is_eligible(job, config))
            .collect(),
        stages: job.document().stages.clone(),
    }
}

/// Reports state, labels and eligible operations for the selected jobs.
pub fn status(
    project: &Project,
    config: &PipelineConfig,
    job_ids: &[String],
) -> Result<Vec<JobStatus>, EngineError> {
    Ok(select_jobs(project, job_ids)?
        .iter()
        .map(|job| job_status(job, config))
        .collect())
}

fn run_job_pass(
    job: &mut Job,
    ctx: OperationContext<'_>,
    options: &RunOptions,
    reporter: &ProgressReporter,
) -> JobPass {
    let mut pass = JobPass::default();
    for op in Operation::ALL {
        if !options.selects(op) || !op.is_eligible(job, ctx.config) {
            continue;
        }
        reporter.report(Progress::OperationStart {
            job_id: job.id().to_string(),
            operation: op.name(),
        });
        info!("Executing {} on job {}.", op, job.short_id());
        let result = op.execute(job, ctx);
        reporter.report(Progress::OperationFinish {
            job_id: job.id().to_string(),
            operation: op.name(),
            success: result.is_ok(),
        });
        match result {
            Ok(()) => pass.executed.push(op),
            Err(e) => {
                error!("Operation {} failed on job {}: {}", op, job.short_id(), e);
                reporter.report(Progress::Message(format!(
                    "{} failed on job {}: {}",
                    op,
                    job.short_id(),
                    e
                )));
                pass.failure = Some((op, e));
                break;
            }
        }
    }
    pass
}

/// Runs eligible operations over the selected jobs for up to `num_passes` passes.
///
/// Within a pass, each job walks the operation table in declaration order and
/// re-checks eligibility before every operation. Jobs run in parallel. A job
/// whose operation fails stops for the current pass and is retried on the next
/// one, unless `fail_fast` is set.
#[instrument(skip_all, name = "flow_run")]
pub fn run(
    project: &Project,
    config: &PipelineConfig,
    executor: &dyn Executor,
    reporter: &ProgressReporter,
    options: &RunOptions,
) -> Result<RunReport, EngineError> {
    let mut jobs = select_jobs(project, &options.job_ids)?;
    let ctx = OperationContext { config, executor };
    let mut report = RunReport::default();

    for pass in 1..=options.num_passes {
        reporter.report(Progress::PassStart {
            pass,
            total_passes: options.num_passes,
        });
        reporter.report(Progress::TaskStart {
            total_steps: jobs.len() as u64,
        });

        let results: Vec<JobPass> = jobs
            .par_iter_mut()
            .map(|job| {
                let outcome = run_job_pass(job, ctx, options, reporter);
                reporter.report(Progress::TaskIncrement);
                outcome
            })
            .collect();
        reporter.report(Progress::TaskFinish);
        report.passes = pass;

        let mut ran = 0;
        let mut failed_ids = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            ran += result.executed.len();
            report
                .executed
                .extend(result.executed.into_iter().map(|op| (job.id().to_string(), op)));
            if let Some((operation, error)) = result.failure {
                failed_ids.push(job.id().to_string());
                report.failures.push(OperationFailure {
                    job_id: job.id().to_string(),
                    operation,
                    error,
                });
            }
        }
        if options.fail_fast {
            jobs.retain(|job| !failed_ids.iter().any(|id| id == job.id()));
        }

        reporter.report(Progress::PassFinish {
            operations_run: ran,
        });
        info!("Pass {} executed {} operation(s).", pass, ran);
        if ran == 0 {
            break;
        }
    }

    if !report.failures.is_empty() {
        warn!(
            "{} operation failure(s) across {} job(s).",
            report.failures.len(),
            report.failed_jobs()
        );
    }
    Ok(report)
}

/// Executes one operation on the selected jobs regardless of its conditions.
#[instrument(skip_all, fields(operation = %operation))]
pub fn exec(
    project: &Project,
    config: &PipelineConfig,
    executor: &dyn Executor,
    operation: Operation,
    job_ids: &[String],
) -> Result<Vec<(String, Result<(), EngineError>)>, EngineError> {
    let ctx = OperationContext { config, executor };
    let mut results = Vec::new();
    for mut job in select_jobs(project, job_ids)? {
        if !operation.preconditions().iter().all(|c| c.holds(&job, config)) {
            warn!(
                "Preconditions of {} do not hold for job {}; executing anyway.",
                operation,
                job.short_id()
            );
        }
        let result = operation.execute(&mut job, ctx);
        if let Err(e) = &result {
            error!("{} failed on job {}: {}", operation, job.short_id(), e);
        }
        results.push((job.id().to_string(), result));
    }
    Ok(results)
}
