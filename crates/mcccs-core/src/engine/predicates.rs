//! Side-effect-free readiness and completion checks over a job.
//!
//! Every function here only reads the job's workspace and cached document.
//! Persisting an observation (such as the `files_ready` flag) is done by the
//! transitions in [`super::transitions`].

use super::config::PipelineConfig;
use crate::core::job::Job;
use crate::core::stage::{RESTART_FILE, Stage, StageRun, TOPMON_FILE};
use crate::core::template::scan_keywords;
use std::path::Path;
use tracing::trace;

pub fn has_fort_files(job: &Job) -> bool {
    Stage::ALL
        .iter()
        .all(|stage| job.is_file(&stage.template_file()))
}

/// True when no template holds a keyword token.
///
/// With `tolerate_missing` a missing template is skipped, so a partial set of
/// resolved templates counts as ready. Without it every template must exist.
pub fn templates_resolved(job: &Job, tolerate_missing: bool) -> bool {
    let mut leftover = 0;
    for stage in Stage::ALL {
        let path = job.path(&stage.template_file());
        let Ok(text) = std::fs::read_to_string(&path) else {
            if tolerate_missing {
                continue;
            }
            return false;
        };
        let found = scan_keywords(&text);
        if !found.is_empty() {
            trace!("Template {:?} still contains {:?}.", path, found);
        }
        leftover += found.len();
    }
    leftover == 0
}

pub fn has_restart_file(job: &Job) -> bool {
    job.is_file(RESTART_FILE)
}

pub fn has_topmon(job: &Job) -> bool {
    job.is_file(TOPMON_FILE)
}

/// Whether the engine input set ships a starting configuration for this molecule.
pub fn has_restart_source(job: &Job, config: &PipelineConfig) -> bool {
    config
        .engine
        .molecule_input_dir(&job.statepoint().molecule)
        .join(RESTART_FILE)
        .is_file()
}

pub fn selector_matches(job: &Job, config: &PipelineConfig) -> bool {
    config.selector.matches(job.statepoint())
}

pub fn equil_replicate_set(job: &Job) -> bool {
    job.document().equil_replicates_done == Some(0)
}

/// True when the stored target matches the configured one, or the counter
/// already exceeds a lowered configured target.
pub fn replicate_set(job: &Job, config: &PipelineConfig) -> bool {
    let doc = job.document();
    let done = doc.prod_replicates_done.unwrap_or(0);
    doc.num_prod_replicates == Some(config.num_prod_replicates.max(done))
}

/// False until both counters exist; then true once the target is reached.
pub fn all_prod_replicates_done(job: &Job) -> bool {
    let doc = job.document();
    match (doc.prod_replicates_done, doc.num_prod_replicates) {
        (Some(done), Some(target)) => done >= target,
        _ => false,
    }
}

/// The production replicate most recently started (0 before the first one).
pub fn current_prod_run(job: &Job) -> StageRun {
    StageRun::Replicate(job.document().prod_replicates_done.unwrap_or(0))
}

/// Whether a log file exists and contains the completion marker.
pub fn log_finished(path: &Path, marker: &str) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).contains(marker),
        Err(_) => false,
    }
}

/// Whether a stage's run log reports normal termination.
///
/// For production this always inspects the replicate indexed by the current
/// counter, not any particular earlier replicate.
pub fn stage_finished(job: &Job, stage: Stage, marker: &str) -> bool {
    let run = match stage {
        Stage::Prod => current_prod_run(job),
        other => StageRun::Single(other),
    };
    log_finished(&job.path(&run.run_log()), marker)
}
