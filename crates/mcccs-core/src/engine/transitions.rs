//! Named state transitions of the job document.
//!
//! Each transition takes the current record and returns the next one; nothing
//! here touches the filesystem except [`files_ready`], which pairs a readiness
//! observation with its persistence.

use super::config::PipelineConfig;
use super::error::EngineError;
use super::predicates;
use crate::core::document::{JobDocument, StageStatus};
use crate::core::job::Job;
use crate::core::stage::StageRun;

pub fn mark_files_ready(doc: &JobDocument, ready: bool) -> JobDocument {
    JobDocument {
        files_ready: Some(ready),
        ..doc.clone()
    }
}

pub fn init_equil_replicates(doc: &JobDocument) -> JobDocument {
    JobDocument {
        equil_replicates_done: Some(0),
        ..doc.clone()
    }
}

/// Sets the production target, keeping any replicates already started.
///
/// The stored target never drops below the counter.
pub fn init_prod_replicates(doc: &JobDocument, target: u32) -> JobDocument {
    let done = doc.prod_replicates_done.unwrap_or(0);
    JobDocument {
        num_prod_replicates: Some(target.max(done)),
        prod_replicates_done: Some(done),
        ..doc.clone()
    }
}

/// Picks the production run to launch next.
///
/// A replicate that was started but not recorded as completed is run again
/// under the same index. Otherwise the counter is incremented first, so the
/// first replicate is always 1. Returns `None` once the stored target is reached.
pub fn begin_prod_replicate(doc: &JobDocument) -> Option<(JobDocument, StageRun)> {
    let done = doc.prod_replicates_done.unwrap_or(0);
    if done > 0 {
        let current = StageRun::Replicate(done);
        if doc.stage_status(&current.suffix()) != Some(StageStatus::Completed) {
            return Some((doc.clone(), current));
        }
    }
    if doc.num_prod_replicates.is_some_and(|target| done >= target) {
        return None;
    }
    let index = done + 1;
    let next = JobDocument {
        prod_replicates_done: Some(index),
        ..doc.clone()
    };
    Some((next, StageRun::Replicate(index)))
}

pub fn record_stage(doc: &JobDocument, run: StageRun, status: StageStatus) -> JobDocument {
    let mut next = doc.clone();
    next.stages.insert(run.suffix(), status);
    next
}

/// Checks template readiness and persists the result on the job.
///
/// Safe to call repeatedly: the flag is rewritten with the current observation
/// each time.
pub fn files_ready(job: &mut Job, config: &PipelineConfig) -> Result<bool, EngineError> {
    let ready = predicates::templates_resolved(job, config.tolerate_missing_templates);
    if job.document().files_ready != Some(ready) {
        let next = mark_files_ready(job.document(), ready);
        job.commit(next)?;
    }
    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::Project;
    use crate::core::stage::{Stage, StageRun};
    use crate::core::statepoint::tests::pentane_npt;
    use crate::core::template::resolve_templates;
    use crate::engine::config::PipelineConfigBuilder;
    use tempfile::TempDir;

    fn complete(doc: &JobDocument, run: StageRun) -> JobDocument {
        record_stage(doc, run, StageStatus::Completed)
    }

    #[test]
    fn begin_prod_replicate_counts_from_one() {
        let doc = init_prod_replicates(&JobDocument::default(), 4);
        let (doc, run) = begin_prod_replicate(&doc).unwrap();
        assert_eq!(run, StageRun::Replicate(1));
        let (doc, run) = begin_prod_replicate(&complete(&doc, run)).unwrap();
        assert_eq!(run, StageRun::Replicate(2));
        assert_eq!(doc.prod_replicates_done, Some(2));
        assert_eq!(doc.num_prod_replicates, Some(4));
    }

    #[test]
    fn begin_prod_replicate_without_init_starts_at_one() {
        let (doc, run) = begin_prod_replicate(&JobDocument::default()).unwrap();
        assert_eq!(run, StageRun::Replicate(1));
        assert_eq!(doc.prod_replicates_done, Some(1));
    }

    #[test]
    fn unfinished_replicate_is_rerun_under_the_same_index() {
        let mut doc = init_prod_replicates(&JobDocument::default(), 4);
        for _ in 0..3 {
            let (next, run) = begin_prod_replicate(&doc).unwrap();
            doc = complete(&next, run);
        }
        let (next, run) = begin_prod_replicate(&doc).unwrap();
        assert_eq!(run, StageRun::Replicate(4));
        let crashed = record_stage(&next, run, StageStatus::Incomplete);

        let (retry, run) = begin_prod_replicate(&crashed).unwrap();
        assert_eq!(run, StageRun::Replicate(4));
        assert_eq!(retry.prod_replicates_done, Some(4));

        // A replicate whose record never got written counts as unfinished too.
        let (_, run) = begin_prod_replicate(&next).unwrap();
        assert_eq!(run, StageRun::Replicate(4));

        let finished = complete(&retry, run);
        assert!(begin_prod_replicate(&finished).is_none());
    }

    #[test]
    fn retargeting_keeps_started_replicates() {
        let mut doc = init_prod_replicates(&JobDocument::default(), 2);
        for _ in 0..2 {
            let (next, run) = begin_prod_replicate(&doc).unwrap();
            doc = complete(&next, run);
        }

        let raised = init_prod_replicates(&doc, 3);
        assert_eq!(raised.prod_replicates_done, Some(2));
        assert_eq!(raised.num_prod_replicates, Some(3));
        let (_, run) = begin_prod_replicate(&raised).unwrap();
        assert_eq!(run, StageRun::Replicate(3));

        let lowered = init_prod_replicates(&doc, 1);
        assert_eq!(lowered.prod_replicates_done, Some(2));
        assert_eq!(lowered.num_prod_replicates, Some(2));
        assert!(begin_prod_replicate(&lowered).is_none());
    }

    #[test]
    fn transitions_leave_unrelated_fields_alone() {
        let doc = mark_files_ready(&JobDocument::default(), true);
        let doc = init_equil_replicates(&doc);
        let doc = record_stage(&doc, StageRun::Single(Stage::Melt), StageStatus::Completed);
        assert_eq!(doc.files_ready, Some(true));
        assert_eq!(doc.equil_replicates_done, Some(0));
        assert_eq!(doc.stage_status("melt"), Some(StageStatus::Completed));
        assert_eq!(doc.prod_replicates_done, None);
    }

    #[test]
    fn files_ready_persists_after_templates_are_resolved() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path()).unwrap();
        let mut job = project.init_job(pentane_npt()).unwrap();
        let config = PipelineConfigBuilder::new()
            .executable("/x")
            .input_dir("/in")
            .build()
            .unwrap();
        for stage in Stage::ALL {
            std::fs::write(
                job.path(&stage.template_file()),
                "nchain=NCHAIN temp=TEMPERATURE\nLENGTH PRESSURE SEED\n",
            )
            .unwrap();
        }

        assert!(!files_ready(&mut job, &config).unwrap());
        assert_eq!(job.document().files_ready, Some(false));

        resolve_templates(&job).unwrap();
        assert!(files_ready(&mut job, &config).unwrap());

        let reopened = project.job(job.id()).unwrap();
        assert_eq!(reopened.document().files_ready, Some(true));
    }
}
