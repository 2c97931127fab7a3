use super::config::PipelineConfig;
use super::predicates;
use crate::core::job::Job;
use crate::core::stage::Stage;
use std::fmt;

/// Where a job stands in the melt → cool → equil → prod pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Uninitialized,
    Templated,
    RestartReady,
    Melted,
    Cooled,
    Equilibrated,
    /// Production replicates started so far.
    Producing(u32),
    Done,
}

impl JobState {
    /// Derives the state from the job's workspace files and document.
    pub fn observe(job: &Job, config: &PipelineConfig) -> Self {
        let marker = config.completion_marker.as_str();

        let started = job.document().prod_replicates_done.unwrap_or(0);
        if started > 0 {
            if predicates::all_prod_replicates_done(job)
                && predicates::stage_finished(job, Stage::Prod, marker)
            {
                return JobState::Done;
            }
            return JobState::Producing(started);
        }
        if predicates::stage_finished(job, Stage::Equil, marker) {
            return JobState::Equilibrated;
        }
        if predicates::stage_finished(job, Stage::Cool, marker) {
            return JobState::Cooled;
        }
        if predicates::stage_finished(job, Stage::Melt, marker) {
            return JobState::Melted;
        }

        let templated = predicates::has_fort_files(job)
            && predicates::templates_resolved(job, config.tolerate_missing_templates);
        if templated && predicates::has_restart_file(job) && predicates::has_topmon(job) {
            JobState::RestartReady
        } else if templated {
            JobState::Templated
        } else {
            JobState::Uninitialized
        }
    }

    /// The stage a job in this state runs next, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            JobState::Uninitialized | JobState::Templated => None,
            JobState::RestartReady => Some(Stage::Melt),
            JobState::Melted => Some(Stage::Cool),
            JobState::Cooled => Some(Stage::Equil),
            JobState::Equilibrated | JobState::Producing(_) => Some(Stage::Prod),
            JobState::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobState::Done)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Uninitialized => f.write_str("uninitialized"),
            JobState::Templated => f.write_str("templated"),
            JobState::RestartReady => f.write_str("restart-ready"),
            JobState::Melted => f.write_str("melted"),
            JobState::Cooled => f.write_str("cooled"),
            JobState::Equilibrated => f.write_str("equilibrated"),
            JobState::Producing(k) => write!(f, "producing({})", k),
            JobState::Done => f.write_str("done"),
        }
    }
}
