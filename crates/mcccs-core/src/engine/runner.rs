use super::config::PipelineConfig;
use super::error::EngineError;
use super::predicates;
use super::transitions;
use crate::core::document::StageStatus;
use crate::core::job::Job;
use crate::core::stage::{
    ENGINE_INPUT, ENGINE_RESTART_OUTPUT, OUTPUT_ARTIFACTS, RESTART_FILE, Stage, StageRun,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, instrument, warn};

/// What a finished engine process left behind.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs the simulation engine once in a working directory and waits for it.
pub trait Executor: Send + Sync {
    fn execute(&self, workdir: &Path) -> Result<ExecOutput, EngineError>;
}

/// Launches the engine binary with no arguments and captures its output whole.
///
/// There is no timeout: the call blocks until the process exits on its own.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    program: PathBuf,
}

impl ShellExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.engine.executable.clone())
    }
}

impl Executor for ShellExecutor {
    fn execute(&self, workdir: &Path) -> Result<ExecOutput, EngineError> {
        debug!("Launching {:?} in {:?}", self.program, workdir);
        let child = Command::new(&self.program)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Subprocess {
                program: self.program.clone(),
                source,
            })?;
        let output = child
            .wait_with_output()
            .map_err(|source| EngineError::Subprocess {
                program: self.program.clone(),
                source,
            })?;
        Ok(ExecOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub run: StageRun,
    /// Whether the harvested run log carries the completion marker.
    pub completed: bool,
    pub exit_code: Option<i32>,
}

fn file_error(path: &Path, source: io::Error) -> EngineError {
    if source.kind() == io::ErrorKind::NotFound {
        EngineError::MissingFile {
            path: path.to_path_buf(),
        }
    } else {
        EngineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), EngineError> {
    debug!("copy {:?} -> {:?}", from, to);
    std::fs::copy(from, to).map_err(|e| file_error(from, e))?;
    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<(), EngineError> {
    debug!("move {:?} -> {:?}", from, to);
    std::fs::rename(from, to).map_err(|e| file_error(from, e))
}

/// Fails if the run is recorded as completed and any of its renamed
/// artifacts is already present.
fn check_destinations(job: &Job, run: StageRun) -> Result<(), EngineError> {
    if job.document().stage_status(&run.suffix()) != Some(StageStatus::Completed) {
        return Ok(());
    }
    for (_, stem) in OUTPUT_ARTIFACTS {
        let dest = job.path(&run.artifact_name(stem));
        if dest.exists() {
            return Err(EngineError::ArtifactExists { path: dest });
        }
    }
    Ok(())
}

/// Renames the engine's outputs to run-qualified names and primes the restart
/// file for the next stage. Already-moved files stay moved if a later one is missing.
fn harvest(job: &Job, run: StageRun) -> Result<(), EngineError> {
    check_destinations(job, run)?;
    for (output, stem) in OUTPUT_ARTIFACTS {
        if output == ENGINE_RESTART_OUTPUT {
            copy_file(&job.path(output), &job.path(RESTART_FILE))?;
        }
        move_file(&job.path(output), &job.path(&run.artifact_name(stem)))?;
    }
    Ok(())
}

/// Runs one stage of a job whose preconditions already hold.
///
/// For production the replicate counter is advanced and persisted before the
/// engine starts, so the run's artifacts are named after the new count. An
/// unfinished replicate is rerun under its own index instead.
#[instrument(skip_all, fields(job = %job.short_id(), stage = %stage))]
pub fn run_stage(
    job: &mut Job,
    stage: Stage,
    executor: &dyn Executor,
    config: &PipelineConfig,
) -> Result<StageOutcome, EngineError> {
    let run = match stage {
        Stage::Prod => {
            let (next, run) = transitions::begin_prod_replicate(job.document()).ok_or_else(
                || EngineError::ReplicatesExhausted {
                    job_id: job.id().to_string(),
                    target: job.document().num_prod_replicates.unwrap_or(0),
                },
            )?;
            job.commit(next)?;
            run
        }
        other => StageRun::Single(other),
    };
    info!("Running {}", run);
    check_destinations(job, run)?;

    copy_file(&job.path(&stage.template_file()), &job.path(ENGINE_INPUT))?;

    let output = executor.execute(job.workspace())?;
    if !output.stdout.is_empty() {
        debug!("Engine output for {}:\n{}", run, output.stdout);
    }
    if !output.success {
        warn!(
            exit_code = ?output.exit_code,
            "Engine exited unsuccessfully during {}: {}",
            run,
            output.stderr.trim()
        );
    }

    harvest(job, run)?;

    let completed = predicates::log_finished(
        &job.path(&run.run_log()),
        &config.completion_marker,
    );
    let status = if completed {
        StageStatus::Completed
    } else {
        StageStatus::Incomplete
    };
    let next = transitions::record_stage(job.document(), run, status);
    job.commit(next)?;

    if completed {
        info!("{} finished.", run);
    } else {
        warn!("{} log has no completion marker; the stage will be retried.", run);
    }

    Ok(StageOutcome {
        run,
        completed,
        exit_code: output.exit_code,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::job::Project;
    use crate::core::statepoint::tests::pentane_npt;
    use crate::engine::config::PipelineConfigBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Stands in for the engine: echoes the input deck into every output file.
    pub(crate) struct FakeEngine {
        pub(crate) log: String,
        pub(crate) calls: AtomicUsize,
    }

    impl FakeEngine {
        pub(crate) fn finishing() -> Self {
            Self {
                log: " MC cycles complete\n Program ended\n".to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn crashing() -> Self {
            Self {
                log: " MC cycle 12\n".to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Executor for FakeEngine {
        fn execute(&self, workdir: &Path) -> Result<ExecOutput, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let input = std::fs::read_to_string(workdir.join(ENGINE_INPUT)).unwrap();
            for (output, _) in OUTPUT_ARTIFACTS {
                let body = if output == "run1a.dat" {
                    self.log.clone()
                } else {
                    format!("call {}\n{}", call, input)
                };
                std::fs::write(workdir.join(output), body).unwrap();
            }
            Ok(ExecOutput {
                exit_code: Some(0),
                success: true,
                stdout: format!("call {}", call),
                stderr: String::new(),
            })
        }
    }

    pub(crate) fn config() -> PipelineConfig {
        PipelineConfigBuilder::new()
            .executable("/opt/mcccs/topmon")
            .input_dir("/in")
            .build()
            .unwrap()
    }

    fn prepared_job(dir: &TempDir) -> Job {
        let project = Project::open(dir.path()).unwrap();
        let job = project.init_job(pentane_npt()).unwrap();
        for stage in Stage::ALL {
            std::fs::write(job.path(&stage.template_file()), format!("deck {}", stage)).unwrap();
        }
        std::fs::write(job.path(RESTART_FILE), "initial").unwrap();
        job
    }

    #[test]
    fn melt_run_renames_outputs_and_primes_restart() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let engine = FakeEngine::finishing();

        let outcome = run_stage(&mut job, Stage::Melt, &engine, &config()).unwrap();
        assert_eq!(outcome.run, StageRun::Single(Stage::Melt));
        assert!(outcome.completed);

        assert_eq!(std::fs::read_to_string(job.path(ENGINE_INPUT)).unwrap(), "deck melt");
        for name in [
            "fort.12.melt",
            "box1config1a.xyz.melt",
            "run.melt",
            "config1a.dat.melt",
            "box1movie1a.pdb.melt",
            "box1movie1a.xyz.melt",
        ] {
            assert!(job.is_file(name), "{} should exist", name);
        }
        for (output, _) in OUTPUT_ARTIFACTS {
            assert!(!job.is_file(output), "{} should have been moved", output);
        }
        let restart = std::fs::read_to_string(job.path(RESTART_FILE)).unwrap();
        assert!(restart.contains("deck melt"));
        assert_eq!(job.document().stage_status("melt"), Some(StageStatus::Completed));
        assert!(predicates::stage_finished(&job, Stage::Melt, "Program ended"));
    }

    #[test]
    fn prod_runs_are_numbered_from_one_and_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let engine = FakeEngine::finishing();
        let config = config();
        job.commit(transitions::init_prod_replicates(job.document(), 4))
            .unwrap();

        let first = run_stage(&mut job, Stage::Prod, &engine, &config).unwrap();
        assert_eq!(first.run, StageRun::Replicate(1));
        assert_eq!(job.document().prod_replicates_done, Some(1));
        let first_traj = std::fs::read_to_string(job.path("fort.12.prod1")).unwrap();

        let second = run_stage(&mut job, Stage::Prod, &engine, &config).unwrap();
        assert_eq!(second.run, StageRun::Replicate(2));
        assert_eq!(job.document().prod_replicates_done, Some(2));

        assert_eq!(
            std::fs::read_to_string(job.path("fort.12.prod1")).unwrap(),
            first_traj
        );
        assert!(job.is_file("run.prod2"));
        assert!(!job.is_file("run.prod0"));
        assert!(predicates::stage_finished(&job, Stage::Prod, &config.completion_marker));
    }

    #[test]
    fn crashed_last_replicate_is_rerun_without_passing_the_target() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let config = config();
        let finishing = FakeEngine::finishing();
        job.commit(transitions::init_prod_replicates(job.document(), 4))
            .unwrap();
        for _ in 0..3 {
            run_stage(&mut job, Stage::Prod, &finishing, &config).unwrap();
        }

        let crashed = run_stage(&mut job, Stage::Prod, &FakeEngine::crashing(), &config).unwrap();
        assert_eq!(crashed.run, StageRun::Replicate(4));
        assert!(!crashed.completed);
        assert_eq!(job.document().stage_status("prod4"), Some(StageStatus::Incomplete));

        let retry = run_stage(&mut job, Stage::Prod, &finishing, &config).unwrap();
        assert_eq!(retry.run, StageRun::Replicate(4));
        assert!(retry.completed);
        assert_eq!(job.document().prod_replicates_done, Some(4));
        assert!(!job.is_file("run.prod5"));

        let err = run_stage(&mut job, Stage::Prod, &finishing, &config).unwrap_err();
        assert!(matches!(err, EngineError::ReplicatesExhausted { target: 4, .. }));
        assert_eq!(job.document().prod_replicates_done, Some(4));
        assert_eq!(finishing.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn completed_run_artifacts_are_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let engine = FakeEngine::finishing();
        run_stage(&mut job, Stage::Melt, &engine, &config()).unwrap();
        let traj = std::fs::read_to_string(job.path("fort.12.melt")).unwrap();

        let err = run_stage(&mut job, Stage::Melt, &engine, &config()).unwrap_err();
        match err {
            EngineError::ArtifactExists { path } => assert!(path.ends_with("fort.12.melt")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(job.path("fort.12.melt")).unwrap(), traj);
    }

    #[test]
    fn harvest_refuses_to_clobber_a_completed_run() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let run = StageRun::Replicate(1);
        job.commit(transitions::record_stage(job.document(), run, StageStatus::Completed))
            .unwrap();
        std::fs::write(job.path("fort.12.prod1"), "first").unwrap();
        for (output, _) in OUTPUT_ARTIFACTS {
            std::fs::write(job.path(output), "second").unwrap();
        }

        assert!(matches!(
            harvest(&job, run),
            Err(EngineError::ArtifactExists { .. })
        ));
        assert_eq!(std::fs::read_to_string(job.path("fort.12.prod1")).unwrap(), "first");
        assert!(job.is_file("fort.12"));
    }

    #[test]
    fn crashed_engine_is_recorded_as_incomplete() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let outcome = run_stage(&mut job, Stage::Cool, &FakeEngine::crashing(), &config()).unwrap();
        assert!(!outcome.completed);
        assert_eq!(job.document().stage_status("cool"), Some(StageStatus::Incomplete));
        assert!(!predicates::stage_finished(&job, Stage::Cool, "Program ended"));
    }

    struct SilentEngine;

    impl Executor for SilentEngine {
        fn execute(&self, workdir: &Path) -> Result<ExecOutput, EngineError> {
            std::fs::write(workdir.join("fort.12"), "partial").unwrap();
            Ok(ExecOutput {
                exit_code: Some(139),
                success: false,
                ..Default::default()
            })
        }
    }

    #[test]
    fn missing_output_fails_without_rollback() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        let err = run_stage(&mut job, Stage::Equil, &SilentEngine, &config()).unwrap_err();
        match err {
            EngineError::MissingFile { path } => assert!(path.ends_with("box1config1a.xyz")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(job.is_file("fort.12.equil"));
        assert_eq!(job.document().stage_status("equil"), None);
    }

    #[test]
    fn missing_template_is_reported_before_launch() {
        let dir = TempDir::new().unwrap();
        let mut job = prepared_job(&dir);
        std::fs::remove_file(job.path("fort.4.cool")).unwrap();
        let engine = FakeEngine::finishing();
        let err = run_stage(&mut job, Stage::Cool, &engine, &config()).unwrap_err();
        assert!(matches!(err, EngineError::MissingFile { .. }));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[test]
    fn shell_executor_runs_in_workspace_and_captures_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("topmon");
        std::fs::write(&script, "#!/bin/sh\ncat fort.4\necho oops >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let work = dir.path().join("job");
        std::fs::create_dir(&work).unwrap();
        std::fs::write(work.join(ENGINE_INPUT), "hello deck").unwrap();

        let output = ShellExecutor::new(&script).execute(&work).unwrap();
        assert_eq!(output.stdout, "hello deck");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success);
    }

    #[test]
    fn shell_executor_reports_missing_binary() {
        let dir = TempDir::new().unwrap();
        let err = ShellExecutor::new(dir.path().join("nope"))
            .execute(dir.path())
            .unwrap_err();
        assert!(matches!(err, EngineError::Subprocess { .. }));
    }
}
