//! The declared operations of the pipeline and the conditions that gate them.
//!
//! An operation is eligible for a job when every precondition holds and at
//! least one postcondition does not. Operations are listed in declaration
//! order, which is also the order they are attempted in.

use crate::core::job::Job;
use crate::core::stage::{RESTART_FILE, Stage, TOPMON_FILE};
use crate::core::template;
use crate::engine::config::PipelineConfig;
use crate::engine::error::EngineError;
use crate::engine::predicates;
use crate::engine::runner::{self, Executor};
use crate::engine::transitions;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Group of operations that prepare a job and run its first stage.
pub const GROUP_EX: &str = "ex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Selector,
    HasFortFiles,
    FilesReady,
    HasRestartFile,
    HasTopmon,
    HasRestartSource,
    EquilReplicateSet,
    ReplicateSet,
    AllProdReplicatesDone,
    Finished(Stage),
}

impl Condition {
    /// Conditions reported as labels by `status`.
    pub const LABELS: [Condition; 12] = [
        Condition::HasFortFiles,
        Condition::FilesReady,
        Condition::HasRestartFile,
        Condition::HasTopmon,
        Condition::HasRestartSource,
        Condition::EquilReplicateSet,
        Condition::ReplicateSet,
        Condition::AllProdReplicatesDone,
        Condition::Finished(Stage::Melt),
        Condition::Finished(Stage::Cool),
        Condition::Finished(Stage::Equil),
        Condition::Finished(Stage::Prod),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Condition::Selector => "selected",
            Condition::HasFortFiles => "has_fort_files",
            Condition::FilesReady => "files_ready",
            Condition::HasRestartFile => "has_restart_file",
            Condition::HasTopmon => "has_topmon",
            Condition::HasRestartSource => "has_restart_source",
            Condition::EquilReplicateSet => "equil_replicate_set",
            Condition::ReplicateSet => "replicate_set",
            Condition::AllProdReplicatesDone => "all_prod_replicates_done",
            Condition::Finished(Stage::Melt) => "melt_finished",
            Condition::Finished(Stage::Cool) => "cool_finished",
            Condition::Finished(Stage::Equil) => "equil_finished",
            Condition::Finished(Stage::Prod) => "prod_finished",
        }
    }

    pub fn holds(&self, job: &Job, config: &PipelineConfig) -> bool {
        match self {
            Condition::Selector => predicates::selector_matches(job, config),
            Condition::HasFortFiles => predicates::has_fort_files(job),
            Condition::FilesReady => {
                predicates::templates_resolved(job, config.tolerate_missing_templates)
            }
            Condition::HasRestartFile => predicates::has_restart_file(job),
            Condition::HasTopmon => predicates::has_topmon(job),
            Condition::HasRestartSource => predicates::has_restart_source(job, config),
            Condition::EquilReplicateSet => predicates::equil_replicate_set(job),
            Condition::ReplicateSet => predicates::replicate_set(job, config),
            Condition::AllProdReplicatesDone => predicates::all_prod_replicates_done(job),
            Condition::Finished(stage) => {
                predicates::stage_finished(job, *stage, &config.completion_marker)
            }
        }
    }
}

/// Everything an operation needs besides the job itself.
#[derive(Clone, Copy)]
pub struct OperationContext<'a> {
    pub config: &'a PipelineConfig,
    pub executor: &'a dyn Executor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SetEquilReplicates,
    SetProdReplicates,
    CopyFiles,
    CopyTopmon,
    ReplaceKeywordFortFiles,
    MakeRestartFile,
    RunMelt,
    RunCool,
    RunEquil,
    RunProd,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::SetEquilReplicates,
        Operation::SetProdReplicates,
        Operation::CopyFiles,
        Operation::CopyTopmon,
        Operation::ReplaceKeywordFortFiles,
        Operation::MakeRestartFile,
        Operation::RunMelt,
        Operation::RunCool,
        Operation::RunEquil,
        Operation::RunProd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::SetEquilReplicates => "set_equil_replicates",
            Operation::SetProdReplicates => "set_prod_replicates",
            Operation::CopyFiles => "copy_files",
            Operation::CopyTopmon => "copy_topmon",
            Operation::ReplaceKeywordFortFiles => "replace_keyword_fort_files",
            Operation::MakeRestartFile => "make_restart_file",
            Operation::RunMelt => "run_melt",
            Operation::RunCool => "run_cool",
            Operation::RunEquil => "run_equil",
            Operation::RunProd => "run_prod",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| EngineError::OperationNotFound(name.to_string()))
    }

    pub fn in_group(&self, group: &str) -> bool {
        group == GROUP_EX
            && matches!(
                self,
                Operation::CopyFiles
                    | Operation::CopyTopmon
                    | Operation::ReplaceKeywordFortFiles
                    | Operation::MakeRestartFile
                    | Operation::RunMelt
            )
    }

    pub fn preconditions(&self) -> &'static [Condition] {
        use Condition::*;
        match self {
            Operation::SetEquilReplicates
            | Operation::SetProdReplicates
            | Operation::CopyFiles
            | Operation::CopyTopmon => &[Selector],
            Operation::ReplaceKeywordFortFiles => &[Selector, HasFortFiles],
            Operation::MakeRestartFile => &[Selector, HasRestartSource],
            Operation::RunMelt => &[Selector, HasRestartFile, HasFortFiles, HasTopmon, FilesReady],
            Operation::RunCool => &[Selector, HasRestartFile, Finished(Stage::Melt)],
            Operation::RunEquil => &[Selector, HasRestartFile, Finished(Stage::Cool)],
            Operation::RunProd => &[
                Selector,
                HasRestartFile,
                Finished(Stage::Equil),
                ReplicateSet,
            ],
        }
    }

    pub fn postconditions(&self) -> &'static [Condition] {
        use Condition::*;
        match self {
            Operation::SetEquilReplicates => &[EquilReplicateSet],
            Operation::SetProdReplicates => &[ReplicateSet],
            Operation::CopyFiles => &[HasFortFiles],
            Operation::CopyTopmon => &[HasTopmon],
            Operation::ReplaceKeywordFortFiles => &[FilesReady],
            Operation::MakeRestartFile => &[HasRestartFile],
            Operation::RunMelt => &[Finished(Stage::Melt)],
            Operation::RunCool => &[Finished(Stage::Cool)],
            Operation::RunEquil => &[Finished(Stage::Equil)],
            Operation::RunProd => &[Finished(Stage::Prod), AllProdReplicatesDone],
        }
    }

    pub fn is_eligible(&self, job: &Job, config: &PipelineConfig) -> bool {
        self.preconditions().iter().all(|c| c.holds(job, config))
            && !self.postconditions().iter().all(|c| c.holds(job, config))
    }

    pub fn is_complete(&self, job: &Job, config: &PipelineConfig) -> bool {
        self.postconditions().iter().all(|c| c.holds(job, config))
    }

    pub fn execute(&self, job: &mut Job, ctx: OperationContext<'_>) -> Result<(), EngineError> {
        let config = ctx.config;
        match self {
            Operation::SetEquilReplicates => {
                job.commit(transitions::init_equil_replicates(job.document()))?;
            }
            Operation::SetProdReplicates => {
                job.commit(transitions::init_prod_replicates(
                    job.document(),
                    config.num_prod_replicates,
                ))?;
            }
            Operation::CopyFiles => copy_templates(job, config)?,
            Operation::CopyTopmon => {
                let source = config
                    .engine
                    .molecule_input_dir(&job.statepoint().molecule)
                    .join(TOPMON_FILE);
                copy_into(&source, &job.path(TOPMON_FILE))?;
            }
            Operation::ReplaceKeywordFortFiles => {
                let changed = template::resolve_templates(job)?;
                debug!("Resolved keywords in {} template(s).", changed);
                transitions::files_ready(job, config)?;
            }
            Operation::MakeRestartFile => make_restart_file(job, config)?,
            Operation::RunMelt => run_stage(job, Stage::Melt, ctx)?,
            Operation::RunCool => run_stage(job, Stage::Cool, ctx)?,
            Operation::RunEquil => run_stage(job, Stage::Equil, ctx)?,
            Operation::RunProd => run_stage(job, Stage::Prod, ctx)?,
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn run_stage(job: &mut Job, stage: Stage, ctx: OperationContext<'_>) -> Result<(), EngineError> {
    runner::run_stage(job, stage, ctx.executor, ctx.config).map(|_| ())
}

fn copy_into(source: &Path, dest: &Path) -> Result<(), EngineError> {
    if !source.is_file() {
        return Err(EngineError::MissingFile {
            path: source.to_path_buf(),
        });
    }
    std::fs::copy(source, dest).map_err(|e| EngineError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Copies every `fort.4.*` template shipped for the job's molecule.
fn copy_templates(job: &Job, config: &PipelineConfig) -> Result<(), EngineError> {
    let source_dir = config
        .engine
        .molecule_input_dir(&job.statepoint().molecule);
    let entries = std::fs::read_dir(&source_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::MissingFile {
            path: source_dir.clone(),
        },
        _ => EngineError::Io {
            path: source_dir.clone(),
            source: e,
        },
    })?;

    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Io {
            path: source_dir.clone(),
            source: e,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with("fort.4.") && entry.path().is_file() {
            copy_into(&entry.path(), &job.path(name))?;
            copied += 1;
        }
    }
    if copied < Stage::ALL.len() {
        warn!(
            "Only {} template(s) found in {:?} for job {}.",
            copied,
            source_dir,
            job.short_id()
        );
    }
    Ok(())
}

/// Installs the starting configuration shipped for the job's molecule after
/// checking that the state point names a known forcefield and a buildable molecule.
fn make_restart_file(job: &Job, config: &PipelineConfig) -> Result<(), EngineError> {
    let sp = job.statepoint();
    sp.forcefield()?;
    let molecule = sp.molecule()?;
    if !molecule.supported() {
        return Err(EngineError::UnsupportedMolecule {
            job_id: job.id().to_string(),
            molecule: molecule.to_string(),
        });
    }
    let source = config
        .engine
        .molecule_input_dir(molecule.name())
        .join(RESTART_FILE);
    copy_into(&source, &job.path(RESTART_FILE))?;
    info!("Installed restart file for job {} ({}).", job.short_id(), molecule);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::Project;
    use crate::core::statepoint::tests::pentane_npt;
    use crate::engine::config::PipelineConfigBuilder;
    use crate::engine::runner::tests::FakeEngine;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        project: Project,
        config: PipelineConfig,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("engine_input/pentaneUA");
        std::fs::create_dir_all(&input).unwrap();
        for stage in Stage::ALL {
            std::fs::write(
                input.join(stage.template_file()),
                "nchain=NCHAIN\ntemp=TEMPERATURE\npress=PRESSURE\nseed=SEED\nLENGTH\n",
            )
            .unwrap();
        }
        std::fs::write(input.join(TOPMON_FILE), "topology").unwrap();
        std::fs::write(input.join(RESTART_FILE), "restart").unwrap();

        let project_dir = dir.path().join("project");
        std::fs::create_dir(&project_dir).unwrap();
        let project = Project::open(&project_dir).unwrap();
        let config = PipelineConfigBuilder::new()
            .executable("/opt/mcccs/topmon")
            .input_dir(dir.path().join("engine_input"))
            .build()
            .unwrap();
        Fixture {
            _dir: dir,
            project,
            config,
        }
    }

    #[test]
    fn names_round_trip_and_unknown_names_fail() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()).unwrap(), op);
        }
        assert!(matches!(
            Operation::from_name("run_anneal"),
            Err(EngineError::OperationNotFound(_))
        ));
    }

    #[test]
    fn ex_group_covers_preparation_and_melt() {
        let ex: Vec<_> = Operation::ALL
            .into_iter()
            .filter(|op| op.in_group(GROUP_EX))
            .map(|op| op.name())
            .collect();
        assert_eq!(
            ex,
            [
                "copy_files",
                "copy_topmon",
                "replace_keyword_fort_files",
                "make_restart_file",
                "run_melt"
            ]
        );
        assert!(!Operation::RunMelt.in_group("other"));
    }

    #[test]
    fn unselected_jobs_have_no_eligible_operations() {
        let f = fixture();
        let mut sp = pentane_npt();
        sp.ensemble = crate::core::statepoint::Ensemble::Nvt;
        let job = f.project.init_job(sp).unwrap();
        assert!(
            Operation::ALL
                .iter()
                .all(|op| !op.is_eligible(&job, &f.config))
        );
    }

    #[test]
    fn preparation_operations_satisfy_their_postconditions() {
        let f = fixture();
        let mut job = f.project.init_job(pentane_npt()).unwrap();
        let engine = FakeEngine::finishing();
        let ctx = OperationContext {
            config: &f.config,
            executor: &engine,
        };

        assert!(
            Operation::ReplaceKeywordFortFiles
                .preconditions()
                .iter()
                .any(|c| !c.holds(&job, &f.config))
        );
        assert!(!Operation::RunMelt.is_eligible(&job, &f.config));

        for op in [
            Operation::SetEquilReplicates,
            Operation::SetProdReplicates,
            Operation::CopyFiles,
            Operation::CopyTopmon,
            Operation::ReplaceKeywordFortFiles,
            Operation::MakeRestartFile,
        ] {
            assert!(op.is_eligible(&job, &f.config), "{} should be eligible", op);
            op.execute(&mut job, ctx).unwrap();
            assert!(op.is_complete(&job, &f.config), "{} should be complete", op);
            assert!(!op.is_eligible(&job, &f.config));
        }

        assert_eq!(job.document().files_ready, Some(true));
        assert_eq!(job.document().num_prod_replicates, Some(4));
        assert_eq!(job.document().equil_replicates_done, Some(0));
        let melt = std::fs::read_to_string(job.path("fort.4.melt")).unwrap();
        assert!(melt.contains("press=1.402"));
        assert!(Operation::RunMelt.is_eligible(&job, &f.config));
        assert!(!Operation::RunCool.is_eligible(&job, &f.config));
    }

    #[test]
    fn run_prod_stays_eligible_until_all_replicates_finish() {
        let f = fixture();
        let mut job = f.project.init_job(pentane_npt()).unwrap();
        let engine = FakeEngine::finishing();
        let ctx = OperationContext {
            config: &f.config,
            executor: &engine,
        };
        for op in Operation::ALL.iter().take(9) {
            op.execute(&mut job, ctx).unwrap();
        }

        for k in 1..=4 {
            assert!(
                Operation::RunProd.is_eligible(&job, &f.config),
                "before replicate {}",
                k
            );
            Operation::RunProd.execute(&mut job, ctx).unwrap();
        }
        assert_eq!(job.document().prod_replicates_done, Some(4));
        assert!(Operation::RunProd.is_complete(&job, &f.config));
        assert!(!Operation::RunProd.is_eligible(&job, &f.config));
    }

    #[test]
    fn make_restart_file_rejects_unknown_forcefield() {
        let f = fixture();
        let mut sp = pentane_npt();
        sp.forcefield_name = "gaff".to_string();
        let job = f.project.init_job(sp).unwrap();
        let err = make_restart_file(&job, &f.config).unwrap_err();
        assert!(err.to_string().contains(job.id()));
        assert!(!job.is_file(RESTART_FILE));
    }

    #[test]
    fn make_restart_file_rejects_molecules_without_model() {
        let f = fixture();
        let mut sp = pentane_npt();
        sp.molecule = "benzeneUA".to_string();
        let job = f.project.init_job(sp).unwrap();
        let err = make_restart_file(&job, &f.config).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedMolecule { .. }));
    }

    #[test]
    fn copy_files_reports_missing_input_set() {
        let f = fixture();
        let mut sp = pentane_npt();
        sp.molecule = "methaneUA".to_string();
        let job = f.project.init_job(sp).unwrap();
        let err = copy_templates(&job, &f.config).unwrap_err();
        assert!(matches!(err, EngineError::MissingFile { .. }));
    }
}
