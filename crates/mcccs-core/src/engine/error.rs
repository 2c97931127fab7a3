use thiserror::Error;

use super::config::ConfigError;
use crate::core::document::DocumentError;
use crate::core::job::JobError;
use crate::core::statepoint::StatePointError;
use crate::core::template::TemplateError;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    StatePoint(#[from] StatePointError),

    #[error("File operation on '{path}' failed: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Required file is missing: {path}", path = path.display())]
    MissingFile { path: PathBuf },

    #[error("Failed to launch '{program}': {source}", program = program.display())]
    Subprocess {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Molecule '{molecule}' of job {job_id} has no model to build a starting configuration from")]
    UnsupportedMolecule { job_id: String, molecule: String },

    #[error("Refusing to overwrite '{path}' from a completed run", path = path.display())]
    ArtifactExists { path: PathBuf },

    #[error("Job {job_id} has already run all {target} production replicate(s)")]
    ReplicatesExhausted { job_id: String, target: u32 },

    #[error("Unknown operation: '{0}'")]
    OperationNotFound(String),
}
