use crate::core::statepoint::{Ensemble, StatePoint};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_NUM_PROD_REPLICATES: u32 = 4;
pub const DEFAULT_COMPLETION_MARKER: &str = "Program ended";
pub const DEFAULT_ENGINE: &str = "mcccs";
pub const DEFAULT_MOLECULE: &str = "pentaneUA";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{param}': {reason}")]
    InvalidParameter { param: &'static str, reason: String },
}

/// Which jobs the pipeline applies to. A job is ignored by every operation
/// unless its state point matches.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSelector {
    pub engine: String,
    pub molecules: Vec<String>,
    pub ensembles: Vec<Ensemble>,
}

impl Default for JobSelector {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            molecules: vec![DEFAULT_MOLECULE.to_string()],
            ensembles: vec![Ensemble::Npt],
        }
    }
}

impl JobSelector {
    pub fn matches(&self, sp: &StatePoint) -> bool {
        sp.engine == self.engine
            && self.molecules.iter().any(|m| *m == sp.molecule)
            && self.ensembles.contains(&sp.ensemble)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Absolute path of the precompiled simulation executable.
    pub executable: PathBuf,
    /// Root of the per-molecule input sets (`<dir>/<molecule>/fort.4.*`, `topmon.inp`, ...).
    pub input_dir: PathBuf,
}

impl EngineConfig {
    pub fn molecule_input_dir(&self, molecule: &str) -> PathBuf {
        self.input_dir.join(molecule)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub num_prod_replicates: u32,
    pub completion_marker: String,
    /// When set, a missing template does not block readiness; only the
    /// templates that exist are scanned for leftover keywords.
    pub tolerate_missing_templates: bool,
    pub selector: JobSelector,
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    executable: Option<PathBuf>,
    input_dir: Option<PathBuf>,
    num_prod_replicates: Option<u32>,
    completion_marker: Option<String>,
    tolerate_missing_templates: Option<bool>,
    selector: Option<JobSelector>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executable(mut self, path: impl AsRef<Path>) -> Self {
        self.executable = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn input_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.input_dir = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn num_prod_replicates(mut self, n: u32) -> Self {
        self.num_prod_replicates = Some(n);
        self
    }
    pub fn completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = Some(marker.into());
        self
    }
    pub fn tolerate_missing_templates(mut self, tolerate: bool) -> Self {
        self.tolerate_missing_templates = Some(tolerate);
        self
    }
    pub fn selector(mut self, selector: JobSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let engine = EngineConfig {
            executable: self
                .executable
                .ok_or(ConfigError::MissingParameter("executable"))?,
            input_dir: self
                .input_dir
                .ok_or(ConfigError::MissingParameter("input_dir"))?,
        };

        let num_prod_replicates = self
            .num_prod_replicates
            .unwrap_or(DEFAULT_NUM_PROD_REPLICATES);
        if num_prod_replicates == 0 {
            return Err(ConfigError::InvalidParameter {
                param: "num_prod_replicates",
                reason: "at least one production replicate is required".to_string(),
            });
        }

        let completion_marker = self
            .completion_marker
            .unwrap_or_else(|| DEFAULT_COMPLETION_MARKER.to_string());
        if completion_marker.is_empty() {
            return Err(ConfigError::InvalidParameter {
                param: "completion_marker",
                reason: "marker must not be empty".to_string(),
            });
        }

        Ok(PipelineConfig {
            engine,
            num_prod_replicates,
            completion_marker,
            tolerate_missing_templates: self.tolerate_missing_templates.unwrap_or(false),
            selector: self.selector.unwrap_or_default(),
        })
    }
}
