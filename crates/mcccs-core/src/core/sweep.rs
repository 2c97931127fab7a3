use super::statepoint::StatePoint;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweepLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("'{path}' defines no [[statepoint]] entries")]
    Empty { path: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SweepFile {
    #[serde(default)]
    statepoint: Vec<StatePoint>,
}

/// State points of a parameter sweep, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    pub statepoints: Vec<StatePoint>,
}

impl Sweep {
    pub fn load(path: &Path) -> Result<Self, SweepLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| SweepLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.to_string_lossy())
    }

    fn parse(content: &str, origin: &str) -> Result<Self, SweepLoadError> {
        let file: SweepFile = toml::from_str(content).map_err(|e| SweepLoadError::Toml {
            path: origin.to_string(),
            source: e,
        })?;
        if file.statepoint.is_empty() {
            return Err(SweepLoadError::Empty {
                path: origin.to_string(),
            });
        }
        Ok(Self {
            statepoints: file.statepoint,
        })
    }
}
