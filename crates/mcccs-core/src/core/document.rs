use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error for job document '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed job document '{path}': {source}", path = path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Incomplete,
}

/// The durable per-job record of flags and counters.
///
/// Fields are optional because a freshly initialised job has none of them;
/// "unset" is a distinct state from zero for every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equil_replicates_done: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_prod_replicates: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_replicates_done: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, StageStatus>,
}

impl JobDocument {
    /// Loads a document, treating a missing file as an empty document.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(DocumentError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| DocumentError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the document through a sibling temp file so readers never see a partial write.
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let io_err = |source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(self).map_err(|source| DocumentError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    pub fn stage_status(&self, suffix: &str) -> Option<StageStatus> {
        self.stages.get(suffix).copied()
    }
}
