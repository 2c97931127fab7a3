use super::document::{DocumentError, JobDocument};
use super::statepoint::StatePoint;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

pub const WORKSPACE_DIR: &str = "workspace";
pub const STATEPOINT_FILE: &str = "statepoint.json";
pub const DOCUMENT_FILE: &str = "document.json";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("I/O error at '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid state point file '{path}': {source}", path = path.display())]
    StatePoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("No job matches id '{0}'")]
    NotFound(String),
    #[error("Job id prefix '{0}' is ambiguous")]
    Ambiguous(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> JobError + '_ {
    move |source| JobError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One simulation instance: its state point, private workspace and persisted document.
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    statepoint: StatePoint,
    workspace: PathBuf,
    document: JobDocument,
}

impl Job {
    /// Opens an existing job directory, reading its state point and document.
    pub fn open(workspace: &Path) -> Result<Self, JobError> {
        let sp_path = workspace.join(STATEPOINT_FILE);
        let content = std::fs::read_to_string(&sp_path).map_err(io_error(&sp_path))?;
        let statepoint: StatePoint =
            serde_json::from_str(&content).map_err(|source| JobError::StatePoint {
                path: sp_path.clone(),
                source,
            })?;
        let document = JobDocument::load(&workspace.join(DOCUMENT_FILE))?;
        Ok(Self {
            id: statepoint.id(),
            statepoint,
            workspace: workspace.to_path_buf(),
            document,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    pub fn statepoint(&self) -> &StatePoint {
        &self.statepoint
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn document(&self) -> &JobDocument {
        &self.document
    }

    /// Absolute path of a file inside this job's workspace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }

    pub fn is_file(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Persists a new document and makes it the job's current record.
    pub fn commit(&mut self, document: JobDocument) -> Result<(), JobError> {
        document.save(&self.path(DOCUMENT_FILE))?;
        self.document = document;
        Ok(())
    }

    /// Re-reads the document from disk, discarding the cached copy.
    pub fn reload(&mut self) -> Result<(), JobError> {
        self.document = JobDocument::load(&self.path(DOCUMENT_FILE))?;
        Ok(())
    }
}

/// A project root holding one workspace directory per job.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn open(root: &Path) -> Result<Self, JobError> {
        if !root.is_dir() {
            return Err(JobError::Io {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "project root is not a directory"),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Creates the job for a state point, or opens it if it already exists.
    pub fn init_job(&self, statepoint: StatePoint) -> Result<Job, JobError> {
        let id = statepoint.id();
        let dir = self.workspace_dir().join(&id);
        if dir.join(STATEPOINT_FILE).is_file() {
            debug!(job = %id, "Job already initialised.");
            return Job::open(&dir);
        }

        std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let sp_path = dir.join(STATEPOINT_FILE);
        let json = serde_json::to_vec_pretty(&statepoint).map_err(|source| {
            JobError::StatePoint {
                path: sp_path.clone(),
                source,
            }
        })?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_error(&dir))?;
        tmp.write_all(&json).map_err(io_error(&sp_path))?;
        tmp.persist(&sp_path)
            .map_err(|e| io_error(&sp_path)(e.error))?;
        debug!(job = %id, "Initialised new job workspace.");

        Ok(Job {
            id,
            statepoint,
            workspace: dir,
            document: JobDocument::default(),
        })
    }

    /// All jobs in the workspace, sorted by id.
    pub fn jobs(&self) -> Result<Vec<Job>, JobError> {
        let ws = self.workspace_dir();
        if !ws.is_dir() {
            return Ok(Vec::new());
        }
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&ws).map_err(io_error(&ws))? {
            let entry = entry.map_err(io_error(&ws))?;
            let path = entry.path();
            if !path.join(STATEPOINT_FILE).is_file() {
                continue;
            }
            let job = match Job::open(&path) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping unreadable job directory {:?}: {}", path, e);
                    continue;
                }
            };
            if path.file_name().and_then(|n| n.to_str()) != Some(job.id()) {
                warn!(
                    "Workspace directory {:?} does not match its state point id {}; skipping.",
                    path,
                    job.id()
                );
                continue;
            }
            jobs.push(job);
        }
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    /// Looks up a job by full id or unique id prefix.
    pub fn job(&self, id: &str) -> Result<Job, JobError> {
        let mut matches: Vec<Job> = self
            .jobs()?
            .into_iter()
            .filter(|job| job.id().starts_with(id))
            .collect();
        match matches.len() {
            0 => Err(JobError::NotFound(id.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(JobError::Ambiguous(id.to_string())),
        }
    }
}
