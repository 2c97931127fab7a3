//! Keyword substitution for the per-stage engine input templates.
//!
//! Each `fort.4.<stage>` template carries placeholder tokens that are replaced,
//! in place, with literal values derived from the job's state point. Resolution
//! is destructive: once a token has been replaced it is gone, which is also how
//! readiness is detected afterwards.

use super::job::Job;
use super::stage::Stage;
use super::statepoint::{StatePoint, StatePointError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Placeholder tokens, in the order they are substituted.
pub const KEYWORDS: [&str; 5] = ["NCHAIN", "LENGTH", "TEMPERATURE", "PRESSURE", "SEED"];

const NM_TO_ANGSTROM: f64 = 10.0;
const KPA_PER_MPA: f64 = 1000.0;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("I/O error for template '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Template '{path}' uses {keyword} but the state point cannot provide it: {source}", path = path.display())]
    MissingValue {
        path: PathBuf,
        keyword: &'static str,
        #[source]
        source: StatePointError,
    },
}

/// Renders a float the way the engine templates expect: shortest round-trip
/// digits, always with a fractional part.
pub fn format_float(value: f64) -> String {
    let s = value.to_string();
    if value.is_finite() && !s.contains(['.', 'e', 'E']) {
        format!("{}.0", s)
    } else {
        s
    }
}

/// The literal value for every keyword, derived from one state point.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitutions {
    values: Vec<(&'static str, Result<String, StatePointError>)>,
}

impl Substitutions {
    pub fn from_statepoint(sp: &StatePoint) -> Self {
        let values = vec![
            ("NCHAIN", Ok(sp.n_liquid.to_string())),
            ("LENGTH", Ok(format_float(sp.box_l_liq * NM_TO_ANGSTROM))),
            ("TEMPERATURE", Ok(format_float(sp.temperature))),
            (
                "PRESSURE",
                sp.pressure().map(|kpa| format_float(kpa / KPA_PER_MPA)),
            ),
            ("SEED", Ok(sp.replica.to_string())),
        ];
        Self { values }
    }

    pub fn value(&self, keyword: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == keyword)
            .and_then(|(_, v)| v.as_deref().ok())
    }

    /// Replaces every keyword in `text`. A keyword whose value is unavailable
    /// is only an error if the text actually uses it.
    pub fn apply(&self, text: &str, path: &Path) -> Result<String, TemplateError> {
        let mut out = text.to_string();
        for (keyword, value) in &self.values {
            let keyword: &'static str = keyword;
            if !out.contains(keyword) {
                continue;
            }
            let value = value.as_ref().map_err(|e| TemplateError::MissingValue {
                path: path.to_path_buf(),
                keyword,
                source: e.clone(),
            })?;
            out = out.replace(keyword, value);
        }
        Ok(out)
    }
}

/// Keywords still present in a text.
pub fn scan_keywords(text: &str) -> Vec<&'static str> {
    KEYWORDS
        .iter()
        .copied()
        .filter(|k| text.contains(k))
        .collect()
}

/// Resolves one template file in place. Returns whether the file changed.
pub fn resolve_file(path: &Path, subs: &Substitutions) -> Result<bool, TemplateError> {
    let io_err = |source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let original = std::fs::read_to_string(path).map_err(io_err)?;
    let resolved = subs.apply(&original, path)?;
    if resolved == original {
        debug!("Template {:?} has no keywords left.", path);
        return Ok(false);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(resolved.as_bytes()).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    debug!("Resolved keywords in {:?}.", path);
    Ok(true)
}

/// Resolves all four stage templates of a job, one file at a time.
///
/// Files are handled independently: a failure on one template leaves those
/// already resolved intact and the remaining ones untouched.
pub fn resolve_templates(job: &Job) -> Result<usize, TemplateError> {
    let subs = Substitutions::from_statepoint(job.statepoint());
    let mut changed = 0;
    for stage in Stage::ALL {
        if resolve_file(&job.path(&stage.template_file()), &subs)? {
            changed += 1;
        }
    }
    Ok(changed)
}
