use phf::phf_map;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the hexadecimal job fingerprint.
pub const JOB_ID_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatePointError {
    #[error("Unknown molecule '{name}' in job {job_id}")]
    UnknownMolecule { job_id: String, name: String },

    #[error("No forcefield has been applied to this system {job_id} (unknown forcefield '{name}')")]
    UnknownForcefield { job_id: String, name: String },

    #[error("State point of job {job_id} has no value for '{field}'")]
    MissingField { job_id: String, field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Molecule {
    MethaneUa,
    PentaneUa,
    BenzeneUa,
    WaterSpce,
    EthanolAa,
}

static MOLECULES: phf::Map<&'static str, Molecule> = phf_map! {
    "methaneUA" => Molecule::MethaneUa,
    "pentaneUA" => Molecule::PentaneUa,
    "benzeneUA" => Molecule::BenzeneUa,
    "waterSPC/E" => Molecule::WaterSpce,
    "ethanolAA" => Molecule::EthanolAa,
};

impl Molecule {
    pub fn from_name(name: &str) -> Option<Self> {
        MOLECULES.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Molecule::MethaneUa => "methaneUA",
            Molecule::PentaneUa => "pentaneUA",
            Molecule::BenzeneUa => "benzeneUA",
            Molecule::WaterSpce => "waterSPC/E",
            Molecule::EthanolAa => "ethanolAA",
        }
    }

    /// Whether a molecule model exists from which a starting configuration can be built.
    pub fn supported(&self) -> bool {
        !matches!(self, Molecule::BenzeneUa | Molecule::EthanolAa)
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForcefieldName {
    TrappeUa,
    Oplsaa,
    Spce,
}

static FORCEFIELDS: phf::Map<&'static str, ForcefieldName> = phf_map! {
    "trappe-ua" => ForcefieldName::TrappeUa,
    "oplsaa" => ForcefieldName::Oplsaa,
    "spce" => ForcefieldName::Spce,
};

impl ForcefieldName {
    pub fn from_name(name: &str) -> Option<Self> {
        FORCEFIELDS.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ensemble {
    #[serde(rename = "NPT")]
    Npt,
    #[serde(rename = "NVT")]
    Nvt,
    #[serde(rename = "GEMC")]
    Gemc,
}

impl fmt::Display for Ensemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ensemble::Npt => "NPT",
            Ensemble::Nvt => "NVT",
            Ensemble::Gemc => "GEMC",
        })
    }
}

impl FromStr for Ensemble {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NPT" => Ok(Ensemble::Npt),
            "NVT" => Ok(Ensemble::Nvt),
            "GEMC" => Ok(Ensemble::Gemc),
            other => Err(format!("unknown ensemble '{}', expected NPT, NVT or GEMC", other)),
        }
    }
}

/// The immutable parameter set identifying one simulation.
///
/// Temperatures are in K, pressures in kPa and box lengths in nm; unit
/// conversions for the engine happen only when templates are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatePoint {
    pub engine: String,
    pub molecule: String,
    pub ensemble: Ensemble,
    pub forcefield_name: String,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    pub n_liquid: u64,
    pub box_l_liq: f64,
    pub replica: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_vap: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_l_vap: Option<f64>,
}

impl StatePoint {
    /// Returns the job fingerprint: a truncated SHA-256 digest of the canonical
    /// JSON encoding of this state point.
    pub fn id(&self) -> String {
        let canonical = serde_json::to_vec(self)
            .expect("state point fields are plain scalars and strings and always serialize");
        let digest = Sha256::digest(&canonical);
        let mut id = hex::encode(digest);
        id.truncate(JOB_ID_LEN);
        id
    }

    pub fn molecule(&self) -> Result<Molecule, StatePointError> {
        Molecule::from_name(&self.molecule).ok_or_else(|| StatePointError::UnknownMolecule {
            job_id: self.id(),
            name: self.molecule.clone(),
        })
    }

    pub fn forcefield(&self) -> Result<ForcefieldName, StatePointError> {
        ForcefieldName::from_name(&self.forcefield_name).ok_or_else(|| {
            StatePointError::UnknownForcefield {
                job_id: self.id(),
                name: self.forcefield_name.clone(),
            }
        })
    }

    pub fn pressure(&self) -> Result<f64, StatePointError> {
        self.pressure.ok_or_else(|| StatePointError::MissingField {
            job_id: self.id(),
            field: "pressure",
        })
    }
}
