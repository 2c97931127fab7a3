use serde::{Deserialize, Serialize};
use std::fmt;

/// The engine's fixed working-directory input file.
pub const ENGINE_INPUT: &str = "fort.4";
/// Restart configuration consumed by every stage.
pub const RESTART_FILE: &str = "fort.77";
/// Molecular topology / forcefield file.
pub const TOPMON_FILE: &str = "topmon.inp";
/// Restart configuration written by the engine at the end of a run.
pub const ENGINE_RESTART_OUTPUT: &str = "config1a.dat";

/// Engine output artifacts, paired with the stem used for their stage-qualified name.
pub const OUTPUT_ARTIFACTS: [(&str, &str); 6] = [
    ("fort.12", "fort.12"),
    ("box1config1a.xyz", "box1config1a.xyz"),
    ("run1a.dat", "run"),
    (ENGINE_RESTART_OUTPUT, ENGINE_RESTART_OUTPUT),
    ("box1movie1a.pdb", "box1movie1a.pdb"),
    ("box1movie1a.xyz", "box1movie1a.xyz"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Melt,
    Cool,
    Equil,
    Prod,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Melt, Stage::Cool, Stage::Equil, Stage::Prod];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Melt => "melt",
            Stage::Cool => "cool",
            Stage::Equil => "equil",
            Stage::Prod => "prod",
        }
    }

    /// Name of the keyword template holding this stage's engine input.
    pub fn template_file(&self) -> String {
        format!("{}.{}", ENGINE_INPUT, self.name())
    }

    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Melt => None,
            Stage::Cool => Some(Stage::Melt),
            Stage::Equil => Some(Stage::Cool),
            Stage::Prod => Some(Stage::Equil),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One concrete execution of a stage; production runs carry their replicate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRun {
    Single(Stage),
    Replicate(u32),
}

impl StageRun {
    pub fn stage(&self) -> Stage {
        match self {
            StageRun::Single(stage) => *stage,
            StageRun::Replicate(_) => Stage::Prod,
        }
    }

    /// Suffix appended to every artifact produced by this run (`melt`, `prod3`, ...).
    pub fn suffix(&self) -> String {
        match self {
            StageRun::Single(stage) => stage.name().to_string(),
            StageRun::Replicate(index) => format!("{}{}", Stage::Prod.name(), index),
        }
    }

    pub fn run_log(&self) -> String {
        format!("run.{}", self.suffix())
    }

    /// Destination name for an engine artifact after this run.
    pub fn artifact_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.suffix())
    }
}

impl fmt::Display for StageRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffix())
    }
}
