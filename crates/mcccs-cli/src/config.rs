use crate::cli::ProjectArgs;
use crate::error::{CliError, Result};
use mcccs_flow::core::statepoint::Ensemble;
use mcccs_flow::engine::config::{self as core_config, JobSelector, PipelineConfigBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File looked up in the project root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mcccs-flow.toml";

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialEngineConfig {
    executable: Option<PathBuf>,
    #[serde(rename = "input-dir")]
    input_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialPipelineConfig {
    #[serde(rename = "num-prod-replicates")]
    num_prod_replicates: Option<u32>,
    #[serde(rename = "completion-marker")]
    completion_marker: Option<String>,
    #[serde(rename = "tolerate-missing-templates")]
    tolerate_missing_templates: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSelectorConfig {
    engine: Option<String>,
    molecules: Option<Vec<String>>,
    ensembles: Option<Vec<Ensemble>>,
}

impl PartialSelectorConfig {
    fn into_selector(self) -> JobSelector {
        let default = JobSelector::default();
        JobSelector {
            engine: self.engine.unwrap_or(default.engine),
            molecules: self.molecules.unwrap_or(default.molecules),
            ensembles: self.ensembles.unwrap_or(default.ensembles),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialProjectConfig {
    engine: Option<PartialEngineConfig>,
    pipeline: Option<PartialPipelineConfig>,
    selector: Option<PartialSelectorConfig>,
}

impl PartialProjectConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Reads `--config` if given, otherwise the project's default file when it exists.
    pub fn locate(args: &ProjectArgs) -> Result<Self> {
        match &args.config {
            Some(path) => Self::from_file(path),
            None => {
                let default = args.project.join(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    debug!(
                        "No {} in {:?}; using built-in defaults.",
                        DEFAULT_CONFIG_FILE, args.project
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    /// Folds CLI flags over `-S` values over the file. Relative paths are
    /// taken relative to the project root.
    pub fn merge_with_cli(mut self, args: &ProjectArgs) -> Result<core_config::PipelineConfig> {
        self.apply_set_values(&args.set_values)?;

        let engine = self.engine.take().unwrap_or_default();
        let pipeline = self.pipeline.take().unwrap_or_default();
        let selector = self.selector.take().unwrap_or_default();

        let resolve = |path: PathBuf| -> PathBuf {
            if path.is_absolute() {
                path
            } else {
                args.project.join(path)
            }
        };

        let executable = args
            .executable
            .clone()
            .or(engine.executable)
            .ok_or_else(|| {
                CliError::Config(
                    "A value for 'engine.executable' is required either in the config file or via --executable."
                        .to_string(),
                )
            })?;
        let input_dir = args
            .engine_input
            .clone()
            .or(engine.input_dir)
            .unwrap_or_else(|| PathBuf::from("engine_input"));

        let mut builder = PipelineConfigBuilder::new()
            .executable(resolve(executable))
            .input_dir(resolve(input_dir))
            .tolerate_missing_templates(
                args.tolerate_missing_templates
                    || pipeline.tolerate_missing_templates.unwrap_or(false),
            )
            .selector(selector.into_selector());

        if let Some(n) = args.num_prod_replicates.or(pipeline.num_prod_replicates) {
            builder = builder.num_prod_replicates(n);
        }
        if let Some(marker) = pipeline.completion_marker {
            builder = builder.completion_marker(marker);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "engine.executable" => {
                    self.engine.get_or_insert_with(Default::default).executable =
                        Some(PathBuf::from(value_str));
                }
                "engine.input-dir" => {
                    self.engine.get_or_insert_with(Default::default).input_dir =
                        Some(PathBuf::from(value_str));
                }
                "pipeline.num-prod-replicates" => {
                    self.pipeline
                        .get_or_insert_with(Default::default)
                        .num_prod_replicates = Some(value_str.parse().map_err(|_| {
                        CliError::Config(format!(
                            "Invalid integer value for {}: {}",
                            key, value_str
                        ))
                    })?);
                }
                "pipeline.completion-marker" => {
                    self.pipeline
                        .get_or_insert_with(Default::default)
                        .completion_marker = Some(value_str.to_string());
                }
                "pipeline.tolerate-missing-templates" => {
                    self.pipeline
                        .get_or_insert_with(Default::default)
                        .tolerate_missing_templates = Some(value_str.parse().map_err(|_| {
                        CliError::Config(format!(
                            "Invalid boolean value for {}: {}",
                            key, value_str
                        ))
                    })?);
                }
                "selector.engine" => {
                    self.selector.get_or_insert_with(Default::default).engine =
                        Some(value_str.to_string());
                }
                "selector.molecules" => {
                    self.selector.get_or_insert_with(Default::default).molecules =
                        Some(split_list(value_str).map(str::to_string).collect());
                }
                "selector.ensembles" => {
                    let ensembles = split_list(value_str)
                        .map(|s| s.parse::<Ensemble>())
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| {
                            CliError::Config(format!("Invalid value for {}: {}", key, e))
                        })?;
                    self.selector.get_or_insert_with(Default::default).ensembles =
                        Some(ensembles);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
