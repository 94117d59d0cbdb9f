use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::{AcceleratorConfig, DEFAULT_MAX_CYCLES};
use crate::error::{Error, Result};

/// Environment variable prefix, e.g. `VMACC__ACCELERATOR__LANE_COUNT=8`
pub const ENV_PREFIX: &str = "VMACC";
const ENV_SEPARATOR: &str = "__";

/// Driver settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulationSection {
  #[serde(default)]
  pub quiet: bool,
  #[serde(default)]
  pub step_mode: bool,
  #[serde(default)]
  pub trace_file: String,
  #[serde(default = "default_max_cycles")]
  pub max_cycles: u64,
}

fn default_max_cycles() -> u64 {
  DEFAULT_MAX_CYCLES
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      quiet: false,
      step_mode: false,
      trace_file: String::new(),
      max_cycles: DEFAULT_MAX_CYCLES,
    }
  }
}

/// Everything the `vmacc` binary reads from file, environment and CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub accelerator: AcceleratorConfig,
  #[serde(default)]
  pub simulation: SimulationSection,
}

impl AppConfig {
  pub fn validate(&self) -> Result<()> {
    self.accelerator.validate()?;
    if self.simulation.max_cycles == 0 {
      return Err(Error::InvalidConfig("max_cycles must be at least 1".to_string()));
    }
    Ok(())
  }
}

/// Parse a TOML document. Missing keys take their defaults.
pub fn from_toml_str(content: &str) -> Result<AppConfig> {
  Ok(toml::from_str::<AppConfig>(content)?)
}

/// Load a single TOML file, without the environment layer.
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
  let content = fs::read_to_string(path)?;
  from_toml_str(&content)
}

/// Built-in defaults, then `path` if given, then `VMACC__*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
  let mut builder = ::config::Config::builder().add_source(::config::Config::try_from(&AppConfig::default())?);
  if let Some(path) = path {
    builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Toml));
  }
  let layered = builder
    .add_source(
      ::config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true),
    )
    .build()?;
  Ok(layered.try_deserialize::<AppConfig>()?)
}

/// CLI flags override every other layer.
pub fn apply_cli_overrides(
  config: &mut AppConfig,
  quiet: bool,
  step: bool,
  trace_file: Option<&str>,
  max_cycles: Option<u64>,
) {
  if quiet {
    config.simulation.quiet = true;
  }
  if step {
    config.simulation.step_mode = true;
  }
  if let Some(file) = trace_file {
    config.simulation.trace_file = file.to_string();
  }
  if let Some(limit) = max_cycles {
    config.simulation.max_cycles = limit;
  }
}
