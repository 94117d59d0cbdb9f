use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("parse TOML config failed: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("load config failed: {0}")]
  Config(#[from] ::config::ConfigError),

  #[error("invalid config: {0}")]
  InvalidConfig(String),

  #[error("parse workload failed: {0}")]
  Workload(#[from] serde_json::Error),

  #[error("write trace failed: {0}")]
  Trace(serde_json::Error),

  #[error("invalid instruction '{text}': {reason}")]
  Mnemonic { text: String, reason: String },

  #[error("memory image has {actual} words, depth is {expected}")]
  ImageLength { expected: usize, actual: usize },

  #[error("shell input failed: {0}")]
  Shell(#[from] rustyline::error::ReadlineError),

  #[error("accelerator not idle after {0} cycles")]
  CycleLimit(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
