/// Accelerator hardware parameters
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_LANE_COUNT: usize = 16;
pub const DEFAULT_MEMORY_DEPTH: usize = 16384;
pub const DEFAULT_CHANNEL_DEPTH: usize = 1;
/// Default bound on cycles spent waiting for the accelerator to drain
pub const DEFAULT_MAX_CYCLES: u64 = 1_000_000;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AcceleratorConfig {
  /// Number of compute lanes (N). One matrix/output row is N words.
  #[serde(default = "default_lane_count")]
  pub lane_count: usize,
  /// Words per scratchpad.
  #[serde(default = "default_memory_depth")]
  pub memory_depth: usize,
  /// Capacity of every internal channel. 1 models a single ready/valid register.
  #[serde(default = "default_channel_depth")]
  pub channel_depth: usize,
}

fn default_lane_count() -> usize {
  DEFAULT_LANE_COUNT
}

fn default_memory_depth() -> usize {
  DEFAULT_MEMORY_DEPTH
}

fn default_channel_depth() -> usize {
  DEFAULT_CHANNEL_DEPTH
}

impl AcceleratorConfig {
  pub fn new(lane_count: usize, memory_depth: usize) -> Self {
    Self {
      lane_count,
      memory_depth,
      ..Self::default()
    }
  }

  pub fn with_channel_depth(mut self, channel_depth: usize) -> Self {
    self.channel_depth = channel_depth;
    self
  }

  /// Rows of `lane_count` words that fit in one scratchpad.
  pub fn rows(&self) -> usize {
    self.memory_depth / self.lane_count.max(1)
  }

  pub fn validate(&self) -> Result<()> {
    if self.lane_count == 0 {
      return Err(Error::InvalidConfig("lane_count must be at least 1".to_string()));
    }
    if self.memory_depth == 0 {
      return Err(Error::InvalidConfig("memory_depth must be at least 1".to_string()));
    }
    if self.channel_depth == 0 {
      return Err(Error::InvalidConfig("channel_depth must be at least 1".to_string()));
    }
    if self.memory_depth % self.lane_count != 0 {
      return Err(Error::InvalidConfig(format!(
        "memory_depth {} is not a multiple of lane_count {}",
        self.memory_depth, self.lane_count
      )));
    }
    Ok(())
  }
}

impl Default for AcceleratorConfig {
  fn default() -> Self {
    Self {
      lane_count: DEFAULT_LANE_COUNT,
      memory_depth: DEFAULT_MEMORY_DEPTH,
      channel_depth: DEFAULT_CHANNEL_DEPTH,
    }
  }
}
