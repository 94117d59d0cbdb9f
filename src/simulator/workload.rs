/// Workload files driven through the host ports
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::isa::mode::VectorWord;
use crate::isa::CompoundInstruction;

/// A JSON workload.
///
/// `matrix` and `vector` are back-door images loaded from address 0; words
/// past their end are zero. `*_writes` go through the external write ports
/// before the program starts. `read_back` addresses are read from output
/// memory once the accelerator drains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
  #[serde(default)]
  pub matrix: Vec<VectorWord>,
  #[serde(default)]
  pub vector: Vec<VectorWord>,
  #[serde(default)]
  pub matrix_writes: Vec<(u32, VectorWord)>,
  #[serde(default)]
  pub vector_writes: Vec<(u32, VectorWord)>,
  #[serde(default)]
  pub program: Vec<CompoundInstruction>,
  #[serde(default)]
  pub read_back: Vec<u32>,
}

impl Workload {
  pub fn from_json_str(content: &str) -> Result<Self> {
    Ok(serde_json::from_str(content)?)
  }

  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)?;
    Self::from_json_str(&content)
  }
}

/// Zero-extend `prefix` to a full memory image.
pub fn full_image(prefix: &[VectorWord], depth: usize) -> Result<Vec<VectorWord>> {
  if prefix.len() > depth {
    return Err(Error::ImageLength {
      expected: depth,
      actual: prefix.len(),
    });
  }
  let mut image = prefix.to_vec();
  image.resize(depth, 0);
  Ok(image)
}
