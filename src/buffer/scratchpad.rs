/// Scratchpad - flat, directly addressed word memory
use log::warn;

use crate::error::{Error, Result};
use crate::isa::mode::VectorWord;

pub struct Scratchpad {
  name: String,
  words: Vec<VectorWord>,
}

impl Scratchpad {
  pub fn new(name: impl Into<String>, depth: usize) -> Self {
    Self {
      name: name.into(),
      words: vec![0; depth],
    }
  }

  /// Out-of-range reads return 0.
  pub fn read(&self, addr: usize) -> VectorWord {
    match self.words.get(addr) {
      Some(&word) => word,
      None => {
        warn!("[{}] read out of range: addr={} depth={}", self.name, addr, self.words.len());
        0
      },
    }
  }

  /// Out-of-range writes are dropped.
  pub fn write(&mut self, addr: usize, data: VectorWord) {
    match self.words.get_mut(addr) {
      Some(slot) => *slot = data,
      None => warn!(
        "[{}] write out of range dropped: addr={} data={:#010x} depth={}",
        self.name,
        addr,
        data,
        self.words.len()
      ),
    }
  }

  /// Replace the whole memory. The image must cover every word.
  pub fn load(&mut self, image: &[VectorWord]) -> Result<()> {
    if image.len() != self.words.len() {
      return Err(Error::ImageLength {
        expected: self.words.len(),
        actual: image.len(),
      });
    }
    self.words.copy_from_slice(image);
    Ok(())
  }

  pub fn words(&self) -> &[VectorWord] {
    &self.words
  }

  pub fn clear(&mut self) {
    self.words.fill(0);
  }
}
