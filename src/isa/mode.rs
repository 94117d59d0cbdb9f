/// Precision modes and sub-word slicing helpers
use serde::{Deserialize, Serialize};
use std::fmt;

/// Packed vector word (W = 32 bits)
pub type VectorWord = u32;
/// Accumulator word (2W = 64 bits)
pub type AccumWord = u64;

pub const VECTOR_BITS: u32 = 32;
pub const ACCUM_BITS: u32 = 64;

/// How a vector word splits into signed sub-elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrecisionMode {
  Int8,
  Int16,
  Int32,
}

/// Per-mode geometry: lane count and per-lane widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneLayout {
  pub lanes: u32,
  pub operand_bits: u32,
  pub accum_bits: u32,
}

const LAYOUTS: [LaneLayout; 3] = [
  LaneLayout { lanes: 4, operand_bits: 8, accum_bits: 16 },
  LaneLayout { lanes: 2, operand_bits: 16, accum_bits: 32 },
  LaneLayout { lanes: 1, operand_bits: 32, accum_bits: 64 },
];

impl PrecisionMode {
  pub const ALL: [PrecisionMode; 3] = [PrecisionMode::Int8, PrecisionMode::Int16, PrecisionMode::Int32];

  /// Decode the 2-bit mode field. Encoding 3 is reserved.
  pub fn decode(bits: u8) -> Option<Self> {
    match bits & 0x3 {
      0 => Some(PrecisionMode::Int8),
      1 => Some(PrecisionMode::Int16),
      2 => Some(PrecisionMode::Int32),
      _ => None,
    }
  }

  pub fn bits(self) -> u8 {
    match self {
      PrecisionMode::Int8 => 0,
      PrecisionMode::Int16 => 1,
      PrecisionMode::Int32 => 2,
    }
  }

  pub fn layout(self) -> LaneLayout {
    LAYOUTS[self.bits() as usize]
  }

  pub fn mnemonic(self) -> &'static str {
    match self {
      PrecisionMode::Int8 => "INT8",
      PrecisionMode::Int16 => "INT16",
      PrecisionMode::Int32 => "INT32",
    }
  }

  pub fn from_mnemonic(s: &str) -> Option<Self> {
    match s.to_ascii_uppercase().as_str() {
      "INT8" => Some(PrecisionMode::Int8),
      "INT16" => Some(PrecisionMode::Int16),
      "INT32" => Some(PrecisionMode::Int32),
      _ => None,
    }
  }
}

impl fmt::Display for PrecisionMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.mnemonic())
  }
}

/// All-ones mask of `width` bits (width <= 64).
pub fn mask(width: u32) -> u64 {
  if width >= 64 {
    u64::MAX
  } else {
    (1u64 << width) - 1
  }
}

/// Unsigned slice `[pos, pos + width)`.
pub fn get_slc(value: u64, pos: u32, width: u32) -> u64 {
  (value >> pos) & mask(width)
}

/// Overwrite slice `[pos, pos + width)` with the low bits of `field`.
pub fn set_slc(value: u64, pos: u32, width: u32, field: u64) -> u64 {
  let m = mask(width) << pos;
  (value & !m) | ((field << pos) & m)
}

/// Interpret the low `width` bits as two's complement.
pub fn sign_extend(value: u64, width: u32) -> i64 {
  if width >= 64 {
    return value as i64;
  }
  let shift = 64 - width;
  ((value << shift) as i64) >> shift
}

/// Signed slice `[pos, pos + width)`.
pub fn get_signed(value: u64, pos: u32, width: u32) -> i64 {
  sign_extend(get_slc(value, pos, width), width)
}

/// Copy a `width`-bit element into every `width`-bit slot of a vector word.
pub fn replicate(element: u64, width: u32) -> VectorWord {
  let mut word = 0u64;
  let mut pos = 0;
  while pos < VECTOR_BITS {
    word = set_slc(word, pos, width, element);
    pos += width;
  }
  word as VectorWord
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_layout_table() {
    for mode in PrecisionMode::ALL {
      let l = mode.layout();
      assert_eq!(l.lanes * l.operand_bits, VECTOR_BITS);
      assert_eq!(l.lanes * l.accum_bits, ACCUM_BITS);
      assert_eq!(PrecisionMode::decode(mode.bits()), Some(mode));
    }
    assert_eq!(PrecisionMode::decode(3), None);
  }

  #[test]
  fn test_slices() {
    assert_eq!(get_slc(0xAABB_CCDD, 8, 8), 0xCC);
    assert_eq!(set_slc(0xAABB_CCDD, 16, 8, 0x1FF), 0xAAFF_CCDD);
    assert_eq!(get_signed(0x0000_FF00, 8, 8), -1);
    assert_eq!(sign_extend(0x7F, 8), 127);
    assert_eq!(sign_extend(u64::MAX, 64), -1);
  }

  #[test]
  fn test_replicate() {
    assert_eq!(replicate(0xAB, 8), 0xABAB_ABAB);
    assert_eq!(replicate(0x1234, 16), 0x1234_1234);
    assert_eq!(replicate(0xDEAD_BEEF, 32), 0xDEAD_BEEF);
  }
}
