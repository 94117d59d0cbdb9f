/// Per-mode multiply-accumulate datapath
///
/// The accumulator is split into `lanes` slices of `accum_bits`; lane k of a
/// vector word (bits `[k*w, (k+1)*w)`) pairs with accumulator slice k. All
/// arithmetic wraps at the slice width.
use crate::isa::mode::{get_signed, get_slc, mask, set_slc, AccumWord, PrecisionMode, VectorWord};

/// acc[k] += sext(matrix[k]) * sext(vector[k])
pub fn mac(acc: AccumWord, matrix: VectorWord, vector: VectorWord, mode: PrecisionMode) -> AccumWord {
  let l = mode.layout();
  let mut result = acc;
  for k in 0..l.lanes {
    let a = get_signed(matrix as u64, k * l.operand_bits, l.operand_bits);
    let b = get_signed(vector as u64, k * l.operand_bits, l.operand_bits);
    let lane = get_slc(acc, k * l.accum_bits, l.accum_bits);
    let sum = lane.wrapping_add(a.wrapping_mul(b) as u64);
    result = set_slc(result, k * l.accum_bits, l.accum_bits, sum);
  }
  result
}

/// acc[k] = sext(vector[k]); prior accumulator contents are not read.
pub fn pass(vector: VectorWord, mode: PrecisionMode) -> AccumWord {
  let l = mode.layout();
  let mut result = 0;
  for k in 0..l.lanes {
    let b = get_signed(vector as u64, k * l.operand_bits, l.operand_bits);
    result = set_slc(result, k * l.accum_bits, l.accum_bits, b as u64);
  }
  result
}

/// acc[k] >>= shift, arithmetic. Shifts past the slice width fill with sign.
pub fn rnd(acc: AccumWord, shift: u8, mode: PrecisionMode) -> AccumWord {
  let l = mode.layout();
  let shift = (shift as u32).min(63);
  let mut result = acc;
  for k in 0..l.lanes {
    let lane = get_signed(acc, k * l.accum_bits, l.accum_bits);
    result = set_slc(result, k * l.accum_bits, l.accum_bits, (lane >> shift) as u64);
  }
  result
}

/// out[k] = low `operand_bits` of acc[k]. Narrowing, not saturating.
pub fn out(acc: AccumWord, mode: PrecisionMode) -> VectorWord {
  let l = mode.layout();
  let mut word = 0u64;
  for k in 0..l.lanes {
    let lane = get_slc(acc, k * l.accum_bits, l.operand_bits);
    word = set_slc(word, k * l.operand_bits, l.operand_bits, lane);
  }
  (word & mask(32)) as VectorWord
}
