/// Instruction layouts
///
/// Three packed formats share one field convention: fields hold raw bits
/// exactly as they travel on the wire, and decoding onto enums happens at
/// the consumer. Reserved encodings therefore survive a pack/unpack and
/// reach the decoder, which treats them as no-ops.
///
/// ```text
/// lane     (9b)  : [1:0] opcode  [3:2] mode  [8:4] value
/// memory   (24b) : [1:0] opcode  [3:2] mode  [13:4] matrix row  [23:14] vector elem
/// compound (45b) : [23:0] memory [32:24] lane [42:33] count [43] mat inc [44] vec inc
/// ```
use serde::{Deserialize, Serialize};

use super::mode::{get_slc, mask, set_slc, PrecisionMode};

pub const OPCODE_BITS: u32 = 2;
pub const MODE_BITS: u32 = 2;
pub const VALUE_BITS: u32 = 5;
pub const OFFSET_BITS: u32 = 10;
pub const COUNT_BITS: u32 = 10;

pub const LANE_INST_BITS: u32 = OPCODE_BITS + MODE_BITS + VALUE_BITS;
pub const MEM_INST_BITS: u32 = OPCODE_BITS + MODE_BITS + 2 * OFFSET_BITS;
pub const COMPOUND_INST_BITS: u32 = MEM_INST_BITS + LANE_INST_BITS + COUNT_BITS + 2;

/// Largest matrix-row / vector-element offset an instruction can carry.
pub const MAX_OFFSET: u16 = (1 << OFFSET_BITS) - 1;
/// Largest loop count (the loop runs `count + 1` times).
pub const MAX_COUNT: u16 = (1 << COUNT_BITS) - 1;

/// Lane opcode. Anything other than RND selects the sub-opcode path.
pub const LANE_OP_NONE: u8 = 0;
pub const LANE_OP_RND: u8 = 1;

/// Lane sub-opcode carried in the value field when opcode != RND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubOp {
  Nop,
  Mac,
  Pass,
  Out,
  Clr,
}

impl SubOp {
  pub fn decode(value: u8) -> Option<Self> {
    match value {
      0 => Some(SubOp::Nop),
      1 => Some(SubOp::Mac),
      2 => Some(SubOp::Pass),
      3 => Some(SubOp::Out),
      4 => Some(SubOp::Clr),
      _ => None,
    }
  }

  pub fn bits(self) -> u8 {
    match self {
      SubOp::Nop => 0,
      SubOp::Mac => 1,
      SubOp::Pass => 2,
      SubOp::Out => 3,
      SubOp::Clr => 4,
    }
  }

  /// MAC and PASS pop one matrix and one vector operand.
  pub fn takes_operands(self) -> bool {
    matches!(self, SubOp::Mac | SubOp::Pass)
  }
}

/// Memory opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemOp {
  Nop,
  Read,
  Write,
}

impl MemOp {
  pub fn decode(bits: u8) -> Option<Self> {
    match bits & 0x3 {
      0 => Some(MemOp::Nop),
      1 => Some(MemOp::Read),
      2 => Some(MemOp::Write),
      _ => None,
    }
  }

  pub fn bits(self) -> u8 {
    match self {
      MemOp::Nop => 0,
      MemOp::Read => 1,
      MemOp::Write => 2,
    }
  }
}

/// Instruction broadcast to every compute lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LaneInstruction {
  opcode: u8,
  mode: u8,
  value: u8,
}

impl LaneInstruction {
  pub fn from_fields(opcode: u8, mode: u8, value: u8) -> Self {
    Self {
      opcode: opcode & mask(OPCODE_BITS) as u8,
      mode: mode & mask(MODE_BITS) as u8,
      value: value & mask(VALUE_BITS) as u8,
    }
  }

  pub fn sub(op: SubOp, mode: PrecisionMode) -> Self {
    Self::from_fields(LANE_OP_NONE, mode.bits(), op.bits())
  }

  /// Arithmetic right shift of every accumulator lane by `shift` bits.
  pub fn rnd(mode: PrecisionMode, shift: u8) -> Self {
    Self::from_fields(LANE_OP_RND, mode.bits(), shift)
  }

  pub fn opcode(&self) -> u8 {
    self.opcode
  }

  pub fn mode(&self) -> u8 {
    self.mode
  }

  pub fn value(&self) -> u8 {
    self.value
  }

  pub fn is_rnd(&self) -> bool {
    self.opcode == LANE_OP_RND
  }

  pub fn precision(&self) -> Option<PrecisionMode> {
    PrecisionMode::decode(self.mode)
  }

  /// Sub-opcode, or `None` for RND and reserved values.
  pub fn sub_op(&self) -> Option<SubOp> {
    if self.is_rnd() {
      None
    } else {
      SubOp::decode(self.value)
    }
  }

  pub fn pack(&self) -> u16 {
    let mut bits = 0u64;
    bits = set_slc(bits, 0, OPCODE_BITS, self.opcode as u64);
    bits = set_slc(bits, OPCODE_BITS, MODE_BITS, self.mode as u64);
    bits = set_slc(bits, OPCODE_BITS + MODE_BITS, VALUE_BITS, self.value as u64);
    bits as u16
  }

  pub fn unpack(bits: u16) -> Self {
    let bits = bits as u64;
    Self::from_fields(
      get_slc(bits, 0, OPCODE_BITS) as u8,
      get_slc(bits, OPCODE_BITS, MODE_BITS) as u8,
      get_slc(bits, OPCODE_BITS + MODE_BITS, VALUE_BITS) as u8,
    )
  }
}

/// One scratchpad access covering all lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryInstruction {
  opcode: u8,
  mode: u8,
  matrix_offset: u16,
  vector_offset: u16,
}

impl MemoryInstruction {
  pub fn from_fields(opcode: u8, mode: u8, matrix_offset: u16, vector_offset: u16) -> Self {
    Self {
      opcode: opcode & mask(OPCODE_BITS) as u8,
      mode: mode & mask(MODE_BITS) as u8,
      matrix_offset: matrix_offset & MAX_OFFSET,
      vector_offset: vector_offset & MAX_OFFSET,
    }
  }

  pub fn new(op: MemOp, mode: PrecisionMode, matrix_offset: u16, vector_offset: u16) -> Self {
    Self::from_fields(op.bits(), mode.bits(), matrix_offset, vector_offset)
  }

  pub fn nop() -> Self {
    Self::default()
  }

  pub fn opcode(&self) -> u8 {
    self.opcode
  }

  pub fn mode(&self) -> u8 {
    self.mode
  }

  pub fn op(&self) -> Option<MemOp> {
    MemOp::decode(self.opcode)
  }

  pub fn precision(&self) -> Option<PrecisionMode> {
    PrecisionMode::decode(self.mode)
  }

  pub fn matrix_offset(&self) -> u16 {
    self.matrix_offset
  }

  pub fn vector_offset(&self) -> u16 {
    self.vector_offset
  }

  /// Offsets are 10-bit fields; larger values wrap.
  pub fn set_matrix_offset(&mut self, offset: u16) {
    self.matrix_offset = offset & MAX_OFFSET;
  }

  pub fn set_vector_offset(&mut self, offset: u16) {
    self.vector_offset = offset & MAX_OFFSET;
  }

  pub fn pack(&self) -> u32 {
    let mut bits = 0u64;
    bits = set_slc(bits, 0, OPCODE_BITS, self.opcode as u64);
    bits = set_slc(bits, OPCODE_BITS, MODE_BITS, self.mode as u64);
    bits = set_slc(bits, OPCODE_BITS + MODE_BITS, OFFSET_BITS, self.matrix_offset as u64);
    bits = set_slc(bits, OPCODE_BITS + MODE_BITS + OFFSET_BITS, OFFSET_BITS, self.vector_offset as u64);
    bits as u32
  }

  pub fn unpack(bits: u32) -> Self {
    let bits = bits as u64;
    Self::from_fields(
      get_slc(bits, 0, OPCODE_BITS) as u8,
      get_slc(bits, OPCODE_BITS, MODE_BITS) as u8,
      get_slc(bits, OPCODE_BITS + MODE_BITS, OFFSET_BITS) as u16,
      get_slc(bits, OPCODE_BITS + MODE_BITS + OFFSET_BITS, OFFSET_BITS) as u16,
    )
  }
}

/// Loop-bearing instruction accepted by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompoundInstruction {
  pub mem: MemoryInstruction,
  pub lane: LaneInstruction,
  /// Inclusive: the pair is issued `count + 1` times.
  #[serde(default)]
  count: u16,
  #[serde(default)]
  pub matrix_inc: bool,
  #[serde(default)]
  pub vector_inc: bool,
}

impl CompoundInstruction {
  pub fn new(mem: MemoryInstruction, lane: LaneInstruction) -> Self {
    Self {
      mem,
      lane,
      ..Self::default()
    }
  }

  /// Loop count, masked to the 10-bit field.
  pub fn with_count(mut self, count: u16) -> Self {
    self.count = count & MAX_COUNT;
    self
  }

  pub fn with_increments(mut self, matrix_inc: bool, vector_inc: bool) -> Self {
    self.matrix_inc = matrix_inc;
    self.vector_inc = vector_inc;
    self
  }

  pub fn count(&self) -> u16 {
    self.count & MAX_COUNT
  }

  /// Number of memory+lane pairs this instruction expands to.
  pub fn iterations(&self) -> u32 {
    self.count() as u32 + 1
  }

  pub fn pack(&self) -> u64 {
    let mut bits = 0u64;
    let lane_pos = MEM_INST_BITS;
    let count_pos = lane_pos + LANE_INST_BITS;
    let inc_pos = count_pos + COUNT_BITS;
    bits = set_slc(bits, 0, MEM_INST_BITS, self.mem.pack() as u64);
    bits = set_slc(bits, lane_pos, LANE_INST_BITS, self.lane.pack() as u64);
    bits = set_slc(bits, count_pos, COUNT_BITS, self.count() as u64);
    bits = set_slc(bits, inc_pos, 1, self.matrix_inc as u64);
    bits = set_slc(bits, inc_pos + 1, 1, self.vector_inc as u64);
    bits
  }

  pub fn unpack(bits: u64) -> Self {
    let lane_pos = MEM_INST_BITS;
    let count_pos = lane_pos + LANE_INST_BITS;
    let inc_pos = count_pos + COUNT_BITS;
    Self {
      mem: MemoryInstruction::unpack(get_slc(bits, 0, MEM_INST_BITS) as u32),
      lane: LaneInstruction::unpack(get_slc(bits, lane_pos, LANE_INST_BITS) as u16),
      count: get_slc(bits, count_pos, COUNT_BITS) as u16,
      matrix_inc: get_slc(bits, inc_pos, 1) != 0,
      vector_inc: get_slc(bits, inc_pos + 1, 1) != 0,
    }
  }
}
