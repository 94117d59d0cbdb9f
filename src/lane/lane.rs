/// Compute Lane - one processing element of the lane array
use log::{debug, trace};

use super::datapath;
use crate::builtin::{InPort, Module, OutPort};
use crate::isa::mode::{AccumWord, VectorWord};
use crate::isa::{LaneInstruction, SubOp};

/// One clocked lane with a private accumulator.
pub struct ComputeLane {
  name: String,

  // inputs
  inst_in: InPort<LaneInstruction>,
  matrix_in: InPort<VectorWord>,
  vector_in: InPort<VectorWord>,

  // output to the shared buffer
  output: OutPort<VectorWord>,

  accumulator: AccumWord,

  // instruction accepted but not yet retired (blocked on a channel)
  pending: Option<LaneInstruction>,
  // matrix operand popped while the vector operand was still missing
  held_matrix: Option<VectorWord>,

  retired: u64,
  stalls: u64,
}

impl ComputeLane {
  pub fn new(
    name: impl Into<String>,
    inst_in: InPort<LaneInstruction>,
    matrix_in: InPort<VectorWord>,
    vector_in: InPort<VectorWord>,
    output: OutPort<VectorWord>,
  ) -> Self {
    Self {
      name: name.into(),
      inst_in,
      matrix_in,
      vector_in,
      output,
      accumulator: 0,
      pending: None,
      held_matrix: None,
      retired: 0,
      stalls: 0,
    }
  }

  pub fn accumulator(&self) -> AccumWord {
    self.accumulator
  }

  /// Instructions fully executed since reset.
  pub fn retired(&self) -> u64 {
    self.retired
  }

  /// Cycles spent blocked on an operand or output channel.
  pub fn stalls(&self) -> u64 {
    self.stalls
  }

  pub fn is_stalled(&self) -> bool {
    self.pending.is_some()
  }

  /// Blocking receive of the (matrix, vector) pair, matrix first.
  fn take_operands(&mut self) -> Option<(VectorWord, VectorWord)> {
    if self.held_matrix.is_none() {
      self.held_matrix = self.matrix_in.pop_nb();
    }
    self.held_matrix?;
    let vector = self.vector_in.pop_nb()?;
    let matrix = self.held_matrix.take()?;
    Some((matrix, vector))
  }

  /// Execute `inst`. Returns false while blocked on a channel.
  fn execute(&mut self, inst: LaneInstruction) -> bool {
    let mode = inst.precision();

    if inst.is_rnd() {
      if let Some(mode) = mode {
        self.accumulator = datapath::rnd(self.accumulator, inst.value(), mode);
      }
      return true;
    }

    match inst.sub_op() {
      Some(op) if op.takes_operands() => {
        let (matrix, vector) = match self.take_operands() {
          Some(operands) => operands,
          None => return false,
        };
        if let Some(mode) = mode {
          self.accumulator = match op {
            SubOp::Mac => datapath::mac(self.accumulator, matrix, vector, mode),
            _ => datapath::pass(vector, mode),
          };
        }
        true
      },
      Some(SubOp::Out) => {
        let word = mode.map_or(0, |mode| datapath::out(self.accumulator, mode));
        match self.output.push_nb(word) {
          Ok(()) => {
            trace!("[{}] OUT {:#010x}", self.name, word);
            true
          },
          Err(_) => false,
        }
      },
      Some(SubOp::Clr) => {
        self.accumulator = 0;
        true
      },
      // NOP and undecoded sub-ops
      _ => true,
    }
  }
}

impl Module for ComputeLane {
  fn run(&mut self) {
    if self.pending.is_none() {
      self.pending = self.inst_in.pop_nb();
      if let Some(inst) = self.pending {
        debug!("[{}] {}", self.name, inst);
      }
    }

    let inst = match self.pending {
      Some(inst) => inst,
      None => return,
    };

    if self.execute(inst) {
      self.pending = None;
      self.retired += 1;
    } else {
      self.stalls += 1;
      trace!("[{}] stalled on {}", self.name, inst);
    }
  }

  fn reset(&mut self) {
    self.inst_in.clear();
    self.matrix_in.clear();
    self.vector_in.clear();
    self.accumulator = 0;
    self.pending = None;
    self.held_matrix = None;
    self.retired = 0;
    self.stalls = 0;
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn is_idle(&self) -> bool {
    self.pending.is_none() && self.held_matrix.is_none()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builtin::channel;
  use crate::isa::PrecisionMode::{self, Int16, Int32, Int8};

  struct Bench {
    lane: ComputeLane,
    inst: OutPort<LaneInstruction>,
    matrix: OutPort<VectorWord>,
    vector: OutPort<VectorWord>,
    out: InPort<VectorWord>,
  }

  fn bench() -> Bench {
    let (inst, inst_rx) = channel("inst", 1);
    let (matrix, matrix_rx) = channel("matrix", 1);
    let (vector, vector_rx) = channel("vector", 1);
    let (out_tx, out) = channel("out", 1);
    Bench {
      lane: ComputeLane::new("lane0", inst_rx, matrix_rx, vector_rx, out_tx),
      inst,
      matrix,
      vector,
      out,
    }
  }

  impl Bench {
    fn exec(&mut self, text: &str) {
      self.inst.push_nb(text.parse().unwrap()).unwrap();
      self.lane.run();
    }

    fn exec_with(&mut self, text: &str, matrix: u32, vector: u32) {
      self.matrix.push_nb(matrix).unwrap();
      self.vector.push_nb(vector).unwrap();
      self.exec(text);
    }

    fn result(&mut self, mode: PrecisionMode) -> u32 {
      self.exec(&format!("OUT {}", mode));
      self.out.pop_nb().unwrap()
    }
  }

  #[test]
  fn test_clr_mac_mac_out() {
    for mode in PrecisionMode::ALL {
      let mut b = bench();
      b.exec(&format!("CLR {}", mode));
      b.exec_with(&format!("MAC {}", mode), 0x0203_0405, 0x0101_0101);
      b.exec_with(&format!("MAC {}", mode), 0x0101_0101, 0x0202_0202);
      let acc = datapath::mac(datapath::mac(0, 0x0203_0405, 0x0101_0101, mode), 0x0101_0101, 0x0202_0202, mode);
      assert_eq!(b.result(mode), datapath::out(acc, mode));
      assert_eq!(b.lane.retired(), 4);
    }
  }

  #[test]
  fn test_mac_stalls_until_operands_arrive() {
    let mut b = bench();
    b.exec("MAC INT32");
    assert!(b.lane.is_stalled());
    assert!(!b.lane.is_idle());

    // only the matrix operand: still blocked, operand is held
    b.matrix.push_nb(3).unwrap();
    b.lane.run();
    assert!(b.lane.is_stalled());
    assert!(b.matrix.can_push());

    b.vector.push_nb(5).unwrap();
    b.lane.run();
    assert!(b.lane.is_idle());
    assert_eq!(b.lane.accumulator(), 15);
    assert_eq!(b.lane.stalls(), 2);
  }

  #[test]
  fn test_pass_consumes_matrix_and_overwrites() {
    let mut b = bench();
    b.exec_with("MAC INT16", 0x0007_0007, 0x0003_0003);
    b.exec_with("PASS INT16", 0xFFFF_FFFF, 0xFFFE_0005);
    assert_eq!(b.lane.accumulator(), 0xFFFF_FFFE_0000_0005);
    assert!(b.matrix.can_push());
  }

  #[test]
  fn test_rnd_uses_value_as_shift() {
    let mut b = bench();
    b.exec_with("PASS INT8", 0, 0x10F0_4080);
    b.exec("RND INT8 4");
    // lanes -128, 64, -16, 16 shifted by 4
    assert_eq!(b.result(Int8), 0x01FF_04F8);
  }

  #[test]
  fn test_rnd_after_mac_shifts_accumulated_sums() {
    let mut b = bench();
    // lanes (hi, lo) = (100, -7) times (3, 5), twice
    b.exec_with("MAC INT16", 0x0064_FFF9, 0x0003_0005);
    b.exec_with("MAC INT16", 0x0064_FFF9, 0x0003_0005);
    assert_eq!(b.lane.accumulator(), 0x0000_0258_FFFF_FFBA);
    b.exec("RND INT16 3");
    // 600 >> 3 = 75, -70 >> 3 = -9
    assert_eq!(b.lane.accumulator(), 0x0000_004B_FFFF_FFF7);
    assert_eq!(b.result(Int16), 0x004B_FFF7);
  }

  #[test]
  fn test_out_blocks_on_full_output() {
    let mut b = bench();
    b.exec_with("PASS INT32", 0, 42);
    b.exec("OUT INT32");
    b.exec("OUT INT32");
    assert!(b.lane.is_stalled());
    assert_eq!(b.out.pop_nb(), Some(42));
    b.lane.run();
    assert!(b.lane.is_idle());
    assert_eq!(b.out.pop_nb(), Some(42));
  }

  #[test]
  fn test_nop_and_reserved_sub_opcode() {
    let mut b = bench();
    b.exec_with("PASS INT16", 0, 0x0001_0002);
    let before = b.lane.accumulator();
    b.exec("NOP INT16");
    // value 31 is not a defined sub-opcode
    b.inst.push_nb(LaneInstruction::from_fields(0, 1, 31)).unwrap();
    b.lane.run();
    assert!(b.lane.is_idle());
    assert_eq!(b.lane.accumulator(), before);
    assert_eq!(b.lane.retired(), 3);
  }

  #[test]
  fn test_reserved_mode() {
    let mut b = bench();
    b.exec_with("PASS INT32", 0, 9);

    // MAC with mode 3: operands consumed, accumulator untouched
    b.matrix.push_nb(2).unwrap();
    b.vector.push_nb(2).unwrap();
    b.inst.push_nb(LaneInstruction::from_fields(0, 3, SubOp::Mac.bits())).unwrap();
    b.lane.run();
    assert!(b.lane.is_idle());
    assert!(b.matrix.can_push() && b.vector.can_push());
    assert_eq!(b.lane.accumulator(), 9);

    // RND with mode 3 is a no-op
    b.inst.push_nb(LaneInstruction::from_fields(1, 3, 2)).unwrap();
    b.lane.run();
    assert_eq!(b.lane.accumulator(), 9);

    // OUT with mode 3 still produces a word
    b.inst.push_nb(LaneInstruction::from_fields(0, 3, SubOp::Out.bits())).unwrap();
    b.lane.run();
    assert_eq!(b.out.pop_nb(), Some(0));
  }

  #[test]
  fn test_accumulator_persists_until_clr() {
    let mut b = bench();
    b.exec_with("MAC INT32", 6, 7);
    b.exec("NOP INT32");
    b.exec_with("MAC INT32", 1, 1);
    assert_eq!(b.result(Int32), 43);
    b.exec("CLR INT32");
    assert_eq!(b.lane.accumulator(), 0);
    assert_eq!(b.result(Int16), 0);
  }

  #[test]
  fn test_reset() {
    let mut b = bench();
    b.exec_with("MAC INT32", 6, 7);
    b.exec("MAC INT32");
    b.lane.reset();
    assert!(b.lane.is_idle());
    assert_eq!(b.lane.accumulator(), 0);
    assert_eq!(b.lane.retired(), 0);
  }
}
