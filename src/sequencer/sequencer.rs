/// Sequencer - expands compound instructions into per-cycle pairs
use log::{debug, trace};

use crate::builtin::{InPort, Module, OutPort};
use crate::isa::instruction::MAX_OFFSET;
use crate::isa::{CompoundInstruction, LaneInstruction, MemoryInstruction};

/// Loop state of the compound instruction being expanded.
#[derive(Debug, Clone, Copy)]
struct Expansion {
  inst: CompoundInstruction,
  matrix_offset: u16,
  vector_offset: u16,
  iteration: u32,
}

impl Expansion {
  fn new(inst: CompoundInstruction) -> Self {
    Self {
      inst,
      matrix_offset: inst.mem.matrix_offset(),
      vector_offset: inst.mem.vector_offset(),
      iteration: 0,
    }
  }

  /// Memory instruction for the current iteration.
  fn mem(&self) -> MemoryInstruction {
    let mut mem = self.inst.mem;
    mem.set_matrix_offset(self.matrix_offset);
    mem.set_vector_offset(self.vector_offset);
    mem
  }

  /// Returns false once the inclusive count is exhausted.
  fn advance(&mut self) -> bool {
    if self.inst.matrix_inc {
      self.matrix_offset = (self.matrix_offset + 1) & MAX_OFFSET;
    }
    if self.inst.vector_inc {
      self.vector_offset = (self.vector_offset + 1) & MAX_OFFSET;
    }
    self.iteration += 1;
    self.iteration < self.inst.iterations()
  }
}

pub struct Sequencer {
  name: String,

  inst_in: InPort<CompoundInstruction>,
  buf_inst: OutPort<MemoryInstruction>,
  lane_inst: Vec<OutPort<LaneInstruction>>,

  active: Option<Expansion>,

  issued: u64,
  stalls: u64,
}

impl Sequencer {
  pub fn new(
    name: impl Into<String>,
    inst_in: InPort<CompoundInstruction>,
    buf_inst: OutPort<MemoryInstruction>,
    lane_inst: Vec<OutPort<LaneInstruction>>,
  ) -> Self {
    Self {
      name: name.into(),
      inst_in,
      buf_inst,
      lane_inst,
      active: None,
      issued: 0,
      stalls: 0,
    }
  }

  /// Memory+lane pairs issued since reset.
  pub fn issued(&self) -> u64 {
    self.issued
  }

  pub fn stalls(&self) -> u64 {
    self.stalls
  }

  /// The buffer and every lane can take this iteration's pair.
  fn can_issue(&self) -> bool {
    self.buf_inst.can_push() && self.lane_inst.iter().all(|port| port.can_push())
  }
}

impl Module for Sequencer {
  fn run(&mut self) {
    if self.active.is_none() {
      if let Some(inst) = self.inst_in.pop_nb() {
        debug!(
          "[{}] accept {} | {} count={} inc=({}, {})",
          self.name,
          inst.mem,
          inst.lane,
          inst.count(),
          inst.matrix_inc,
          inst.vector_inc
        );
        self.active = Some(Expansion::new(inst));
      }
    }

    let mut exp = match self.active {
      Some(exp) => exp,
      None => return,
    };

    // both halves go out in the same cycle or not at all
    if !self.can_issue() {
      self.stalls += 1;
      return;
    }

    let mem = exp.mem();
    let lane = exp.inst.lane;
    let sent = self.buf_inst.push_nb(mem).is_ok() && self.lane_inst.iter().all(|port| port.push_nb(lane).is_ok());
    debug_assert!(sent, "channel refused after reporting ready");
    trace!("[{}] iter {} -> {} | {}", self.name, exp.iteration, mem, lane);
    self.issued += 1;

    self.active = if exp.advance() { Some(exp) } else { None };
  }

  fn reset(&mut self) {
    self.inst_in.clear();
    self.active = None;
    self.issued = 0;
    self.stalls = 0;
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn is_idle(&self) -> bool {
    self.active.is_none()
  }
}
