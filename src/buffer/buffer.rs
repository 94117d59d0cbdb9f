/// Shared Buffer - owns the matrix, vector and output scratchpads
///
/// Each cycle services, in order: one external matrix write, one external
/// vector write, one external output read, and one memory instruction from
/// the sequencer. External requests are picked up non-blocking; the read
/// response and the lane-facing traffic of READ/WRITE are blocking, and
/// while blocked the buffer does nothing else.
use log::{debug, trace};

use super::scratchpad::Scratchpad;
use crate::builtin::{InPort, Module, OutPort};
use crate::isa::mode::{get_slc, replicate, PrecisionMode, VectorWord};
use crate::isa::{MemOp, MemoryInstruction};

/// Channel endpoints owned by the buffer.
pub struct BufferPorts {
  pub inst_in: InPort<MemoryInstruction>,

  // per-lane operand and result channels
  pub matrix_out: Vec<OutPort<VectorWord>>,
  pub vector_out: Vec<OutPort<VectorWord>>,
  pub output_in: Vec<InPort<VectorWord>>,

  // external access
  pub matrix_write_addr: InPort<u32>,
  pub matrix_write_data: InPort<VectorWord>,
  pub vector_write_addr: InPort<u32>,
  pub vector_write_data: InPort<VectorWord>,
  pub output_read_addr: InPort<u32>,
  pub output_read_data: OutPort<VectorWord>,
}

/// Where a blocked loop iteration picks up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stall {
  /// Read-response push to the external requester.
  ReadResponse(VectorWord),
  /// READ dispatch; `cursor` counts matrix pushes then vector pushes.
  Read { base: usize, operand: VectorWord, cursor: usize },
  /// WRITE dispatch; `cursor` is the next lane to collect from.
  Write { base: usize, cursor: usize },
}

pub struct SharedBuffer {
  name: String,
  lane_count: usize,
  ports: BufferPorts,

  matrix_mem: Scratchpad,
  vector_mem: Scratchpad,
  output_mem: Scratchpad,

  stall: Option<Stall>,

  dispatched: u64,
  stalls: u64,
}

/// Broadcast operand for element `elem` of vector memory.
///
/// The element index splits into a word index and a sub-element index; the
/// addressed sub-element is replicated across the whole word so every lane
/// sees the same logical element. Reserved modes take the INT8 layout.
pub fn vector_operand(vector_mem: &Scratchpad, mode: Option<PrecisionMode>, elem: u16) -> VectorWord {
  let layout = mode.unwrap_or(PrecisionMode::Int8).layout();
  let per_word = layout.lanes as usize;
  let word = vector_mem.read(elem as usize / per_word);
  let sub = (elem as usize % per_word) as u32;
  let element = get_slc(word as u64, sub * layout.operand_bits, layout.operand_bits);
  replicate(element, layout.operand_bits)
}

impl SharedBuffer {
  pub fn new(name: impl Into<String>, lane_count: usize, depth: usize, ports: BufferPorts) -> Self {
    Self {
      name: name.into(),
      lane_count,
      ports,
      matrix_mem: Scratchpad::new("matrix_mem", depth),
      vector_mem: Scratchpad::new("vector_mem", depth),
      output_mem: Scratchpad::new("output_mem", depth),
      stall: None,
      dispatched: 0,
      stalls: 0,
    }
  }

  pub fn matrix_mem(&self) -> &Scratchpad {
    &self.matrix_mem
  }

  pub fn matrix_mem_mut(&mut self) -> &mut Scratchpad {
    &mut self.matrix_mem
  }

  pub fn vector_mem(&self) -> &Scratchpad {
    &self.vector_mem
  }

  pub fn vector_mem_mut(&mut self) -> &mut Scratchpad {
    &mut self.vector_mem
  }

  pub fn output_mem(&self) -> &Scratchpad {
    &self.output_mem
  }

  /// Memory instructions fully dispatched since reset.
  pub fn dispatched(&self) -> u64 {
    self.dispatched
  }

  pub fn stalls(&self) -> u64 {
    self.stalls
  }

  pub fn is_stalled(&self) -> bool {
    self.stall.is_some()
  }

  fn service_matrix_write(&mut self) {
    let ports = &self.ports;
    if ports.matrix_write_addr.is_valid() && ports.matrix_write_data.is_valid() {
      if let (Some(addr), Some(data)) = (ports.matrix_write_addr.pop_nb(), ports.matrix_write_data.pop_nb()) {
        trace!("[{}] matrix_mem[{}] <= {:#010x}", self.name, addr, data);
        self.matrix_mem.write(addr as usize, data);
      }
    }
  }

  fn service_vector_write(&mut self) {
    let ports = &self.ports;
    if ports.vector_write_addr.is_valid() && ports.vector_write_data.is_valid() {
      if let (Some(addr), Some(data)) = (ports.vector_write_addr.pop_nb(), ports.vector_write_data.pop_nb()) {
        trace!("[{}] vector_mem[{}] <= {:#010x}", self.name, addr, data);
        self.vector_mem.write(addr as usize, data);
      }
    }
  }

  /// Returns the stall if the response could not be sent.
  fn service_output_read(&mut self) -> Option<Stall> {
    let addr = self.ports.output_read_addr.pop_nb()?;
    let word = self.output_mem.read(addr as usize);
    trace!("[{}] output_mem[{}] => {:#010x}", self.name, addr, word);
    self.progress(Stall::ReadResponse(word))
  }

  /// Pick up one memory instruction and start dispatching it.
  fn service_instruction(&mut self) -> Option<Stall> {
    let inst = self.ports.inst_in.pop_nb()?;
    debug!("[{}] {}", self.name, inst);

    let base = inst.matrix_offset() as usize * self.lane_count;
    let work = match inst.op() {
      Some(MemOp::Read) => Stall::Read {
        base,
        operand: vector_operand(&self.vector_mem, inst.precision(), inst.vector_offset()),
        cursor: 0,
      },
      Some(MemOp::Write) => Stall::Write { base, cursor: 0 },
      Some(MemOp::Nop) | None => {
        self.dispatched += 1;
        return None;
      },
    };

    let blocked = self.progress(work);
    if blocked.is_none() {
      self.dispatched += 1;
    }
    blocked
  }

  /// Record newly blocked work; the cycle it first blocks counts as a stall.
  fn block(&mut self, stall: Option<Stall>) {
    if stall.is_some() {
      self.stalls += 1;
    }
    self.stall = stall;
  }

  /// Advance blocked work as far as the channels allow.
  fn progress(&mut self, work: Stall) -> Option<Stall> {
    let n = self.lane_count;
    match work {
      Stall::ReadResponse(word) => match self.ports.output_read_data.push_nb(word) {
        Ok(()) => None,
        Err(_) => Some(work),
      },
      Stall::Read { base, operand, mut cursor } => {
        while cursor < 2 * n {
          let pushed = if cursor < n {
            let word = self.matrix_mem.read(base + cursor);
            self.ports.matrix_out[cursor].push_nb(word)
          } else {
            self.ports.vector_out[cursor - n].push_nb(operand)
          };
          if pushed.is_err() {
            return Some(Stall::Read { base, operand, cursor });
          }
          cursor += 1;
        }
        None
      },
      Stall::Write { base, mut cursor } => {
        while cursor < n {
          match self.ports.output_in[cursor].pop_nb() {
            Some(word) => self.output_mem.write(base + cursor, word),
            None => return Some(Stall::Write { base, cursor }),
          }
          cursor += 1;
        }
        None
      },
    }
  }
}

impl Module for SharedBuffer {
  fn run(&mut self) {
    // finish whatever blocked the previous iteration first
    if let Some(work) = self.stall.take() {
      if let Some(still) = self.progress(work) {
        self.stall = Some(still);
        self.stalls += 1;
        return;
      }
      match work {
        // the read response precedes the instruction pickup in the same iteration
        Stall::ReadResponse(_) => {
          let blocked = self.service_instruction();
          self.block(blocked);
        },
        _ => self.dispatched += 1,
      }
      return;
    }

    self.service_matrix_write();
    self.service_vector_write();

    if let Some(stall) = self.service_output_read() {
      self.block(Some(stall));
      return;
    }

    let blocked = self.service_instruction();
    self.block(blocked);
  }

  fn reset(&mut self) {
    let ports = &self.ports;
    ports.inst_in.clear();
    ports.matrix_write_addr.clear();
    ports.matrix_write_data.clear();
    ports.vector_write_addr.clear();
    ports.vector_write_data.clear();
    ports.output_read_addr.clear();
    for port in &ports.output_in {
      port.clear();
    }
    self.matrix_mem.clear();
    self.vector_mem.clear();
    self.output_mem.clear();
    self.stall = None;
    self.dispatched = 0;
    self.stalls = 0;
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn is_idle(&self) -> bool {
    self.stall.is_none()
  }
}
