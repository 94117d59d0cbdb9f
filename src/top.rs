/// Top Module - wires the Sequencer, the Shared Buffer and the lane array
use log::{debug, trace};
use serde::Serialize;

use crate::buffer::{BufferPorts, Scratchpad, SharedBuffer};
use crate::builtin::{channel, InPort, Module, OutPort, Probe};
use crate::config::{AcceleratorConfig, DEFAULT_MAX_CYCLES};
use crate::error::{Error, Result};
use crate::isa::mode::{AccumWord, VectorWord};
use crate::isa::CompoundInstruction;
use crate::lane::ComputeLane;
use crate::sequencer::Sequencer;

/// Host-side channel endpoints.
///
/// Pushing to `inst` starts a compound instruction; the write pairs must be
/// pushed together (the buffer only accepts a write when both halves are
/// present); a word pushed to `output_read_addr` is answered on
/// `output_read_data`.
pub struct HostPorts {
  pub inst: OutPort<CompoundInstruction>,
  pub matrix_write_addr: OutPort<u32>,
  pub matrix_write_data: OutPort<VectorWord>,
  pub vector_write_addr: OutPort<u32>,
  pub vector_write_data: OutPort<VectorWord>,
  pub output_read_addr: OutPort<u32>,
  pub output_read_data: InPort<VectorWord>,
}

/// What a component did in the last cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
  Idle,
  Busy,
  Stalled,
}

/// Progress counters sampled around one `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counters {
  work: u64,
  stalls: u64,
}

impl Counters {
  fn activity(before: Counters, after: Counters, idle: bool) -> Activity {
    if after.stalls > before.stalls {
      Activity::Stalled
    } else if after.work > before.work || !idle {
      Activity::Busy
    } else {
      Activity::Idle
    }
  }
}

/// Accelerator - the whole compute core
pub struct Accelerator {
  name: String,
  config: AcceleratorConfig,
  cycle_limit: u64,

  host: HostPorts,

  pub sequencer: Sequencer,
  pub buffer: SharedBuffer,
  lanes: Vec<ComputeLane>,

  // every channel, for idle detection
  probes: Vec<Probe>,

  cycles: u64,
  activity: Vec<(String, Activity)>,
}

impl Accelerator {
  pub fn new(name: impl Into<String>, config: &AcceleratorConfig) -> Result<Self> {
    config.validate()?;
    let n = config.lane_count;
    let depth = config.channel_depth;
    let mut probes = Vec::new();

    macro_rules! wire {
      ($name:expr) => {{
        let (tx, rx) = channel($name, depth);
        probes.push(tx.probe());
        (tx, rx)
      }};
    }

    let (inst, seq_inst_in) = wire!("host.inst");
    let (seq_mem_out, buf_inst_in) = wire!("seq.mem_inst");
    let (matrix_write_addr, buf_mw_addr) = wire!("host.matrix_write_addr");
    let (matrix_write_data, buf_mw_data) = wire!("host.matrix_write_data");
    let (vector_write_addr, buf_vw_addr) = wire!("host.vector_write_addr");
    let (vector_write_data, buf_vw_data) = wire!("host.vector_write_data");
    let (output_read_addr, buf_rd_addr) = wire!("host.output_read_addr");
    let (buf_rd_data, output_read_data) = wire!("buffer.output_read_data");

    let mut seq_lane_out = Vec::with_capacity(n);
    let mut matrix_out = Vec::with_capacity(n);
    let mut vector_out = Vec::with_capacity(n);
    let mut output_in = Vec::with_capacity(n);
    let mut lanes = Vec::with_capacity(n);
    for k in 0..n {
      let (inst_tx, inst_rx) = wire!(format!("seq.lane_inst[{}]", k));
      let (m_tx, m_rx) = wire!(format!("buffer.matrix[{}]", k));
      let (v_tx, v_rx) = wire!(format!("buffer.vector[{}]", k));
      let (o_tx, o_rx) = wire!(format!("lane[{}].output", k));
      seq_lane_out.push(inst_tx);
      matrix_out.push(m_tx);
      vector_out.push(v_tx);
      output_in.push(o_rx);
      lanes.push(ComputeLane::new(format!("lane[{}]", k), inst_rx, m_rx, v_rx, o_tx));
    }

    let ports = BufferPorts {
      inst_in: buf_inst_in,
      matrix_out,
      vector_out,
      output_in,
      matrix_write_addr: buf_mw_addr,
      matrix_write_data: buf_mw_data,
      vector_write_addr: buf_vw_addr,
      vector_write_data: buf_vw_data,
      output_read_addr: buf_rd_addr,
      output_read_data: buf_rd_data,
    };

    let sequencer = Sequencer::new("sequencer", seq_inst_in, seq_mem_out, seq_lane_out);
    let buffer = SharedBuffer::new("buffer", n, config.memory_depth, ports);

    let mut accel = Self {
      name: name.into(),
      config: config.clone(),
      cycle_limit: DEFAULT_MAX_CYCLES,
      host: HostPorts {
        inst,
        matrix_write_addr,
        matrix_write_data,
        vector_write_addr,
        vector_write_data,
        output_read_addr,
        output_read_data,
      },
      sequencer,
      buffer,
      lanes,
      probes,
      cycles: 0,
      activity: Vec::new(),
    };
    accel.activity = accel.component_names().into_iter().map(|name| (name, Activity::Idle)).collect();
    debug!(
      "[{}] {} lanes, {} words per memory, channel depth {}",
      accel.name, n, config.memory_depth, depth
    );
    Ok(accel)
  }

  /// Bound for `run_until_idle` and the blocking host helpers.
  pub fn with_cycle_limit(mut self, limit: u64) -> Self {
    self.cycle_limit = limit;
    self
  }

  pub fn config(&self) -> &AcceleratorConfig {
    &self.config
  }

  pub fn lane_count(&self) -> usize {
    self.lanes.len()
  }

  pub fn host(&self) -> &HostPorts {
    &self.host
  }

  pub fn lane(&self, k: usize) -> &ComputeLane {
    &self.lanes[k]
  }

  pub fn lanes(&self) -> &[ComputeLane] {
    &self.lanes
  }

  /// Lane accumulators in lane order.
  pub fn accumulators(&self) -> Vec<AccumWord> {
    self.lanes.iter().map(|lane| lane.accumulator()).collect()
  }

  pub fn cycles(&self) -> u64 {
    self.cycles
  }

  /// Per-component activity of the last cycle, sequencer first.
  pub fn activity(&self) -> &[(String, Activity)] {
    &self.activity
  }

  fn component_names(&self) -> Vec<String> {
    let mut names = vec![self.sequencer.name().to_string(), self.buffer.name().to_string()];
    names.extend(self.lanes.iter().map(|lane| lane.name().to_string()));
    names
  }

  /// Advance one clock.
  pub fn step(&mut self) {
    self.run();
  }

  /// Run until no channel holds data and no component has work in flight.
  pub fn run_until_idle(&mut self, max_cycles: u64) -> Result<u64> {
    let start = self.cycles;
    while !self.is_idle() {
      if self.cycles - start >= max_cycles {
        return Err(Error::CycleLimit(max_cycles));
      }
      self.step();
    }
    Ok(self.cycles - start)
  }

  /// Step until `ready` holds, bounded by the cycle limit.
  fn wait_until(&mut self, ready: impl Fn(&HostPorts) -> bool) -> Result<()> {
    let start = self.cycles;
    while !ready(&self.host) {
      if self.cycles - start >= self.cycle_limit {
        return Err(Error::CycleLimit(self.cycle_limit));
      }
      self.step();
    }
    Ok(())
  }

  /// Hand one compound instruction to the sequencer, stepping while it is busy.
  pub fn issue(&mut self, inst: CompoundInstruction) -> Result<()> {
    self.wait_until(|host| host.inst.can_push())?;
    let sent = self.host.inst.push_nb(inst).is_ok();
    debug_assert!(sent, "instruction channel refused after reporting ready");
    Ok(())
  }

  pub fn write_matrix(&mut self, addr: u32, word: VectorWord) -> Result<()> {
    self.wait_until(|host| host.matrix_write_addr.can_push() && host.matrix_write_data.can_push())?;
    let sent = self.host.matrix_write_addr.push_nb(addr).is_ok() && self.host.matrix_write_data.push_nb(word).is_ok();
    debug_assert!(sent, "matrix write channels refused after reporting ready");
    Ok(())
  }

  pub fn write_vector(&mut self, addr: u32, word: VectorWord) -> Result<()> {
    self.wait_until(|host| host.vector_write_addr.can_push() && host.vector_write_data.can_push())?;
    let sent = self.host.vector_write_addr.push_nb(addr).is_ok() && self.host.vector_write_data.push_nb(word).is_ok();
    debug_assert!(sent, "vector write channels refused after reporting ready");
    Ok(())
  }

  /// Read one word of output memory through the buffer's read port.
  pub fn read_output(&mut self, addr: u32) -> Result<VectorWord> {
    self.wait_until(|host| host.output_read_addr.can_push())?;
    let sent = self.host.output_read_addr.push_nb(addr).is_ok();
    debug_assert!(sent, "read address channel refused after reporting ready");
    self.wait_until(|host| host.output_read_data.is_valid())?;
    self.host.output_read_data.pop_nb().ok_or(Error::CycleLimit(self.cycle_limit))
  }

  /// Back-door load of the whole matrix memory.
  pub fn load_matrix(&mut self, image: &[VectorWord]) -> Result<()> {
    self.buffer.matrix_mem_mut().load(image)
  }

  /// Back-door load of the whole vector memory.
  pub fn load_vector(&mut self, image: &[VectorWord]) -> Result<()> {
    self.buffer.vector_mem_mut().load(image)
  }

  pub fn output_memory(&self) -> &[VectorWord] {
    self.buffer.output_mem().words()
  }

  pub fn matrix_memory(&self) -> &Scratchpad {
    self.buffer.matrix_mem()
  }

  pub fn vector_memory(&self) -> &Scratchpad {
    self.buffer.vector_mem()
  }
}

impl Module for Accelerator {
  fn run(&mut self) {
    // producers before consumers: a value pushed this cycle is seen this cycle
    let mut before = Vec::with_capacity(self.lanes.len() + 2);
    before.push(Counters {
      work: self.sequencer.issued(),
      stalls: self.sequencer.stalls(),
    });
    before.push(Counters {
      work: self.buffer.dispatched(),
      stalls: self.buffer.stalls(),
    });
    before.extend(self.lanes.iter().map(|lane| Counters {
      work: lane.retired(),
      stalls: lane.stalls(),
    }));

    self.sequencer.run();
    self.buffer.run();
    for lane in self.lanes.iter_mut() {
      lane.run();
    }

    let mut after = vec![
      (
        Counters {
          work: self.sequencer.issued(),
          stalls: self.sequencer.stalls(),
        },
        self.sequencer.is_idle(),
      ),
      (
        Counters {
          work: self.buffer.dispatched(),
          stalls: self.buffer.stalls(),
        },
        self.buffer.is_idle(),
      ),
    ];
    after.extend(self.lanes.iter().map(|lane| {
      (
        Counters {
          work: lane.retired(),
          stalls: lane.stalls(),
        },
        lane.is_idle(),
      )
    }));
    for ((slot, before), (after, idle)) in self.activity.iter_mut().zip(before).zip(after) {
      slot.1 = Counters::activity(before, after, idle);
    }

    self.cycles += 1;
    trace!("[{}] cycle {} done", self.name, self.cycles);
  }

  fn reset(&mut self) {
    self.sequencer.reset();
    self.buffer.reset();
    for lane in self.lanes.iter_mut() {
      lane.reset();
    }
    self.host.output_read_data.clear();
    self.cycles = 0;
    for slot in self.activity.iter_mut() {
      slot.1 = Activity::Idle;
    }
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn is_idle(&self) -> bool {
    self.probes.iter().all(|probe| probe.is_empty())
      && self.sequencer.is_idle()
      && self.buffer.is_idle()
      && self.lanes.iter().all(|lane| lane.is_idle())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::isa::{LaneInstruction, MemOp, MemoryInstruction, PrecisionMode, SubOp};

  fn small() -> Accelerator {
    Accelerator::new("accel", &AcceleratorConfig::new(4, 64)).unwrap().with_cycle_limit(100)
  }

  #[test]
  fn test_new_validates() {
    assert!(matches!(
      Accelerator::new("accel", &AcceleratorConfig::new(3, 64)),
      Err(Error::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_idle_after_construction() {
    let accel = small();
    assert!(accel.is_idle());
    assert_eq!(accel.cycles(), 0);
    assert_eq!(accel.activity().len(), 6);
    assert_eq!(accel.activity()[2].0, "lane[0]");
  }

  #[test]
  fn test_host_write_then_read() {
    let mut accel = small();
    accel.write_matrix(5, 0x1234).unwrap();
    accel.write_vector(6, 0x5678).unwrap();
    accel.run_until_idle(10).unwrap();
    assert_eq!(accel.matrix_memory().read(5), 0x1234);
    assert_eq!(accel.vector_memory().read(6), 0x5678);
    assert_eq!(accel.read_output(0).unwrap(), 0);
  }

  #[test]
  fn test_pending_half_write_is_not_idle() {
    let mut accel = small();
    accel.host().matrix_write_addr.push_nb(1).unwrap();
    assert!(matches!(accel.run_until_idle(20), Err(Error::CycleLimit(20))));
    accel.reset();
    assert!(accel.is_idle());
  }

  #[test]
  fn test_activity_reports_stall() {
    let mut accel = small();
    // a MAC with no READ: every lane waits for operands
    let inst = CompoundInstruction::new(
      MemoryInstruction::nop(),
      LaneInstruction::sub(SubOp::Mac, PrecisionMode::Int32),
    );
    accel.issue(inst).unwrap();
    accel.step();
    accel.step();
    assert!(accel.activity()[2..].iter().all(|(_, a)| *a == Activity::Stalled));
    assert_eq!(accel.activity()[1].1, Activity::Idle);
    assert!(accel.run_until_idle(50).is_err());

    // the matching READ releases them
    let read = CompoundInstruction::new(
      MemoryInstruction::new(MemOp::Read, PrecisionMode::Int32, 0, 0),
      LaneInstruction::sub(SubOp::Nop, PrecisionMode::Int32),
    );
    accel.issue(read).unwrap();
    accel.run_until_idle(50).unwrap();
    assert!(accel.lanes().iter().all(|lane| lane.retired() == 2));
  }

  #[test]
  fn test_blocked_write_reports_buffer_stalled() {
    let mut accel = small();
    // WRITE paired with NOP: no lane ever sends an output word
    let write = CompoundInstruction::new(
      MemoryInstruction::new(MemOp::Write, PrecisionMode::Int32, 2, 0),
      LaneInstruction::sub(SubOp::Nop, PrecisionMode::Int32),
    );
    accel.issue(write).unwrap();
    accel.step();
    assert_eq!(accel.activity()[1].1, Activity::Stalled);
    accel.step();
    assert_eq!(accel.activity()[1].1, Activity::Stalled);
    assert_eq!(accel.buffer.stalls(), 2);

    let out = CompoundInstruction::new(
      MemoryInstruction::nop(),
      LaneInstruction::sub(SubOp::Out, PrecisionMode::Int32),
    );
    accel.issue(out).unwrap();
    accel.run_until_idle(50).unwrap();
    assert!(!accel.buffer.is_stalled());
    assert_eq!(accel.buffer.dispatched(), 2);
  }
}
