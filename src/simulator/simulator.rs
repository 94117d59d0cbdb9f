use log::{info, warn};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::config::AppConfig;
use super::sim::mode::StepMode;
use super::sim::shell::{Command, Shell};
use super::sim::trace::TraceWriter;
use super::utils::log::set_quiet;
use super::workload::{full_image, Workload};
use crate::builtin::Module;
use crate::error::{Error, Result};
use crate::isa::mode::VectorWord;
use crate::isa::CompoundInstruction;
use crate::top::Accelerator;

/// Outcome of one workload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
  /// Cycles from the first program instruction to drain.
  pub cycles: u64,
  /// Cycles spent on external writes before the program.
  pub preload_cycles: u64,
  pub completed: bool,
  pub read_back: Vec<(u32, VectorWord)>,
}

pub struct Simulator {
  config: AppConfig,
  accel: Accelerator,
  workload: Workload,
  pending: VecDeque<CompoundInstruction>,
  trace: Option<TraceWriter<BufWriter<File>>>,
}

impl Simulator {
  pub fn new(config: AppConfig, workload: Workload) -> Result<Self> {
    config.validate()?;
    set_quiet(config.simulation.quiet);

    let accel = Accelerator::new("vmacc", &config.accelerator)?.with_cycle_limit(config.simulation.max_cycles);
    let trace = if config.simulation.trace_file.is_empty() {
      None
    } else {
      Some(TraceWriter::create(Path::new(&config.simulation.trace_file))?)
    };

    Ok(Self {
      pending: workload.program.iter().copied().collect(),
      config,
      accel,
      workload,
      trace,
    })
  }

  pub fn accelerator(&self) -> &Accelerator {
    &self.accel
  }

  pub fn run(&mut self) -> Result<Report> {
    let preload_cycles = self.preload()?;
    let start = self.accel.cycles();

    let completed = match StepMode::from_flag(self.config.simulation.step_mode) {
      StepMode::Continuous => {
        self.run_continuous()?;
        true
      },
      StepMode::Step => self.run_step_mode()?,
    };

    let mut report = Report {
      cycles: self.accel.cycles() - start,
      preload_cycles,
      completed,
      read_back: Vec::new(),
    };
    if completed {
      for &addr in &self.workload.read_back {
        report.read_back.push((addr, self.accel.read_output(addr)?));
      }
    } else if !self.workload.read_back.is_empty() {
      warn!("stopped before the program drained, skipping read-back");
    }

    if let Some(trace) = self.trace.as_mut() {
      trace.flush()?;
    }
    info!(
      "program finished in {} cycles ({} preload), {} instructions",
      report.cycles,
      report.preload_cycles,
      self.workload.program.len()
    );
    Ok(report)
  }

  /// Back-door images, then external writes. Returns the cycles spent.
  fn preload(&mut self) -> Result<u64> {
    let depth = self.config.accelerator.memory_depth;
    if !self.workload.matrix.is_empty() {
      self.accel.load_matrix(&full_image(&self.workload.matrix, depth)?)?;
    }
    if !self.workload.vector.is_empty() {
      self.accel.load_vector(&full_image(&self.workload.vector, depth)?)?;
    }

    let start = self.accel.cycles();
    for &(addr, word) in &self.workload.matrix_writes {
      self.accel.write_matrix(addr, word)?;
    }
    for &(addr, word) in &self.workload.vector_writes {
      self.accel.write_vector(addr, word)?;
    }
    self.accel.run_until_idle(self.config.simulation.max_cycles)?;
    Ok(self.accel.cycles() - start)
  }

  /// Program fully handed over and the accelerator drained.
  pub fn is_done(&self) -> bool {
    self.pending.is_empty() && self.accel.is_idle()
  }

  /// One clock: offer the next program instruction, step, trace.
  pub fn tick(&mut self) -> Result<()> {
    if let Some(&inst) = self.pending.front() {
      if self.accel.host().inst.push_nb(inst).is_ok() {
        self.pending.pop_front();
      }
    }
    self.accel.step();
    if let Some(trace) = self.trace.as_mut() {
      trace.record(&self.accel)?;
    }
    Ok(())
  }

  fn run_continuous(&mut self) -> Result<()> {
    let limit = self.config.simulation.max_cycles;
    let start = self.accel.cycles();
    while !self.is_done() {
      if self.accel.cycles() - start >= limit {
        return Err(Error::CycleLimit(limit));
      }
      self.tick()?;
    }
    Ok(())
  }

  /// Interactive stepping. Returns whether the program drained.
  fn run_step_mode(&mut self) -> Result<bool> {
    let mut shell = Shell::new()?;
    println!("Step mode - Enter steps one cycle, 'si N' steps N, 'c' continues, 'q' quits");
    while !self.is_done() {
      match shell.read_command()? {
        Command::Step(n) => {
          for _ in 0..n {
            if self.is_done() {
              break;
            }
            self.tick()?;
          }
          self.print_status();
        },
        Command::Continue => {
          self.run_continuous()?;
          self.print_status();
        },
        Command::Quit => return Ok(false),
      }
    }
    Ok(true)
  }

  fn print_status(&self) {
    let states: Vec<String> = self
      .accel
      .activity()
      .iter()
      .map(|(name, state)| format!("{}={:?}", name, state))
      .collect();
    println!(
      "cycle {} | pending {} | {}",
      self.accel.cycles(),
      self.pending.len(),
      states.join(" ")
    );
  }
}
