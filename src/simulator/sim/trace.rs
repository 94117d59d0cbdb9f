/// Per-cycle JSON-lines trace
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::builtin::Module;
use crate::error::{Error, Result};
use crate::top::{Accelerator, Activity};

#[derive(Serialize)]
struct ComponentRecord<'a> {
  name: &'a str,
  state: Activity,
}

#[derive(Serialize)]
struct CycleRecord<'a> {
  cycle: u64,
  idle: bool,
  components: Vec<ComponentRecord<'a>>,
}

pub struct TraceWriter<W: Write> {
  writer: W,
  records: u64,
}

impl TraceWriter<BufWriter<File>> {
  pub fn create(path: &Path) -> Result<Self> {
    Ok(Self::new(BufWriter::new(File::create(path)?)))
  }
}

impl<W: Write> TraceWriter<W> {
  pub fn new(writer: W) -> Self {
    Self { writer, records: 0 }
  }

  /// Append one line describing the cycle that just finished.
  pub fn record(&mut self, accel: &Accelerator) -> Result<()> {
    let record = CycleRecord {
      cycle: accel.cycles(),
      idle: accel.is_idle(),
      components: accel
        .activity()
        .iter()
        .map(|(name, state)| ComponentRecord { name, state: *state })
        .collect(),
    };
    serde_json::to_writer(&mut self.writer, &record).map_err(Error::Trace)?;
    writeln!(self.writer)?;
    self.records += 1;
    Ok(())
  }

  pub fn records(&self) -> u64 {
    self.records
  }

  pub fn flush(&mut self) -> Result<()> {
    self.writer.flush()?;
    Ok(())
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AcceleratorConfig;
  use crate::isa::{CompoundInstruction, LaneInstruction, MemoryInstruction, PrecisionMode, SubOp};

  #[test]
  fn test_one_line_per_cycle() {
    let mut accel = Accelerator::new("accel", &AcceleratorConfig::new(2, 8)).unwrap();
    let mut trace = TraceWriter::new(Vec::new());
    accel
      .issue(CompoundInstruction::new(
        MemoryInstruction::nop(),
        LaneInstruction::sub(SubOp::Clr, PrecisionMode::Int8),
      ))
      .unwrap();
    while !accel.is_idle() {
      accel.step();
      trace.record(&accel).unwrap();
    }
    assert_eq!(trace.records(), accel.cycles());

    let text = String::from_utf8(trace.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len() as u64, accel.cycles());
    let first = &lines[0];
    assert_eq!(first["cycle"], 1);
    assert_eq!(first["components"][0]["name"], "sequencer");
    assert_eq!(first["components"][0]["state"], "busy");
    assert_eq!(first["components"][2]["name"], "lane[0]");
    assert_eq!(lines.last().unwrap()["idle"], true);
  }
}
