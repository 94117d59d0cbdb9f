/// Mnemonic form of lane and memory instructions
///
/// ```text
/// MAC INT16        PASS INT8        OUT INT32       CLR INT8     NOP INT16
/// RND INT16 8
/// READ INT8 <row> <elem>      WRITE INT32 <row> [elem]     NOP [mode [row [elem]]]
/// RAW 0x1f3                   (any encoding, including reserved ones)
/// ```
use std::fmt;
use std::str::FromStr;

use super::instruction::{LaneInstruction, MemOp, MemoryInstruction, SubOp, MAX_OFFSET};
use super::mode::PrecisionMode;
use crate::error::{Error, Result};

fn bad(text: &str, reason: impl Into<String>) -> Error {
  Error::Mnemonic {
    text: text.to_string(),
    reason: reason.into(),
  }
}

fn parse_number(text: &str, token: &str) -> Result<u64> {
  let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
    Some(hex) => u64::from_str_radix(hex, 16),
    None => token.parse::<u64>(),
  };
  parsed.map_err(|e| bad(text, format!("invalid number '{}': {}", token, e)))
}

fn parse_mode(text: &str, token: Option<&str>) -> Result<PrecisionMode> {
  let token = token.ok_or_else(|| bad(text, "missing precision mode"))?;
  PrecisionMode::from_mnemonic(token).ok_or_else(|| bad(text, format!("unknown mode '{}'", token)))
}

fn parse_offset(text: &str, token: Option<&str>) -> Result<u16> {
  match token {
    None => Ok(0),
    Some(t) => {
      let value = parse_number(text, t)?;
      if value > MAX_OFFSET as u64 {
        return Err(bad(text, format!("offset {} exceeds {}", value, MAX_OFFSET)));
      }
      Ok(value as u16)
    },
  }
}

fn parse_raw(text: &str, token: Option<&str>, width_mask: u64) -> Result<u64> {
  let token = token.ok_or_else(|| bad(text, "RAW requires a value"))?;
  let value = parse_number(text, token)?;
  if value & !width_mask != 0 {
    return Err(bad(text, "RAW value wider than the instruction"));
  }
  Ok(value)
}

impl FromStr for LaneInstruction {
  type Err = Error;

  fn from_str(text: &str) -> Result<Self> {
    let mut tokens = text.split_whitespace();
    let op = tokens.next().ok_or_else(|| bad(text, "empty instruction"))?.to_ascii_uppercase();

    let inst = match op.as_str() {
      "RAW" => LaneInstruction::unpack(parse_raw(text, tokens.next(), 0x1FF)? as u16),
      "RND" => {
        let mode = parse_mode(text, tokens.next())?;
        let shift = tokens.next().ok_or_else(|| bad(text, "RND requires a shift amount"))?;
        let shift = parse_number(text, shift)?;
        if shift > 31 {
          return Err(bad(text, "shift amount must be 0..=31"));
        }
        LaneInstruction::rnd(mode, shift as u8)
      },
      _ => {
        let sub = match op.as_str() {
          "NOP" => SubOp::Nop,
          "MAC" => SubOp::Mac,
          "PASS" => SubOp::Pass,
          "OUT" => SubOp::Out,
          "CLR" => SubOp::Clr,
          _ => return Err(bad(text, format!("unknown lane opcode '{}'", op))),
        };
        LaneInstruction::sub(sub, parse_mode(text, tokens.next())?)
      },
    };

    if let Some(extra) = tokens.next() {
      return Err(bad(text, format!("unexpected token '{}'", extra)));
    }
    Ok(inst)
  }
}

impl fmt::Display for LaneInstruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mode = match self.precision() {
      Some(mode) => mode,
      None => return write!(f, "RAW {:#x}", self.pack()),
    };
    if self.is_rnd() {
      return write!(f, "RND {} {}", mode, self.value());
    }
    let name = match self.sub_op() {
      Some(SubOp::Nop) => "NOP",
      Some(SubOp::Mac) => "MAC",
      Some(SubOp::Pass) => "PASS",
      Some(SubOp::Out) => "OUT",
      Some(SubOp::Clr) => "CLR",
      None => return write!(f, "RAW {:#x}", self.pack()),
    };
    // opcodes 2 and 3 decode like 0 but would not survive a text round trip
    if self.opcode() != 0 {
      return write!(f, "RAW {:#x}", self.pack());
    }
    write!(f, "{} {}", name, mode)
  }
}

impl TryFrom<String> for LaneInstruction {
  type Error = Error;

  fn try_from(text: String) -> Result<Self> {
    text.parse()
  }
}

impl From<LaneInstruction> for String {
  fn from(inst: LaneInstruction) -> Self {
    inst.to_string()
  }
}

impl FromStr for MemoryInstruction {
  type Err = Error;

  fn from_str(text: &str) -> Result<Self> {
    let mut tokens = text.split_whitespace();
    let op = tokens.next().ok_or_else(|| bad(text, "empty instruction"))?.to_ascii_uppercase();

    let inst = match op.as_str() {
      "RAW" => MemoryInstruction::unpack(parse_raw(text, tokens.next(), 0xFF_FFFF)? as u32),
      "NOP" => match tokens.next() {
        None => MemoryInstruction::nop(),
        Some(mode) => {
          let mode = parse_mode(text, Some(mode))?;
          let row = parse_offset(text, tokens.next())?;
          let elem = parse_offset(text, tokens.next())?;
          MemoryInstruction::new(MemOp::Nop, mode, row, elem)
        },
      },
      "READ" | "WRITE" => {
        let op = if op == "READ" { MemOp::Read } else { MemOp::Write };
        let mode = parse_mode(text, tokens.next())?;
        let row = tokens.next().ok_or_else(|| bad(text, "missing matrix row offset"))?;
        let row = parse_offset(text, Some(row))?;
        let elem = parse_offset(text, tokens.next())?;
        MemoryInstruction::new(op, mode, row, elem)
      },
      _ => return Err(bad(text, format!("unknown memory opcode '{}'", op))),
    };

    if let Some(extra) = tokens.next() {
      return Err(bad(text, format!("unexpected token '{}'", extra)));
    }
    Ok(inst)
  }
}

impl fmt::Display for MemoryInstruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (op, mode) = match (self.op(), self.precision()) {
      (Some(op), Some(mode)) => (op, mode),
      _ => return write!(f, "RAW {:#x}", self.pack()),
    };
    let name = match op {
      MemOp::Nop if *self == MemoryInstruction::nop() => return f.write_str("NOP"),
      MemOp::Nop => "NOP",
      MemOp::Read => "READ",
      MemOp::Write => "WRITE",
    };
    write!(f, "{} {} {} {}", name, mode, self.matrix_offset(), self.vector_offset())
  }
}

impl TryFrom<String> for MemoryInstruction {
  type Error = Error;

  fn try_from(text: String) -> Result<Self> {
    text.parse()
  }
}

impl From<MemoryInstruction> for String {
  fn from(inst: MemoryInstruction) -> Self {
    inst.to_string()
  }
}
