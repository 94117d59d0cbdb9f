use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::Result;

const PROMPT: &str = "(vmacc) ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Step(u32), // Step N cycles
  Quit,
  Continue,
}

/// Parse one line of shell input.
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
  let trimmed = line.trim();

  // Empty input: step once
  if trimmed.is_empty() {
    return Ok(Command::Step(1));
  }

  // si command: step N times
  if let Some(rest) = trimmed.strip_prefix("si") {
    let num_str = rest.trim();
    if num_str.is_empty() {
      return Err("'si' requires a number, e.g., 'si 100'".to_string());
    }
    return match num_str.parse::<u32>() {
      Ok(n) if n > 0 => Ok(Command::Step(n)),
      Ok(_) => Err("step count must be greater than 0".to_string()),
      Err(e) => Err(format!("invalid number '{}': {}", num_str, e)),
    };
  }

  match trimmed {
    "q" => Ok(Command::Quit),
    "c" => Ok(Command::Continue),
    _ => Err(format!(
      "Unknown command: '{}'. Use Enter to step, 'q' to quit, 'c' to continue, or 'si 100' to step N times",
      trimmed
    )),
  }
}

pub struct Shell {
  editor: DefaultEditor,
}

impl Shell {
  pub fn new() -> Result<Self> {
    Ok(Self {
      editor: DefaultEditor::new()?,
    })
  }

  /// Prompt until a valid command is entered. Ctrl-C and Ctrl-D quit.
  pub fn read_command(&mut self) -> Result<Command> {
    loop {
      match self.editor.readline(PROMPT) {
        Ok(line) => {
          let trimmed = line.trim();
          if !trimmed.is_empty() {
            let _ = self.editor.add_history_entry(trimmed);
          }
          match parse_command(trimmed) {
            Ok(cmd) => return Ok(cmd),
            Err(msg) => eprintln!("Error: {}", msg),
          }
        },
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(Command::Quit),
        Err(err) => return Err(err.into()),
      }
    }
  }
}
