pub mod port;

pub use port::{channel, InPort, OutPort, Probe};

/// A clocked hardware block.
///
/// `run` models one rising clock edge. A module that cannot finish a
/// blocking handshake keeps its in-flight state and retries on the next
/// call, so its progress is paused rather than skipped.
pub trait Module {
  fn run(&mut self);

  fn reset(&mut self);

  fn name(&self) -> &str;

  /// True when the module holds no in-flight work.
  fn is_idle(&self) -> bool {
    true
  }
}
