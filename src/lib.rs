pub mod buffer;
pub mod builtin;
pub mod config;
pub mod error;
pub mod isa;
pub mod lane;
pub mod sequencer;
pub mod simulator;
pub mod top;

pub use config::AcceleratorConfig;
pub use error::{Error, Result};
pub use simulator::Simulator;
pub use top::Accelerator;
