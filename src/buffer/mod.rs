pub mod buffer;
pub mod scratchpad;

pub use buffer::{vector_operand, BufferPorts, SharedBuffer};
pub use scratchpad::Scratchpad;
