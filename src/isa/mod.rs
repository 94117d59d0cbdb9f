pub mod asm;
pub mod instruction;
pub mod mode;

pub use instruction::{CompoundInstruction, LaneInstruction, MemOp, MemoryInstruction, SubOp};
pub use mode::{AccumWord, PrecisionMode, VectorWord};
