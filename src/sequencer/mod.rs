pub mod sequencer;

pub use sequencer::Sequencer;
