pub mod datapath;
pub mod lane;

pub use lane::ComputeLane;
