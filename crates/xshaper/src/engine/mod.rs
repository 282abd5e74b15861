mod runner;
mod stats;

pub use runner::{RingOccupancy, Shaper, StepOutcome};
pub use stats::ShaperStats;
