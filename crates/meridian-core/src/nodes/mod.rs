//! Concrete graph nodes.

pub mod latency;
pub mod level_measurer;
pub mod signal;
pub mod summing;

pub use latency::LatencyNode;
pub use level_measurer::{LEVEL_MEASURER_TYPE_ID, LevelMeasurerNode};
pub use signal::{SignalNode, Waveform};
pub use summing::SummingNode;
