//! Connection lifecycle handling and broadcast fan-out.

mod engine;
mod lifecycle;
mod payload;
mod report;

pub use engine::{FanoutEngine, FanoutError, FanoutOptions};
pub use lifecycle::{LifecycleOutcome, LifecycleWrite};
pub use payload::{Payload, PayloadError};
pub use report::{DeliveryReport, FanoutStats, FanoutStatsSnapshot};
