// Core infrastructure shared by the driver and every work-sharing construct

pub mod config;
pub mod errors;
pub mod latch;

// Re-export commonly used types
pub use config::{ExceptionModel, ParallelMode, TeamConfig, TeamConfigBuilder};
pub use errors::{Result, TeamError};
pub use latch::{Arrival, LatchPhase, ReusableLatch};
