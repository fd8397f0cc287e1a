//! # parteam: structured fork-join parallelism
//!
//! Parallel regions run one closure on every member of a freshly spawned team
//! and return only after the whole team has joined. Inside a region the
//! work-sharing constructs coordinate the team:
//!
//! - [`single`]: exactly one member runs a block, everybody waits for it
//! - [`critical`]: one lock per call site
//! - [`sections`] / [`section`]: each block runs once, on whichever member claims it
//! - [`loop_static`] / [`loop_dynamic`]: contiguous or queue-fed loop partitioning
//! - [`barrier`]: explicit team rendezvous
//!
//! Unnamed constructs are matched across members by the order in which each
//! member reaches them, so all members must issue the same sequence of
//! team-scoped calls.
//!
//! ```rust,no_run
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! let total = AtomicI64::new(0);
//! parteam::Region::new().team_size(4).run(|| {
//!     parteam::loop_static(1, 100, |i| {
//!         total.fetch_add(i, Ordering::Relaxed);
//!     })?;
//!     Ok(())
//! })?;
//! assert_eq!(total.into_inner(), 5050);
//! # Ok::<(), parteam::TeamError>(())
//! ```

// Core infrastructure modules
pub mod core;

pub mod constructs;
pub mod failure;
pub mod team;

// Re-exports for convenience
pub use crate::core::config::{
    configure, exception_handler, exception_model, set_exception_handler, set_exception_model,
    settings,
};
pub use crate::core::errors::{Result, TeamError};
pub use crate::core::{ExceptionModel, ParallelMode, TeamConfig, TeamConfigBuilder};
pub use constructs::{
    barrier, critical, loop_dynamic, loop_dynamic_range, loop_static, section, sections, single,
    static_partition,
};
pub use failure::{AggregatedFailure, ExceptionHandler, FailureCause, ThreadView, WorkerFailure};
pub use team::{
    current_logical_id, default_team_size, is_inside_team, parallel, parallel_with, set_team_size,
    team_size, Region,
};
