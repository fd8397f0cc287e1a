// Team lifecycle: registry, per-region context and the region driver

pub mod context;
pub mod driver;
pub(crate) mod position;
pub mod registry;

pub use context::ExecutionContext;
pub use driver::{parallel, parallel_with, Region};
pub use registry::{registry, ThreadRegistry};

use crate::core::config;

/// Whether the calling thread is a member of a team
pub fn is_inside_team() -> bool {
    registry().current().is_some()
}

/// Logical id of the calling worker, 0 outside any team
pub fn current_logical_id() -> usize {
    registry()
        .current()
        .map(|context| context::current_logical_id_in(&context))
        .unwrap_or(0)
}

/// Size of the calling worker's team, or the process-wide team size outside a region
pub fn team_size() -> usize {
    match registry().current() {
        Some(context) => context.team_size(),
        None => config::global_team_size(),
    }
}

/// Set the process-wide team size read by regions started afterwards.
/// Values below 1 restore [`default_team_size`].
pub fn set_team_size(team_size: usize) {
    config::set_global_team_size(team_size);
}

/// Hardware-detected default team size
pub fn default_team_size() -> usize {
    config::default_team_size()
}
