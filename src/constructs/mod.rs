// Work-sharing constructs usable from inside a parallel region

pub mod critical;
pub mod loops;
pub(crate) mod queue;
pub mod sections;
pub mod single;

pub use critical::critical;
pub use loops::{loop_dynamic, loop_dynamic_range, loop_static, static_partition};
pub use sections::{section, sections};
pub use single::single;

use crate::core::errors::Result;
use crate::team::context::current_context;

/// Block until every member of the calling team has reached this barrier
pub fn barrier() -> Result<()> {
    let context = current_context("barrier")?;
    context.barrier().arrive_and_wait()?;
    Ok(())
}
