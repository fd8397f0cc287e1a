//! Work-sharing loops.
//!
//! Static loops split an inclusive range into one contiguous slice per member
//! and need no coordination at all. Dynamic loops enumerate every iteration
//! value into a shared queue once per cycle and let members pull values until
//! the queue is empty; nobody leaves the loop before every member has.

use super::queue::IterationQueue;
use crate::core::errors::{Result, TeamError};
use crate::core::latch::ReusableLatch;
use crate::failure::FailureCause;
use crate::team::context::{current_context, current_logical_id_in};
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;
use uuid::Uuid;

/// Slice of `[from, to]` owned by `logical_id` in a team of `team_size`.
///
/// Every slice holds `size / team_size` values and the first
/// `size % team_size` members get one more. `None` means the member has no
/// iterations (empty range, or more members than values).
pub fn static_partition(
    from: i64,
    to: i64,
    team_size: usize,
    logical_id: usize,
) -> Option<RangeInclusive<i64>> {
    if from > to || team_size == 0 || logical_id >= team_size {
        return None;
    }

    let size = to as i128 - from as i128 + 1;
    let team = team_size as i128;
    let id = logical_id as i128;
    let base = size / team;
    let extra = size % team;

    let len = base + i128::from(id < extra);
    if len == 0 {
        return None;
    }
    let begin = from as i128 + id * base + id.min(extra);
    let end = begin + len - 1;
    Some(begin as i64..=end as i64)
}

/// Run `body` over this member's static slice of `[from, to]`.
///
/// No synchronization happens and there is no barrier at the end.
pub fn loop_static<F: FnMut(i64)>(from: i64, to: i64, mut body: F) -> Result<()> {
    let context = current_context("loop_static")?;
    if from > to {
        return Err(TeamError::invalid_argument_field(
            format!("loop bounds are reversed: from {} > to {}", from, to),
            "from",
        ));
    }

    let logical_id = current_logical_id_in(&context);
    if let Some(slice) = static_partition(from, to, context.team_size(), logical_id) {
        for value in slice {
            body(value);
        }
    }
    Ok(())
}

/// Run `body` for every value produced from `start` by `step` while `condition`
/// holds, sharing the values among the team on a first-come basis.
///
/// `condition` and `step` run only on the member that enumerates the cycle. A
/// step that does not advance, or a panic in either closure, fails the loop on
/// every member with `InvalidArgument`.
pub fn loop_dynamic<C, S, B>(start: i64, condition: C, step: S, body: B) -> Result<()>
where
    C: Fn(i64) -> bool,
    S: Fn(i64) -> i64,
    B: Fn(i64),
{
    let context = current_context("loop_dynamic")?;
    context.loops().run(start, &condition, &step, &body)
}

/// Dynamic loop over `start..stop` (exclusive), counting down when `stop < start`
pub fn loop_dynamic_range<B: Fn(i64)>(start: i64, stop: i64, body: B) -> Result<()> {
    if stop >= start {
        loop_dynamic(start, |v| v < stop, |v| v + 1, body)
    } else {
        loop_dynamic(start, |v| v > stop, |v| v - 1, body)
    }
}

#[derive(Debug, Clone)]
struct EnumerationFailure {
    message: String,
    field: &'static str,
}

impl EnumerationFailure {
    fn new(message: String, field: &'static str) -> Self {
        Self { message, field }
    }
}

#[derive(Debug, Default)]
struct LoopCycle {
    /// Completion generation the queue was filled for
    initialized_for: Option<u64>,
    /// Why enumeration of that cycle failed
    failure: Option<EnumerationFailure>,
}

/// Dynamic loop state of one region
pub(crate) struct LoopContext {
    queue: IterationQueue<i64>,
    cycle: Mutex<LoopCycle>,
    completion: ReusableLatch,
}

impl LoopContext {
    pub(crate) fn new(team_size: usize, region: Uuid, max_iterations: usize) -> Self {
        Self {
            queue: IterationQueue::new(max_iterations),
            cycle: Mutex::new(LoopCycle::default()),
            completion: ReusableLatch::new(team_size, region),
        }
    }

    pub(crate) fn run(
        &self,
        start: i64,
        condition: &dyn Fn(i64) -> bool,
        step: &dyn Fn(i64) -> i64,
        body: &dyn Fn(i64),
    ) -> Result<()> {
        let failure = {
            let mut cycle = self.cycle.lock();
            // Completion only advances after every member arrived, so this
            // member still sees the generation of the cycle it is entering.
            let generation = self.completion.generation();
            if cycle.initialized_for != Some(generation) {
                cycle.failure = self.enumerate(start, condition, step).err();
                cycle.initialized_for = Some(generation);
            }
            cycle.failure.clone()
        };

        let outcome = match failure {
            None => panic::catch_unwind(AssertUnwindSafe(|| self.drain(body))),
            Some(_) => Ok(0),
        };

        // Values left behind by panicking members must not leak into the next cycle.
        let rendezvous = self.completion.arrive_and_wait_then(|| self.queue.clear());

        // A panicking body outranks a team broken by someone else.
        let executed = match outcome {
            Ok(executed) => executed,
            Err(payload) => panic::resume_unwind(payload),
        };
        rendezvous?;

        if let Some(failure) = failure {
            return Err(TeamError::invalid_argument_field(failure.message, failure.field));
        }
        debug!(executed, "Dynamic loop share finished");
        Ok(())
    }

    pub(crate) fn abandon(&self) {
        self.completion.break_latch();
        self.queue.clear();
    }

    fn enumerate(
        &self,
        start: i64,
        condition: &dyn Fn(i64) -> bool,
        step: &dyn Fn(i64) -> i64,
    ) -> std::result::Result<usize, EnumerationFailure> {
        let filled = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut count = 0usize;
            let mut value = start;
            while condition(value) {
                if !self.queue.push(value) {
                    return Err(EnumerationFailure::new(
                        format!(
                            "dynamic loop produced more than {} iterations",
                            self.queue.capacity()
                        ),
                        "condition",
                    ));
                }
                count += 1;
                let next = step(value);
                if next == value {
                    return Err(EnumerationFailure::new(
                        format!("loop step does not advance from {}", value),
                        "step",
                    ));
                }
                value = next;
            }
            Ok(count)
        }));

        let filled = match filled {
            Ok(filled) => filled,
            Err(payload) => Err(EnumerationFailure::new(
                format!(
                    "dynamic loop condition or step failed: {}",
                    FailureCause::from_panic(payload)
                ),
                "condition",
            )),
        };
        match &filled {
            Ok(count) => debug!(start, iterations = count, "Dynamic loop enumerated"),
            Err(_) => self.queue.clear(),
        }
        filled
    }

    fn drain(&self, body: &dyn Fn(i64)) -> usize {
        let mut executed = 0;
        while let Some(value) = self.queue.pop() {
            body(value);
            executed += 1;
        }
        executed
    }
}
