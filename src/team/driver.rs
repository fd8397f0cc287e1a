//! Region driver: spawns a team, runs the startup protocol, joins the team and
//! reports captured failures to the caller.

use super::context::{ExecutionContext, RegionSettings};
use super::position;
use crate::core::config::{ExceptionModel, ParallelMode};
use crate::core::errors::{Result, TeamError};
use crate::failure::{ExceptionHandler, FailureCause};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, debug_span, info_span, warn, Span};

/// Builder for one parallel region
///
/// Anything not set here is read from the process-wide settings at the moment
/// [`run`](Region::run) is called.
#[derive(Default, Clone)]
pub struct Region {
    mode: ParallelMode,
    team_size: Option<usize>,
    exception_model: Option<ExceptionModel>,
    handler: Option<ExceptionHandler>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: ParallelMode) -> Self {
        self.mode = mode;
        self
    }

    /// Team size for this region only; must be at least 1
    pub fn team_size(mut self, team_size: usize) -> Self {
        self.team_size = Some(team_size);
        self
    }

    pub fn exception_model(mut self, model: ExceptionModel) -> Self {
        self.exception_model = Some(model);
        self
    }

    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Run `body` once on every member of a fresh team and wait for all of them
    pub fn run<F>(self, body: F) -> Result<()>
    where
        F: Fn() -> anyhow::Result<()> + Sync,
    {
        if self.team_size == Some(0) {
            return Err(TeamError::invalid_argument_field(
                "team size override must be at least 1",
                "team_size",
            ));
        }

        let mut settings = RegionSettings::resolve();
        settings.mode = self.mode;
        if let Some(team_size) = self.team_size {
            settings.team_size = team_size;
        }
        if let Some(model) = self.exception_model {
            settings.exception_model = model;
        }
        if let Some(handler) = self.handler {
            settings.handler = Some(handler);
        }

        run_region(settings, &body)
    }
}

/// Run `body` on a team sized by the current process-wide team size
pub fn parallel<F>(body: F) -> Result<()>
where
    F: Fn() -> anyhow::Result<()> + Sync,
{
    Region::new().run(body)
}

/// Run `body` concurrently, or on a single worker in `Serial` mode
pub fn parallel_with<F>(mode: ParallelMode, body: F) -> Result<()>
where
    F: Fn() -> anyhow::Result<()> + Sync,
{
    Region::new().mode(mode).run(body)
}

fn run_region<F>(settings: RegionSettings, body: &F) -> Result<()>
where
    F: Fn() -> anyhow::Result<()> + Sync,
{
    let context = Arc::new(ExecutionContext::new(&settings)?);
    let team_size = context.team_size();

    let region_span = info_span!(
        "parallel_region",
        region = %context.id(),
        team_size,
        mode = ?settings.mode
    );
    let _entered = region_span.enter();
    debug!(model = %settings.exception_model, "Starting team");

    let spawned = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(team_size);

        for logical_id in 0..team_size {
            let mut builder = thread::Builder::new()
                .name(format!("{}-{}", settings.thread_name_prefix, logical_id));
            if let Some(stack_size) = settings.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let worker_context = Arc::clone(&context);
            let worker_span = region_span.clone();
            match builder.spawn_scoped(scope, move || {
                run_worker(worker_context, logical_id, body, worker_span)
            }) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    warn!(logical_id, "Worker spawn failed, releasing started workers: {}", source);
                    context.startup().break_latch();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(TeamError::spawn(logical_id, source));
                }
            }
        }

        for (logical_id, handle) in handles.into_iter().enumerate() {
            if let Err(payload) = handle.join() {
                warn!(
                    logical_id,
                    "Worker terminated by unhandled fault: {}",
                    FailureCause::from_panic(payload)
                );
            }
        }
        Ok(())
    });

    context.cleanup();
    spawned?;
    context.exceptions().await_finalized()?;

    debug!("Team joined");
    context.exceptions().conclude(context.id())
}

fn run_worker<F>(context: Arc<ExecutionContext>, logical_id: usize, body: &F, region_span: Span)
where
    F: Fn() -> anyhow::Result<()> + Sync,
{
    let span = debug_span!(parent: &region_span, "team_worker", logical_id);
    let _entered = span.enter();

    context.admit(logical_id);
    position::reset();
    let mut finished = FinishGuard {
        context: &context,
        completed: false,
    };

    if context.startup().arrive_and_wait().is_err() {
        debug!("Team abandoned before startup completed");
        return;
    }

    match context.exception_model() {
        ExceptionModel::Default => {
            // Panics are left to unwind and end the thread.
            match body() {
                Ok(()) => finished.completed = true,
                Err(err) => {
                    let current = thread::current();
                    context
                        .exceptions()
                        .report(&current, context.view_of(logical_id), FailureCause::Error(err));
                }
            }
        }
        ExceptionModel::Handle | ExceptionModel::Propagate => {
            let cause = match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(FailureCause::Error(err)),
                Err(payload) => Some(FailureCause::from_panic(payload)),
            };
            match cause {
                None => finished.completed = true,
                Some(cause) => {
                    let current = thread::current();
                    context
                        .exceptions()
                        .report(&current, context.view_of(logical_id), cause);
                }
            }
        }
    }
}

/// Runs when the worker leaves, however the body ended. A worker that did not
/// complete its body will never reach the team's remaining rendezvous points.
struct FinishGuard<'a> {
    context: &'a ExecutionContext,
    completed: bool,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.context.abandon();
        }
        self.context.exceptions().worker_finished();
    }
}
