//! Worker failure capture.
//!
//! Every worker runs its body behind a result-capture wrapper. What happens to a
//! captured failure depends on the [`ExceptionModel`] the region started with:
//! it is logged (`Default`), handed to the installed handler on the failing
//! thread (`Handle`), or recorded and raised from the region as a single
//! [`AggregatedFailure`] once the team has joined (`Propagate`).

use crate::core::config::ExceptionModel;
use crate::core::errors::{Result, TeamError};
use crate::core::latch::ReusableLatch;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{Thread, ThreadId};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Callback invoked on a failing worker under [`ExceptionModel::Handle`]
pub type ExceptionHandler = Arc<dyn Fn(&Thread, &ThreadView, &WorkerFailure) + Send + Sync>;

/// What a failing worker knew about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadView {
    pub region: Uuid,
    pub logical_id: usize,
    pub team_size: usize,
    pub thread_name: Option<String>,
}

/// Why a worker body failed
#[derive(Debug)]
pub enum FailureCause {
    /// The body returned an error
    Error(anyhow::Error),
    /// The body panicked; the payload rendered as text
    Panic(String),
}

impl FailureCause {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(payload) => match payload.downcast::<String>() {
                Ok(message) => *message,
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        Self::Panic(message)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }

    pub fn as_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Error(err) => Some(err),
            Self::Panic(_) => None,
        }
    }

    /// Downcast a returned error to a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.as_error().and_then(|err| err.downcast_ref::<E>())
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{:#}", err),
            Self::Panic(message) => write!(f, "panicked: {}", message),
        }
    }
}

/// One worker's failure
#[derive(Debug)]
pub struct WorkerFailure {
    pub logical_id: usize,
    pub thread_name: Option<String>,
    pub cause: FailureCause,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {}: {}", self.logical_id, self.cause)
    }
}

/// Every failure captured in one region, keyed by worker thread
#[derive(Debug)]
pub struct AggregatedFailure {
    region: Uuid,
    causes: HashMap<ThreadId, WorkerFailure>,
}

impl AggregatedFailure {
    pub(crate) fn new(region: Uuid, causes: HashMap<ThreadId, WorkerFailure>) -> Self {
        Self { region, causes }
    }

    pub fn region(&self) -> Uuid {
        self.region
    }

    pub fn causes(&self) -> &HashMap<ThreadId, WorkerFailure> {
        &self.causes
    }

    pub fn into_causes(self) -> HashMap<ThreadId, WorkerFailure> {
        self.causes
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn by_logical_id(&self, logical_id: usize) -> Option<&WorkerFailure> {
        self.causes.values().find(|f| f.logical_id == logical_id)
    }
}

impl fmt::Display for AggregatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut failures: Vec<&WorkerFailure> = self.causes.values().collect();
        failures.sort_by_key(|failure| failure.logical_id);

        write!(f, "{} worker(s) failed in region {}", failures.len(), self.region)?;
        for failure in failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedFailure {}

/// Per-region failure bookkeeping
pub(crate) struct ExceptionAggregator {
    model: ExceptionModel,
    handler: Option<ExceptionHandler>,
    captured: Mutex<HashMap<ThreadId, WorkerFailure>>,
    finalize: Option<ReusableLatch>,
}

impl ExceptionAggregator {
    pub(crate) fn new(
        region: Uuid,
        team_size: usize,
        model: ExceptionModel,
        handler: Option<ExceptionHandler>,
    ) -> Result<Self> {
        if model == ExceptionModel::Handle && handler.is_none() {
            return Err(TeamError::null_region("exception handler"));
        }
        let finalize = match model {
            ExceptionModel::Handle => Some(ReusableLatch::new(team_size, region)),
            _ => None,
        };
        Ok(Self {
            model,
            handler,
            captured: Mutex::new(HashMap::new()),
            finalize,
        })
    }

    pub(crate) fn model(&self) -> ExceptionModel {
        self.model
    }

    /// Dispatch a failure that escaped a worker body
    pub(crate) fn report(&self, thread: &Thread, view: ThreadView, cause: FailureCause) {
        let failure = WorkerFailure {
            logical_id: view.logical_id,
            thread_name: view.thread_name.clone(),
            cause,
        };

        match self.model {
            ExceptionModel::Default => {
                error!(region = %view.region, logical_id = view.logical_id, "Unhandled worker failure: {}", failure.cause);
            }
            ExceptionModel::Handle => {
                let Some(handler) = &self.handler else {
                    return;
                };
                debug!(logical_id = view.logical_id, "Passing worker failure to exception handler");
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(thread, &view, &failure)));
                if let Err(payload) = outcome {
                    warn!(
                        logical_id = view.logical_id,
                        "Exception handler panicked: {}",
                        FailureCause::from_panic(payload)
                    );
                }
            }
            ExceptionModel::Propagate => {
                debug!(logical_id = view.logical_id, "Captured worker failure: {}", failure.cause);
                self.captured.lock().insert(thread.id(), failure);
            }
        }
    }

    /// Signal that a worker is past every handler invocation
    pub(crate) fn worker_finished(&self) {
        if let Some(finalize) = &self.finalize {
            let _ = finalize.arrive();
        }
    }

    /// Wait until every worker signalled `worker_finished`
    pub(crate) fn await_finalized(&self) -> Result<()> {
        match &self.finalize {
            Some(finalize) => finalize.wait_released(0),
            None => Ok(()),
        }
    }

    /// Turn captured failures into the region's result
    pub(crate) fn conclude(&self, region: Uuid) -> Result<()> {
        let causes = std::mem::take(&mut *self.captured.lock());
        if causes.is_empty() {
            Ok(())
        } else {
            Err(TeamError::Aggregated(AggregatedFailure::new(region, causes)))
        }
    }
}
