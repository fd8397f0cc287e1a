use super::registry::registry;
use crate::constructs::critical::CriticalContext;
use crate::constructs::loops::LoopContext;
use crate::constructs::sections::SectionsContext;
use crate::constructs::single::SingleContext;
use crate::core::config::{self, ExceptionModel, ParallelMode};
use crate::core::errors::{Result, TeamError};
use crate::core::latch::ReusableLatch;
use crate::failure::{ExceptionAggregator, ExceptionHandler, ThreadView};
use dashmap::DashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;
use uuid::Uuid;

/// Everything a region needs to know before its team is spawned
#[derive(Clone)]
pub(crate) struct RegionSettings {
    pub team_size: usize,
    pub mode: ParallelMode,
    pub exception_model: ExceptionModel,
    pub handler: Option<ExceptionHandler>,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub max_loop_iterations: usize,
}

impl RegionSettings {
    /// Resolve the process-wide settings as they are right now
    pub fn resolve() -> Self {
        let settings = config::settings();
        Self {
            team_size: settings.team_size,
            mode: ParallelMode::Concurrent,
            exception_model: settings.exception_model,
            handler: config::exception_handler(),
            thread_name_prefix: settings.thread_name_prefix,
            stack_size: settings.stack_size,
            max_loop_iterations: settings.max_loop_iterations,
        }
    }

    /// Team size after applying the parallel mode
    pub fn effective_team_size(&self) -> usize {
        match self.mode {
            ParallelMode::Concurrent => self.team_size,
            ParallelMode::Serial => 1,
        }
    }

    #[cfg(test)]
    pub fn for_team(team_size: usize) -> Self {
        Self {
            team_size,
            mode: ParallelMode::Concurrent,
            exception_model: ExceptionModel::Default,
            handler: None,
            thread_name_prefix: "test".to_string(),
            stack_size: None,
            max_loop_iterations: 1 << 16,
        }
    }
}

/// Per-region state shared by every member of one team
pub struct ExecutionContext {
    id: Uuid,
    team_size: usize,
    members: DashMap<ThreadId, usize>,
    startup: ReusableLatch,
    barrier: ReusableLatch,
    single: SingleContext,
    critical: CriticalContext,
    sections: SectionsContext,
    loops: LoopContext,
    exceptions: ExceptionAggregator,
}

impl ExecutionContext {
    pub(crate) fn new(settings: &RegionSettings) -> Result<Self> {
        let team_size = settings.effective_team_size();
        if team_size == 0 {
            return Err(TeamError::invalid_argument_field(
                "team size must be at least 1",
                "team_size",
            ));
        }

        let id = Uuid::new_v4();
        let exceptions = ExceptionAggregator::new(
            id,
            team_size,
            settings.exception_model,
            settings.handler.clone(),
        )?;

        Ok(Self {
            id,
            team_size,
            members: DashMap::with_capacity(team_size),
            startup: ReusableLatch::new(team_size, id),
            barrier: ReusableLatch::new(team_size, id),
            single: SingleContext::new(team_size, id),
            critical: CriticalContext::new(),
            sections: SectionsContext::new(),
            loops: LoopContext::new(team_size, id, settings.max_loop_iterations),
            exceptions,
        })
    }

    /// Identity of the region
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn team_size(&self) -> usize {
        self.team_size
    }

    /// Logical id assigned to `thread` when it was spawned
    pub fn logical_id_of(&self, thread: ThreadId) -> Option<usize> {
        self.members.get(&thread).map(|entry| *entry.value())
    }

    /// Threads currently admitted to the team
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn exception_model(&self) -> ExceptionModel {
        self.exceptions.model()
    }

    /// Register the calling worker under `logical_id` and bind it in the registry
    pub(crate) fn admit(self: &Arc<Self>, logical_id: usize) {
        let thread = thread::current().id();
        self.members.insert(thread, logical_id);
        registry().bind(thread, Arc::clone(self));
    }

    /// Unbind every member from the registry
    pub(crate) fn cleanup(&self) {
        for entry in self.members.iter() {
            registry().unbind(*entry.key());
        }
        debug!(region = %self.id, members = self.members.len(), "Region members released");
        self.members.clear();
    }

    /// Break every team rendezvous after a member left without finishing its body
    pub(crate) fn abandon(&self) {
        debug!(region = %self.id, "Team rendezvous abandoned");
        self.barrier.break_latch();
        self.single.abandon();
        self.loops.abandon();
    }

    pub(crate) fn view_of(&self, logical_id: usize) -> ThreadView {
        ThreadView {
            region: self.id,
            logical_id,
            team_size: self.team_size,
            thread_name: thread::current().name().map(str::to_string),
        }
    }

    pub(crate) fn startup(&self) -> &ReusableLatch {
        &self.startup
    }

    pub(crate) fn barrier(&self) -> &ReusableLatch {
        &self.barrier
    }

    pub(crate) fn single(&self) -> &SingleContext {
        &self.single
    }

    pub(crate) fn critical(&self) -> &CriticalContext {
        &self.critical
    }

    pub(crate) fn sections(&self) -> &SectionsContext {
        &self.sections
    }

    pub(crate) fn loops(&self) -> &LoopContext {
        &self.loops
    }

    pub(crate) fn exceptions(&self) -> &ExceptionAggregator {
        &self.exceptions
    }
}

/// Context of the calling thread, or `OutsideTeam` naming the construct
pub(crate) fn current_context(construct: &'static str) -> Result<Arc<ExecutionContext>> {
    registry()
        .current()
        .ok_or_else(|| TeamError::outside_team(construct))
}

/// Logical id of the calling thread within `context`
pub(crate) fn current_logical_id_in(context: &ExecutionContext) -> usize {
    context
        .logical_id_of(thread::current().id())
        .unwrap_or_default()
}
