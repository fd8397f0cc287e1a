//! Per-thread program-order counters.
//!
//! Unnamed constructs are matched across a team purely by the order in which
//! each worker reaches them: the n-th `critical` call of every worker guards the
//! same lock, the n-th `section` of a `sections` block is the same block on
//! every worker. This only holds when all members issue the same sequence of
//! team-scoped calls.

use std::cell::Cell;

thread_local! {
    static CRITICAL_POSITION: Cell<usize> = const { Cell::new(0) };
    static SECTION_POSITION: Cell<usize> = const { Cell::new(0) };
    static SECTIONS_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Start a fresh region on the calling thread
pub(crate) fn reset() {
    CRITICAL_POSITION.with(|p| p.set(0));
    SECTION_POSITION.with(|p| p.set(0));
    SECTIONS_DEPTH.with(|d| d.set(0));
}

/// Position of this `critical` call, post-incremented
pub(crate) fn next_critical() -> usize {
    CRITICAL_POSITION.with(|p| {
        let position = p.get();
        p.set(position + 1);
        position
    })
}

/// Position of this `section` call within the innermost `sections` block,
/// or `None` outside any block
pub(crate) fn next_section() -> Option<usize> {
    if !in_sections() {
        return None;
    }
    Some(SECTION_POSITION.with(|p| {
        let position = p.get();
        p.set(position + 1);
        position
    }))
}

/// Whether the calling thread is inside a `sections` block
pub(crate) fn in_sections() -> bool {
    SECTIONS_DEPTH.with(Cell::get) > 0
}

/// Open a `sections` block; positions restart at 0 until the guard drops
pub(crate) fn enter_sections() -> SectionsScope {
    let saved = SECTION_POSITION.with(|p| p.replace(0));
    SECTIONS_DEPTH.with(|d| d.set(d.get() + 1));
    SectionsScope { saved }
}

pub(crate) struct SectionsScope {
    saved: usize,
}

impl Drop for SectionsScope {
    fn drop(&mut self) {
        SECTION_POSITION.with(|p| p.set(self.saved));
        SECTIONS_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
