use crate::core::errors::{Result, TeamError};
use crate::team::context::current_context;
use crate::team::position;
use dashmap::DashSet;
use std::panic::{self, AssertUnwindSafe};

/// Claimed section positions of the current `sections` block
pub(crate) struct SectionsContext {
    claimed: DashSet<usize>,
}

impl SectionsContext {
    pub(crate) fn new() -> Self {
        Self {
            claimed: DashSet::new(),
        }
    }

    /// First caller for a position wins
    pub(crate) fn claim(&self, position: usize) -> bool {
        self.claimed.insert(position)
    }

    #[cfg(test)]
    pub(crate) fn claimed(&self) -> usize {
        self.claimed.len()
    }

    fn reset(&self) {
        self.claimed.clear();
    }
}

/// Run a block of [`section`]s, distributing each section to exactly one member.
///
/// Ends with a team barrier: no member returns before every member has
/// finished the block. A panic inside `body` still reaches the barrier and is
/// re-raised afterwards on the member that raised it.
pub fn sections<F>(body: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let context = current_context("sections")?;
    if position::in_sections() {
        return Err(TeamError::invalid_argument(
            "sections blocks cannot be nested within one region",
        ));
    }

    let outcome = {
        let _scope = position::enter_sections();
        panic::catch_unwind(AssertUnwindSafe(body))
    };

    let rendezvous = context
        .barrier()
        .arrive_and_wait_then(|| context.sections().reset());

    match outcome {
        Err(payload) => panic::resume_unwind(payload),
        Ok(result) => {
            result?;
            rendezvous.map(|_| ())
        }
    }
}

/// One block of the enclosing [`sections`]; runs on whichever member claims it first.
///
/// Returns `true` on the member that ran it.
pub fn section<F: FnOnce()>(body: F) -> Result<bool> {
    let context = current_context("section")?;
    let position = position::next_section().ok_or_else(|| {
        TeamError::invalid_argument("section called outside of a sections block")
    })?;

    if context.sections().claim(position) {
        body();
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Build a [`sections`] call with one [`section`] per block
///
/// ```rust,no_run
/// parteam::parallel(|| {
///     parteam::sections![
///         { println!("first") },
///         { println!("second") },
///     ]?;
///     Ok(())
/// })
/// .unwrap();
/// ```
#[macro_export]
macro_rules! sections {
    ($($block:block),+ $(,)?) => {
        $crate::sections(|| {
            $( $crate::section(|| $block)?; )+
            Ok(())
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_claimer_wins() {
        let sections = Arc::new(SectionsContext::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sections = Arc::clone(&sections);
                thread::spawn(move || (0..4).filter(|p| sections.claim(*p)).count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 4);
        assert_eq!(sections.claimed(), 4);

        sections.reset();
        assert_eq!(sections.claimed(), 0);
        assert!(sections.claim(0));
    }
}
