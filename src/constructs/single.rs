use crate::core::errors::Result;
use crate::core::latch::ReusableLatch;
use crate::team::context::current_context;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct SingleGate {
    /// Rendezvous generation the `done` flag belongs to
    cycle: u64,
    done: bool,
}

/// Exactly-once execution state of one region
pub(crate) struct SingleContext {
    gate: Mutex<SingleGate>,
    rendezvous: ReusableLatch,
}

impl SingleContext {
    pub(crate) fn new(team_size: usize, region: Uuid) -> Self {
        Self {
            gate: Mutex::new(SingleGate { cycle: 0, done: false }),
            rendezvous: ReusableLatch::new(team_size, region),
        }
    }

    /// Run `body` on the first member to reach this cycle, then hold every
    /// member until all of them have seen it finish.
    pub(crate) fn run<F: FnOnce()>(&self, body: F) -> Result<bool> {
        let mut gate = self.gate.lock();

        // The rendezvous only advances once every member has passed the gate,
        // so a new generation means the previous cycle is over.
        let cycle = self.rendezvous.generation();
        if gate.cycle != cycle {
            gate.cycle = cycle;
            gate.done = false;
        }

        let mut outcome = None;
        if !gate.done {
            debug!(cycle, "Running single block");
            outcome = Some(panic::catch_unwind(AssertUnwindSafe(body)));
            gate.done = true;
        }
        drop(gate);

        let rendezvous = self.rendezvous.arrive_and_wait();

        // The block's own panic outranks a team broken by someone else.
        match outcome {
            Some(Err(payload)) => panic::resume_unwind(payload),
            Some(Ok(())) => rendezvous.map(|_| true),
            None => rendezvous.map(|_| false),
        }
    }

    pub(crate) fn abandon(&self) {
        self.rendezvous.break_latch();
    }
}

/// Run `body` on exactly one member of the calling team.
///
/// Every member blocks until the block has completed, so `single` doubles as a
/// barrier. Returns `true` on the member that executed the block. A panic in
/// the block is re-raised on the executing member after the team rendezvoused.
pub fn single<F: FnOnce()>(body: F) -> Result<bool> {
    let context = current_context("single")?;
    context.single().run(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_one_winner_per_cycle() {
        let team = 5;
        let cycles = 50;
        let single = Arc::new(SingleContext::new(team, Uuid::new_v4()));
        let executions = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..team)
            .map(|_| {
                let single = Arc::clone(&single);
                let executions = Arc::clone(&executions);
                thread::spawn(move || {
                    let mut wins = 0;
                    for cycle in 0..cycles {
                        let won = single
                            .run(|| {
                                executions.fetch_add(1, Ordering::SeqCst);
                            })
                            .unwrap();
                        if won {
                            wins += 1;
                        }
                        // Every member observes the block of this cycle as finished;
                        // a fast member may already have run the next one.
                        assert!(executions.load(Ordering::SeqCst) > cycle);
                    }
                    wins
                })
            })
            .collect();

        let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(wins, cycles);
        assert_eq!(executions.load(Ordering::SeqCst), cycles);
    }

    #[test]
    fn test_panicking_block_releases_team() {
        let team = 3;
        let single = Arc::new(SingleContext::new(team, Uuid::new_v4()));

        let handles: Vec<_> = (0..team)
            .map(|_| {
                let single = Arc::clone(&single);
                thread::spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        single.run(|| panic!("single block failed")).unwrap()
                    }));
                    // The next cycle still works for everybody.
                    let again = single.run(|| {}).unwrap();
                    (outcome.is_err(), again)
                })
            })
            .collect();

        let results: Vec<(bool, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|(panicked, _)| *panicked).count(), 1);
        assert_eq!(results.iter().filter(|(_, again)| *again).count(), 1);
    }
}
