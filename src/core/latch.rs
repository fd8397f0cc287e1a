//! Reusable countdown latch.
//!
//! A latch is sized to a fixed number of parties. Each party arrives once per
//! cycle; the last arrival releases every waiter of that cycle and rearms the
//! latch for the next one. Cycles are told apart by a generation counter, so a
//! fast party that races into the next cycle can never be confused with a slow
//! party still leaving the previous one.

use crate::core::errors::{Result, TeamError};
use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

/// Observable phase of the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchPhase {
    /// No party has arrived in the current cycle
    Armed,
    /// Some, but not all, parties have arrived
    Counting,
    /// The latch was broken and will never release again
    Broken,
}

/// Outcome of one arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    /// Generation of the cycle this arrival belonged to
    pub generation: u64,
    /// True for the arrival that released the cycle
    pub is_leader: bool,
}

#[derive(Debug)]
struct LatchState {
    remaining: usize,
    generation: u64,
    broken: bool,
}

#[derive(Debug)]
pub struct ReusableLatch {
    parties: usize,
    owner: Uuid,
    state: Mutex<LatchState>,
    released: Condvar,
}

impl ReusableLatch {
    /// Create a latch for `parties` arrivals per cycle, reporting breakage against `owner`
    pub fn new(parties: usize, owner: Uuid) -> Self {
        debug_assert!(parties > 0, "a latch needs at least one party");
        let parties = parties.max(1);
        Self {
            parties,
            owner,
            state: Mutex::new(LatchState {
                remaining: parties,
                generation: 0,
                broken: false,
            }),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of completed cycles
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn phase(&self) -> LatchPhase {
        let state = self.state.lock();
        if state.broken {
            LatchPhase::Broken
        } else if state.remaining == self.parties {
            LatchPhase::Armed
        } else {
            LatchPhase::Counting
        }
    }

    /// Count down without waiting for the rest of the cycle
    pub fn arrive(&self) -> Result<Arrival> {
        let mut state = self.state.lock();
        self.count_down(&mut state, || {})
    }

    /// Count down and block until every party of this cycle has arrived
    pub fn arrive_and_wait(&self) -> Result<Arrival> {
        self.arrive_and_wait_then(|| {})
    }

    /// Like [`arrive_and_wait`](Self::arrive_and_wait), but the releasing party
    /// runs `on_release` before anyone is let go and before the latch rearms.
    /// `on_release` runs under the latch lock and must not touch this latch.
    pub fn arrive_and_wait_then<F: FnOnce()>(&self, on_release: F) -> Result<Arrival> {
        let mut state = self.state.lock();
        let arrival = self.count_down(&mut state, on_release)?;
        if !arrival.is_leader {
            while state.generation == arrival.generation && !state.broken {
                self.released.wait(&mut state);
            }
            if state.generation == arrival.generation {
                return Err(TeamError::team_broken(self.owner));
            }
        }
        Ok(arrival)
    }

    /// Block until the cycle numbered `generation` has been released
    pub fn wait_released(&self, generation: u64) -> Result<()> {
        let mut state = self.state.lock();
        while state.generation <= generation && !state.broken {
            self.released.wait(&mut state);
        }
        if state.generation <= generation {
            return Err(TeamError::team_broken(self.owner));
        }
        Ok(())
    }

    /// Abandon the latch; current and future waiters fail with `TeamBroken`
    pub fn break_latch(&self) {
        let mut state = self.state.lock();
        state.broken = true;
        self.released.notify_all();
    }

    fn count_down<F: FnOnce()>(&self, state: &mut LatchState, on_release: F) -> Result<Arrival> {
        if state.broken {
            return Err(TeamError::team_broken(self.owner));
        }

        let generation = state.generation;
        state.remaining -= 1;
        if state.remaining > 0 {
            return Ok(Arrival {
                generation,
                is_leader: false,
            });
        }

        on_release();
        state.remaining = self.parties;
        state.generation += 1;
        self.released.notify_all();
        Ok(Arrival {
            generation,
            is_leader: true,
        })
    }
}
