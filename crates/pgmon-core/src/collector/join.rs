//! Join over a dynamically sized set of participants.
//!
//! The number of database tasks is only known while iterating configuration,
//! so a fixed-size wait group does not fit. Instead the coordinator registers
//! itself first, registers every task as it is constructed, and only then
//! arrives and waits. A task that finishes before the others are even
//! submitted cannot drain the count to zero because the coordinator's own
//! registration is still outstanding.
//!
//! Each registration is a [`Participant`] guard. Dropping it deregisters, so
//! a task deregisters exactly once whether it returns, panics, or is dropped
//! by its executor without running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct JoinState {
    parties: Mutex<usize>,
    drained: Condvar,
}

impl JoinState {
    fn arrive(&self) {
        let mut parties = self.parties.lock();
        *parties = parties.saturating_sub(1);
        if *parties == 0 {
            self.drained.notify_all();
        }
    }
}

/// Counter of outstanding participants with a blocking wait for zero.
#[derive(Debug, Clone, Default)]
pub struct DynamicJoin {
    state: Arc<JoinState>,
}

impl DynamicJoin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more participant.
    pub fn register(&self) -> Participant {
        *self.state.parties.lock() += 1;
        Participant {
            state: Arc::clone(&self.state),
        }
    }

    /// Participants that have not arrived yet.
    pub fn outstanding(&self) -> usize {
        *self.state.parties.lock()
    }
}

/// A registration with a [`DynamicJoin`]. Deregisters on drop.
#[must_use = "dropping a participant deregisters it immediately"]
#[derive(Debug)]
pub struct Participant {
    state: Arc<JoinState>,
}

impl Participant {
    /// Deregisters and blocks until every other participant has too.
    pub fn arrive_and_await(self) {
        let state = Arc::clone(&self.state);
        drop(self);
        let mut parties = state.parties.lock();
        while *parties > 0 {
            state.drained.wait(&mut parties);
        }
    }

    /// Like [`arrive_and_await`](Self::arrive_and_await) but gives up after
    /// `timeout`. Returns `false` if participants were still outstanding.
    pub fn arrive_and_await_timeout(self, timeout: Duration) -> bool {
        let state = Arc::clone(&self.state);
        drop(self);
        let deadline = Instant::now() + timeout;
        let mut parties = state.parties.lock();
        while *parties > 0 {
            if state.drained.wait_until(&mut parties, deadline).timed_out() {
                return *parties == 0;
            }
        }
        true
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.state.arrive();
    }
}
