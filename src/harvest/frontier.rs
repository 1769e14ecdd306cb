//! In-memory work queue shared by the harvest workers
//!
//! The run is finished when the queue is empty and no target is in flight.
//! A target handed out by `next` stays in flight until its `Lease` drops,
//! so a worker that panics mid-target cannot stall the others.

use crate::harvest::target::Target;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<Target>,
    /// URLs enqueued during this run
    seen: HashSet<String>,
    in_flight: usize,
}

#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Notify,
}

/// A target checked out of the frontier
pub struct Lease {
    target: Target,
    frontier: Arc<Frontier>,
}

impl Lease {
    pub fn target(&self) -> &Target {
        &self.target
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.frontier.complete();
    }
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a target unless its URL was already enqueued this run
    ///
    /// Returns true if the target was added.
    pub fn push(&self, target: Target) -> bool {
        {
            let mut state = self.lock();
            if !state.seen.insert(target.url.clone()) {
                return false;
            }
            state.queue.push_back(target);
        }
        self.changed.notify_waiters();
        true
    }

    /// Enqueues a retry; retries bypass the per-run duplicate check
    pub fn push_retry(&self, target: Target) {
        self.lock().queue.push_back(target);
        self.changed.notify_waiters();
    }

    /// Waits for the next target
    ///
    /// Returns `None` once the frontier has drained with nothing in flight,
    /// or as soon as `cancel` fires.
    pub async fn next(self: &Arc<Self>, cancel: &CancellationToken) -> Option<Lease> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register interest before inspecting the queue so a push in
            // between is not missed
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(target) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(Lease {
                        target,
                        frontier: Arc::clone(self),
                    });
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Targets waiting in the queue
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Targets currently checked out
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn complete(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
