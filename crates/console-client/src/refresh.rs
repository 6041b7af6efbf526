//! Single-flight refresh gate.
//!
//! The first caller to [`RefreshGate::join`] while the gate is idle becomes
//! the leader and receives a [`RefreshLease`]; it alone talks to `/refresh`.
//! Every caller that joins while the lease is outstanding is parked on the
//! pending queue as a [`QueuedRequest`]. Settling the lease drains the queue
//! in enqueue order and returns the gate to idle.
//!
//! The lock is only held for queue bookkeeping, never across an `.await`.

use crate::errors::ApiError;
use common::secret::SecretString;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::trace;

/// Result handed to every waiter: the new access token or the refresh error.
pub type RefreshOutcome = Result<SecretString, ApiError>;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
enum GateState {
    #[default]
    Idle,
    InFlight {
        queue: VecDeque<Waiter>,
        next_ticket: u64,
    },
}

#[derive(Default)]
pub struct RefreshGate {
    state: Mutex<GateState>,
}

impl std::fmt::Debug for RefreshGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGate")
            .field("in_flight", &self.is_in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}

/// What a caller got from [`RefreshGate::join`].
pub enum Join<'a> {
    /// No refresh was running; the caller must perform it and settle the lease.
    Leader(RefreshLease<'a>),
    /// A refresh is running; wait for its outcome.
    Follower(QueuedRequest),
}

/// Exclusive right to perform the refresh call.
///
/// Dropping it unsettled (the leader's future was cancelled) rejects every
/// waiter so nothing hangs.
pub struct RefreshLease<'a> {
    gate: &'a RefreshGate,
    settled: bool,
}

/// A parked continuation waiting on the leader's outcome.
pub struct QueuedRequest {
    ticket: u64,
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader, or queue behind the refresh already in flight.
    pub fn join(&self) -> Join<'_> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let GateState::InFlight { queue, next_ticket } = &mut *state {
            let (tx, rx) = oneshot::channel();
            let ticket = *next_ticket;
            *next_ticket += 1;
            queue.push_back(Waiter { ticket, tx });
            trace!(target: "console.refresh", ticket, queued = queue.len(), "Request queued behind refresh");
            return Join::Follower(QueuedRequest { ticket, rx });
        }

        *state = GateState::InFlight {
            queue: VecDeque::new(),
            next_ticket: 1,
        };
        Join::Leader(RefreshLease {
            gate: self,
            settled: false,
        })
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            GateState::InFlight { .. }
        )
    }

    /// Number of requests parked on the pending queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            GateState::Idle => 0,
            GateState::InFlight { queue, .. } => queue.len(),
        }
    }

    /// Drain the queue and go idle. Returns the tickets in notification order.
    fn drain(&self, outcome: &RefreshOutcome) -> Vec<u64> {
        let queue = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::take(&mut *state) {
                GateState::Idle => VecDeque::new(),
                GateState::InFlight { queue, .. } => queue,
            }
        };

        let mut notified = Vec::with_capacity(queue.len());
        for waiter in queue {
            // A waiter whose caller gave up has dropped its receiver; skip it.
            if waiter.tx.send(outcome.clone()).is_ok() {
                notified.push(waiter.ticket);
            }
        }
        notified
    }
}

impl RefreshLease<'_> {
    /// Publish the refresh outcome to every queued request, in FIFO order.
    pub fn settle(mut self, outcome: &RefreshOutcome) -> Vec<u64> {
        self.settled = true;
        self.gate.drain(outcome)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate
                .drain(&Err(ApiError::RefreshFailed("refresh abandoned".to_string())));
        }
    }
}

impl QueuedRequest {
    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Suspend until the leader settles.
    pub async fn wait(self) -> RefreshOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| Err(ApiError::RefreshFailed("refresh abandoned".to_string())))
    }
}
