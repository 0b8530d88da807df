//! FIFO acquisition queue.
//!
//! Waiters are completed strictly in enqueue order among those whose
//! deadlines have not elapsed. Expired waiters are dropped during pops;
//! their callers observe their own acquisition timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::engine::EngineHandle;

use super::PoolError;

/// A granted lease handed to a queue waiter.
#[derive(Clone)]
pub struct GrantedLease {
    /// Pool-assigned browser id.
    pub browser_id: String,
    /// The engine process.
    pub handle: Arc<dyn EngineHandle>,
}

/// One queued acquire.
pub struct Waiter {
    /// Queue ticket, used to cancel on timeout.
    pub ticket: u64,
    /// Session asking for a lease.
    pub session_id: String,
    /// When the acquire gives up.
    pub deadline: Instant,
    /// Completion channel.
    pub tx: oneshot::Sender<Result<GrantedLease, PoolError>>,
}

/// The FIFO queue.
#[derive(Default)]
pub struct AcquireQueue {
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

impl AcquireQueue {
    /// Enqueue a waiter; returns its cancellation ticket.
    pub fn push(
        &mut self,
        session_id: String,
        deadline: Instant,
        tx: oneshot::Sender<Result<GrantedLease, PoolError>>,
    ) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.waiters.push_back(Waiter {
            ticket,
            session_id,
            deadline,
            tx,
        });
        ticket
    }

    /// Remove a waiter by ticket (caller timed out or was cancelled).
    pub fn remove(&mut self, ticket: u64) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.ticket != ticket);
        before != self.waiters.len()
    }

    /// Pop the first waiter whose deadline has not elapsed.
    ///
    /// Expired heads are discarded; their senders drop, which the waiting
    /// side observes as its own timeout.
    pub fn pop_live(&mut self, now: Instant) -> Option<Waiter> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.deadline > now && !waiter.tx.is_closed() {
                return Some(waiter);
            }
        }
        None
    }

    /// Number of queued waiters (including not-yet-discarded expired ones).
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Fail every waiter; used during shutdown.
    pub fn drain_with(&mut self, error: impl Fn() -> PoolError) {
        while let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.tx.send(Err(error()));
        }
    }
}
