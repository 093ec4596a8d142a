//! Thread-safe FIFO used to hand records across thread-group boundaries.
//!
//! [`ConcurrentQueue`] is a mutex plus two condition variables. It can be
//! bounded (producers block while full) or unbounded (push never blocks).
//!
//! Two ways to stop a queue:
//! - [`ConcurrentQueue::cancel`] is immediate. Every blocked waiter wakes and
//!   every pop from then on returns [`PopError::Cancelled`], even if items remain.
//! - [`ConcurrentQueue::close`] is graceful. Pushes are refused, pops keep
//!   returning the remaining items and then [`PopError::Closed`].
//!
//! The toolbox holds queues through the object-safe [`QueueControl`] trait so it
//! can stop them without knowing the item type.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a pop produced no item.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    #[error("Timed out waiting for an item")]
    TimedOut,

    #[error("Queue was cancelled")]
    Cancelled,

    #[error("Queue is closed and drained")]
    Closed,
}

/// Why a push was refused. The rejected item is dropped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("Queue was cancelled")]
    Cancelled,

    #[error("Queue is closed")]
    Closed,
}

/// Type-independent control surface over a queue.
pub trait QueueControl: Send + Sync {
    /// Stop immediately, waking every waiter.
    fn cancel(&self);

    /// Refuse further pushes; consumers drain what is left.
    fn close(&self);

    fn is_cancelled(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct State<T> {
    items: VecDeque<T>,
    cancelled: bool,
    closed: bool,
    pushed: u64,
    popped: u64,
}

impl<T> State<T> {
    /// Resolve a pop attempt without waiting. `None` means the caller should wait.
    fn take(&mut self) -> Option<Result<T, PopError>> {
        if self.cancelled {
            return Some(Err(PopError::Cancelled));
        }
        if let Some(item) = self.items.pop_front() {
            self.popped += 1;
            return Some(Ok(item));
        }
        if self.closed {
            return Some(Err(PopError::Closed));
        }
        None
    }
}

/// Bounded or unbounded multi-producer multi-consumer FIFO.
pub struct ConcurrentQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    /// `None` means unbounded.
    capacity: Option<usize>,
}

impl<T> ConcurrentQueue<T> {
    /// Create an unbounded queue.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Create a queue holding at most `capacity` items. A capacity of zero is
    /// treated as one.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                cancelled: false,
                closed: false,
                pushed: 0,
                popped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an item and wake one consumer.
    ///
    /// On a bounded queue this blocks while the queue is full. Fails only if the
    /// queue is cancelled or closed (including while blocked).
    pub fn push(&self, item: T) -> Result<(), PushError> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(PushError::Cancelled);
            }
            if state.closed {
                return Err(PushError::Closed);
            }
            match self.capacity {
                Some(cap) if state.items.len() >= cap => self.not_full.wait(&mut state),
                _ => break,
            }
        }
        state.items.push_back(item);
        state.pushed += 1;
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until an item is available.
    pub fn pop_blocking(&self) -> Result<T, PopError> {
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.take() {
                drop(state);
                self.after_pop(&result);
                return result;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Block for at most `timeout` waiting for an item.
    pub fn pop_timed(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.take() {
                drop(state);
                self.after_pop(&result);
                return result;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                // One last look: a push may have raced the timeout.
                let result = state.take().unwrap_or(Err(PopError::TimedOut));
                drop(state);
                self.after_pop(&result);
                return result;
            }
        }
    }

    /// Pop without waiting. `Ok(None)` means the queue is currently empty.
    pub fn try_pop(&self) -> Result<Option<T>, PopError> {
        let mut state = self.state.lock();
        match state.take() {
            Some(result) => {
                drop(state);
                self.after_pop(&result);
                result.map(Some)
            }
            None => Ok(None),
        }
    }

    fn after_pop(&self, result: &Result<T, PopError>) {
        if result.is_ok() {
            self.not_full.notify_one();
        }
    }

    /// Total items pushed and popped since creation.
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.pushed, state.popped)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn wake_all(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl<T: Send> QueueControl for ConcurrentQueue<T> {
    fn cancel(&self) {
        let mut state = self.state.lock();
        if !state.cancelled {
            tracing::trace!("Queue cancelled with {} items pending", state.items.len());
        }
        state.cancelled = true;
        drop(state);
        self.wake_all();
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.wake_all();
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> std::fmt::Debug for ConcurrentQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConcurrentQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("cancelled", &state.cancelled)
            .field("closed", &state.closed)
            .finish()
    }
}
