//! Cooperative shutdown shared by the toolbox, its thread groups and queues.
//!
//! One [`CancelToken`] exists per toolbox. Processors poll it at safe points.
//! An abort cancels every queue registered with the token, waking blocked
//! consumers at once, and records the first abort reason. A normal finish
//! does not go through the token: the toolbox closes each hand-off queue once
//! every thread group feeding it has exited.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::queue::QueueControl;
use crate::types::AbortReason;

#[derive(Default)]
struct Inner {
    aborted: AtomicBool,
    reason: Mutex<Option<AbortReason>>,
    queues: Mutex<Vec<Arc<dyn QueueControl>>>,
}

/// Cloneable handle to the run's abort state.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a queue under this token's control. A queue registered after an
    /// abort is cancelled immediately.
    pub fn register_queue(&self, queue: Arc<dyn QueueControl>) {
        // Held across the check so a concurrent abort sees the queue.
        let mut queues = self.inner.queues.lock();
        if self.is_cancelled() {
            queue.cancel();
        }
        queues.push(queue);
    }

    /// Number of queues under this token.
    pub fn queue_count(&self) -> usize {
        self.inner.queues.lock().len()
    }

    /// Cancel every queue and record `reason`. Only the first abort is kept.
    pub fn abort(&self, reason: AbortReason) -> bool {
        {
            let mut slot = self.inner.reason.lock();
            if slot.is_some() {
                return false;
            }
            tracing::info!("Abort requested: {}", reason);
            *slot = Some(reason);
        }
        let queues = self.inner.queues.lock();
        self.inner.aborted.store(true, Ordering::SeqCst);
        for queue in queues.iter() {
            queue.cancel();
        }
        true
    }

    /// Shorthand for an external cancellation (e.g. Ctrl-C).
    pub fn cancel(&self) -> bool {
        self.abort(AbortReason::Cancelled)
    }

    /// True once an abort was requested. Processors poll this.
    pub fn is_cancelled(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.inner.reason.lock().clone()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.abort_reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ConcurrentQueue, PopError};

    #[test]
    fn test_first_abort_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.abort(AbortReason::GroupFailed {
            group: "g".into(),
            error: "late".into()
        }));
        assert_eq!(token.abort_reason(), Some(AbortReason::Cancelled));
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn test_abort_cancels_registered_queues() {
        let token = CancelToken::new();
        let queue: Arc<ConcurrentQueue<u32>> = Arc::new(ConcurrentQueue::unbounded());
        token.register_queue(queue.clone());
        queue.push(1).unwrap();

        assert!(token.abort(AbortReason::Cancelled));
        assert_eq!(queue.pop_blocking(), Err(PopError::Cancelled));
    }

    #[test]
    fn test_registration_races_abort() {
        // Every queue registered while another thread aborts ends up cancelled.
        for _ in 0..50 {
            let token = CancelToken::new();
            let queues: Vec<Arc<ConcurrentQueue<u32>>> =
                (0..8).map(|_| Arc::new(ConcurrentQueue::unbounded())).collect();
            let registrar = {
                let token = token.clone();
                let queues = queues.clone();
                std::thread::spawn(move || {
                    for queue in queues {
                        token.register_queue(queue);
                    }
                })
            };
            token.cancel();
            registrar.join().unwrap();
            assert_eq!(token.queue_count(), 8);
            for queue in &queues {
                assert_eq!(queue.try_pop(), Err(PopError::Cancelled));
            }
        }
    }

    #[test]
    fn test_late_registration_is_stopped() {
        let token = CancelToken::new();
        token.cancel();
        let queue: Arc<ConcurrentQueue<u32>> = Arc::new(ConcurrentQueue::unbounded());
        token.register_queue(queue.clone());
        assert_eq!(queue.try_pop(), Err(PopError::Cancelled));
    }
}
