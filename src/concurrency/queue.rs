use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct QueueState<T> {
    items: VecDeque<T>,
    stopped: bool,
    closed: bool,
}

/// Capacity-bounded FIFO shared between one producer and one consumer stage.
///
/// - `push` blocks while the queue is full, `pull` blocks while it is empty.
/// - `stop` aborts: every blocked or future `push`/`pull` fails immediately until `resume`.
///   Items already queued stay put and can be reclaimed with [`BoundedQueue::drain`].
/// - `close` marks end-of-stream: pushes fail, pulls keep returning queued items and then `None`.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Append `item`, waiting for room. Hands the item back if the queue is stopped or closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut st = self.lock();
        while st.items.len() >= self.capacity && !st.stopped && !st.closed {
            st = self
                .not_full
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if st.stopped || st.closed {
            return Err(item);
        }
        st.items.push_back(item);
        drop(st);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Non-blocking push.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut st = self.lock();
        if st.stopped || st.closed || st.items.len() >= self.capacity {
            return Err(item);
        }
        st.items.push_back(item);
        drop(st);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is stopped, or closed and fully drained.
    pub fn pull(&self) -> Option<T> {
        let mut st = self.lock();
        loop {
            if st.stopped {
                return None;
            }
            if let Some(item) = st.items.pop_front() {
                drop(st);
                self.not_full.notify_one();
                return Some(item);
            }
            if st.closed {
                return None;
            }
            st = self
                .not_empty
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`BoundedQueue::pull`] but gives up after `timeout`.
    pub fn pull_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            if st.stopped {
                return None;
            }
            if let Some(item) = st.items.pop_front() {
                drop(st);
                self.not_full.notify_one();
                return Some(item);
            }
            if st.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            st = self
                .not_empty
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Abort all waiting and future operations until [`BoundedQueue::resume`].
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Re-arm a stopped queue. Does not reopen a closed one.
    pub fn resume(&self) {
        self.lock().stopped = false;
        self.not_full.notify_all();
    }

    /// Signal end-of-stream from the producer side.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Remove and return everything still queued.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.lock().items.drain(..).collect();
        self.not_full.notify_all();
        items
    }
}

#[cfg(test)]
#[path = "../../tests/unit/concurrency/queue.rs"]
mod tests;
