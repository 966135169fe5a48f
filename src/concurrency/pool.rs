use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolOpts {
    /// Maximum number of idle buffers kept for reuse. Extra releases are dropped.
    pub max_retained: usize,
    /// Buffers allocated up front by [`BufferPool::new`].
    pub preallocate: usize,
}

impl Default for BufferPoolOpts {
    fn default() -> Self {
        Self {
            max_retained: 16,
            preallocate: 0,
        }
    }
}

/// Counters describing pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Buffers currently checked out.
    pub outstanding: usize,
    /// Idle buffers ready for reuse.
    pub retained: usize,
    pub allocated: u64,
    pub reused: u64,
    pub dropped_on_release: u64,
}

struct PoolState<T> {
    free: Vec<T>,
    stats: BufferPoolStats,
}

struct PoolShared<T> {
    opts: BufferPoolOpts,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    state: Mutex<PoolState<T>>,
}

impl<T> PoolShared<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, value: T) {
        let mut st = self.lock();
        st.stats.outstanding = st.stats.outstanding.saturating_sub(1);
        if st.free.len() >= self.opts.max_retained {
            st.stats.dropped_on_release = st.stats.dropped_on_release.saturating_add(1);
            return;
        }
        st.free.push(value);
        st.stats.retained = st.free.len();
    }
}

/// Shared pool of reusable buffers.
///
/// Checkout hands out a [`Pooled`] guard with single-owner semantics; the buffer goes back to the
/// pool when the guard drops, on every exit path. Cloning the pool clones the handle.
pub struct BufferPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for BufferPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> BufferPool<T> {
    pub fn new(opts: BufferPoolOpts, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let mut free = Vec::with_capacity(opts.preallocate.min(opts.max_retained));
        for _ in 0..opts.preallocate.min(opts.max_retained) {
            free.push(factory());
        }
        let stats = BufferPoolStats {
            retained: free.len(),
            allocated: free.len() as u64,
            ..BufferPoolStats::default()
        };
        Self {
            shared: Arc::new(PoolShared {
                opts,
                factory: Box::new(factory),
                state: Mutex::new(PoolState { free, stats }),
            }),
        }
    }

    /// Check out a buffer, reusing an idle one when available. Never blocks.
    pub fn acquire(&self) -> Pooled<T> {
        let reused = {
            let mut st = self.shared.lock();
            st.stats.outstanding = st.stats.outstanding.saturating_add(1);
            let v = st.free.pop();
            if v.is_some() {
                st.stats.reused = st.stats.reused.saturating_add(1);
            } else {
                st.stats.allocated = st.stats.allocated.saturating_add(1);
            }
            st.stats.retained = st.free.len();
            v
        };
        let value = match reused {
            Some(v) => v,
            None => (self.shared.factory)(),
        };
        Pooled {
            value: Some(value),
            pool: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> BufferPoolStats {
        self.shared.lock().stats.clone()
    }

    pub fn outstanding(&self) -> usize {
        self.shared.lock().stats.outstanding
    }
}

/// Checked-out pool buffer. Returned to its pool on drop.
pub struct Pooled<T> {
    value: Option<T>,
    pool: Arc<PoolShared<T>>,
}

impl<T> Pooled<T> {
    /// Take the buffer out of the pool's accounting for good.
    pub fn detach(mut self) -> T {
        let value = self.value.take();
        let mut st = self.pool.lock();
        st.stats.outstanding = st.stats.outstanding.saturating_sub(1);
        drop(st);
        match value {
            Some(v) => v,
            // `value` is only emptied here or in `drop`, both of which consume the guard.
            None => unreachable!("pooled buffer already released"),
        }
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.value.as_ref() {
            Some(v) => v,
            None => unreachable!("pooled buffer already released"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.value.as_mut() {
            Some(v) => v,
            None => unreachable!("pooled buffer already released"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(v) = self.value.take() {
            self.pool.release(v);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}
