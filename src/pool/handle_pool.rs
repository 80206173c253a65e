//! Bounded pool of expensive-to-open file handles, shared across worker threads.
//!
//! Opening a TIFF or MRXS file handle means parsing headers and building
//! in-memory indices, so handles are pooled and reused rather than opened
//! per tile request. The free list is a simple `Mutex`-guarded `VecDeque`
//! with a `Condvar` for blocking acquires — no lock-free structure is used,
//! since nothing in this crate's dependency stack provides one and a
//! blocking pool satisfies every externally observable property (capacity
//! bound, fairness-ish FIFO reuse, clean shutdown). Each thread additionally
//! keeps a single warm handle in thread-local storage so the common case of
//! repeated reads from the same thread skips the mutex entirely.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{PoolError, Result};

struct State<H> {
    free: VecDeque<H>,
    created: usize,
    shutting_down: bool,
}

struct Inner<H> {
    max_handles: usize,
    factory: Box<dyn Fn() -> Result<H> + Send + Sync>,
    state: Mutex<State<H>>,
    available: Condvar,
}

/// A pool of handles of type `H`, bounded to `max_handles` live instances.
pub struct HandlePool<H: Send + 'static> {
    inner: Arc<Inner<H>>,
}

impl<H: Send + 'static> Clone for HandlePool<H> {
    fn clone(&self) -> Self {
        HandlePool {
            inner: Arc::clone(&self.inner),
        }
    }
}

thread_local! {
    static TLS_SLOTS: RefCell<HashMap<usize, Box<dyn std::any::Any>>> = RefCell::new(HashMap::new());
}

impl<H: Send + 'static> HandlePool<H> {
    pub fn new(
        max_handles: usize,
        factory: impl Fn() -> Result<H> + Send + Sync + 'static,
    ) -> Self {
        HandlePool {
            inner: Arc::new(Inner {
                max_handles,
                factory: Box::new(factory),
                state: Mutex::new(State {
                    free: VecDeque::new(),
                    created: 0,
                    shutting_down: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    fn pool_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Blocks until a handle is available or the pool is shut down.
    pub fn acquire(&self) -> Result<PoolGuard<H>> {
        self.acquire_impl(None)
    }

    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PoolGuard<H>> {
        self.acquire_impl(Some(timeout))
    }

    fn acquire_impl(&self, timeout: Option<Duration>) -> Result<PoolGuard<H>> {
        let id = self.pool_id();
        if let Some(handle) = TLS_SLOTS.with(|slots| {
            slots
                .borrow_mut()
                .remove(&id)
                .and_then(|boxed| boxed.downcast::<H>().ok())
                .map(|b| *b)
        }) {
            return Ok(PoolGuard {
                pool: self.clone(),
                handle: Some(handle),
            });
        }

        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.inner.state.lock();
        loop {
            if state.shutting_down {
                return Err(PoolError::ShuttingDown.into());
            }
            if let Some(handle) = state.free.pop_front() {
                return Ok(PoolGuard {
                    pool: self.clone(),
                    handle: Some(handle),
                });
            }
            if state.created < self.inner.max_handles {
                state.created += 1;
                let created = state.created;
                drop(state);
                tracing::trace!(pool = id, created, max = self.inner.max_handles, "opening new pooled handle");
                return match (self.inner.factory)() {
                    Ok(handle) => Ok(PoolGuard {
                        pool: self.clone(),
                        handle: Some(handle),
                    }),
                    Err(e) => {
                        let mut state = self.inner.state.lock();
                        state.created -= 1;
                        self.inner.available.notify_one();
                        tracing::warn!(pool = id, error = %e, "failed to open pooled handle");
                        Err(e)
                    }
                };
            }
            match deadline {
                None => self.inner.available.wait(&mut state),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoolError::TimedOut.into());
                    }
                    let timed_out = self
                        .inner
                        .available
                        .wait_for(&mut state, deadline - now)
                        .timed_out();
                    if timed_out && state.free.is_empty() && state.created >= self.inner.max_handles {
                        return Err(PoolError::TimedOut.into());
                    }
                }
            }
        }
    }

    fn release(&self, handle: H) {
        let id = self.pool_id();
        let leftover = TLS_SLOTS.with(|slots| {
            slots
                .borrow_mut()
                .insert(id, Box::new(handle))
                .and_then(|boxed| boxed.downcast::<H>().ok())
                .map(|b| *b)
        });
        if let Some(handle) = leftover {
            let mut state = self.inner.state.lock();
            state.free.push_back(handle);
            self.inner.available.notify_one();
            tracing::trace!(pool = id, free = state.free.len(), "released pooled handle");
        }
    }

    /// Wakes every blocked acquirer; subsequent and in-flight acquires fail.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutting_down = true;
        state.free.clear();
        self.inner.available.notify_all();
    }

    pub fn in_use(&self) -> usize {
        let state = self.inner.state.lock();
        state.created - state.free.len()
    }

    pub fn created(&self) -> usize {
        self.inner.state.lock().created
    }
}

/// RAII guard returning its handle to the pool (or this thread's TLS slot)
/// on drop.
pub struct PoolGuard<H: Send + 'static> {
    pool: HandlePool<H>,
    handle: Option<H>,
}

impl<H: Send + 'static> std::ops::Deref for PoolGuard<H> {
    type Target = H;
    fn deref(&self) -> &H {
        self.handle.as_ref().expect("handle taken before drop")
    }
}

impl<H: Send + 'static> std::ops::DerefMut for PoolGuard<H> {
    fn deref_mut(&mut self) -> &mut H {
        self.handle.as_mut().expect("handle taken before drop")
    }
}

impl<H: Send + 'static> Drop for PoolGuard<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}
