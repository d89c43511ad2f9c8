//! Reusable byte-buffer pool for archive bodies and file contents.
//!
//! Archive downloads and entry extraction churn through large buffers
//! under high concurrency. The pool hands out owned buffers behind an
//! RAII guard; a buffer is cleared before it goes back on the free list,
//! so no content ever leaks from one use into the next.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// A shared pool of byte buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
    initial_capacity: usize,
}

impl BufferPool {
    /// Creates an empty pool; fresh buffers start at `initial_capacity`.
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::new())),
            initial_capacity,
        }
    }

    /// Acquires a cleared buffer, reusing a pooled one when available.
    ///
    /// The buffer returns to the pool when the guard drops.
    #[must_use]
    pub fn acquire(&self) -> PooledBuf {
        let buf = self
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.initial_capacity));
        PooledBuf {
            buf,
            pool: self.clone(),
        }
    }

    /// Number of buffers currently sitting in the free list.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        // A poisoned lock only means another thread panicked mid-push;
        // the free list is still a valid list of buffers.
        self.free.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// RAII guard over a pooled buffer.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        self.pool.lock().push(buf);
    }
}
