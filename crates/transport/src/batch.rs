//! Reusable batch buffers.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type SlotFactory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Free-list pool of fixed-size batch buffers.
///
/// Buffers are allocated lazily and kept after use, so the pool grows to the
/// peak number of concurrently rented batches and no further. Every slot is
/// regenerated on rent; returned buffers are not cleared.
pub struct BatchBufferPool<T> {
    size: usize,
    factory: SlotFactory<T>,
    free: Mutex<Vec<Vec<T>>>,
    allocated: AtomicUsize,
}

impl<T> BatchBufferPool<T> {
    pub fn new(size: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            size: size.max(1),
            factory: Box::new(factory),
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Slots per buffer.
    pub fn batch_size(&self) -> usize {
        self.size
    }

    /// Buffers ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Buffers sitting in the free list.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Buffers currently rented out.
    pub fn outstanding(&self) -> usize {
        self.allocated().saturating_sub(self.idle())
    }

    /// Rents a buffer with every slot freshly produced by the factory.
    pub fn rent(self: &Arc<Self>) -> RentedBatch<T> {
        let pooled = self.free.lock().pop();

        let buffer = match pooled {
            Some(mut buffer) => {
                for slot in buffer.iter_mut() {
                    *slot = (self.factory)();
                }
                buffer
            }
            None => {
                self.allocated.fetch_add(1, Ordering::AcqRel);
                (0..self.size).map(|_| (self.factory)()).collect()
            }
        };

        RentedBatch {
            pool: Arc::clone(self),
            buffer: Some(buffer),
        }
    }

    fn give_back(&self, buffer: Vec<T>) {
        self.free.lock().push(buffer);
    }
}

/// A buffer rented from a [`BatchBufferPool`]; goes back to the pool on drop.
pub struct RentedBatch<T> {
    pool: Arc<BatchBufferPool<T>>,
    buffer: Option<Vec<T>>,
}

impl<T> RentedBatch<T> {
    /// Returns the buffer to the pool now rather than at end of scope.
    pub fn give_back(self) {
        drop(self);
    }
}

impl<T> Deref for RentedBatch<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl<T> DerefMut for RentedBatch<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<T> Drop for RentedBatch<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.give_back(buffer);
        }
    }
}
