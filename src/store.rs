//! Read/increment access to the counter, independent of where it lives.

use async_trait::async_trait;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("counter row has not been initialized")]
    NotInitialized,
}

impl StoreError {
    /// Stable code reported to HTTP clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::StorageUnavailable(_) => "StorageUnavailable",
            StoreError::NotInitialized => "NotInitialized",
        }
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Returns the current value without modifying it.
    async fn read(&self) -> Result<i64, StoreError>;

    /// Atomically adds one and returns the new value.
    async fn increment(&self) -> Result<i64, StoreError>;
}

/// Counter held in process memory.  Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    count: AtomicI64,
}

impl MemoryCounterStore {
    pub fn new() -> MemoryCounterStore {
        MemoryCounterStore::starting_at(0)
    }

    pub fn starting_at(count: i64) -> MemoryCounterStore {
        MemoryCounterStore { count: AtomicI64::new(count) }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn read(&self) -> Result<i64, StoreError> {
        Ok(self.count.load(Ordering::SeqCst))
    }

    async fn increment(&self) -> Result<i64, StoreError> {
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| {
                StoreError::StorageUnavailable(String::from("counter overflow"))
            })
    }
}
