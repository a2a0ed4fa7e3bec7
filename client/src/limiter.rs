//! Admission gate for trace fetches.
//!
//! Tracing is by far the most expensive thing we ask of the node, and a wide
//! block backfill would otherwise issue one `debug_traceTransaction` per
//! transaction all at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, RequestContext, Result};

pub const DEFAULT_CAPACITY: usize = 100;

/// A weighted semaphore shared by every request of a [`crate::Client`].
#[derive(Clone, Debug)]
pub struct TraceLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held for the duration of a trace fetch. Capacity is returned on drop, on
/// every exit path.
#[derive(Debug)]
pub struct LimiterGuard {
    _permit: OwnedSemaphorePermit,
    units: usize,
}

impl LimiterGuard {
    pub fn units(&self) -> usize {
        self.units
    }
}

impl Default for TraceLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TraceLimiter {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u32::MAX as usize);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units not currently held by any request.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for `units` of capacity, or for `ctx` to be cancelled.
    ///
    /// Requests for more than the total capacity are clamped to it, so they
    /// can't wait forever.
    pub async fn acquire(&self, ctx: &RequestContext, units: usize) -> Result<LimiterGuard> {
        let units = units.clamp(1, self.capacity);
        let semaphore = self.semaphore.clone();
        ctx.run(async move {
            // never closed
            let permit = semaphore
                .acquire_many_owned(units as u32)
                .await
                .map_err(|_| Error::Canceled)?;
            Ok(LimiterGuard {
                _permit: permit,
                units,
            })
        })
        .await
    }
}
