//! Cooperative cancellation for long analysis runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared cancel flag plus an optional deadline.
///
/// Clones share the flag, so a caller can keep one clone and cancel a run
/// that owns another. The analyzer checks the token between packet pairs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that trips once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail if the token was cancelled or its deadline has passed.
    pub fn check(&self, processed: usize) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled { processed });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(Error::DeadlineExceeded { processed })
            }
            _ => Ok(()),
        }
    }
}
