use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag shared between a running scan and whoever may abort it.
///
/// Clones observe the same flag, so a token handed to another thread can
/// stop a scan running on the owning thread.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
