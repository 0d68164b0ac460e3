use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use riffle_common::{Result, RiffleError};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Per-query session context. Cloning shares the cancellation flag, so a
/// handle kept by the caller can abort an analysis running elsewhere.
#[derive(Clone, Debug)]
pub struct Context {
    session_id: u64,
    cancel: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            session_id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Request cancellation. The analyzer checks between rule iterations;
    /// rule application itself is not interruptible.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RiffleError::Cancelled);
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
