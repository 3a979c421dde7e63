use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use pyr_types::{Cancelled, ProgressSink};

/// Progress sink that logs every checkpoint and cancels once `cancel` is set.
pub struct LogProgress {
    cancel: Arc<AtomicBool>,
}

impl LogProgress {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }
}

impl ProgressSink for LogProgress {
    fn report(
        &mut self,
        message: &str,
        value: Option<u64>,
        end_value: Option<u64>,
    ) -> Result<(), Cancelled> {
        match (value, end_value) {
            (Some(v), Some(end)) => info!("{message} ({v}/{end})"),
            (Some(v), None) => info!("{message} ({v})"),
            _ => info!("{message}"),
        }
        if self.cancel.load(Ordering::SeqCst) {
            return Err(Cancelled);
        }
        Ok(())
    }
}

/// Flag set when Ctrl-C is received.
pub fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next checkpoint");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}
