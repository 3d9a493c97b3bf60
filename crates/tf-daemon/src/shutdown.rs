use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

/// Stops the automation loops and the HTTP server together.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    notify: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            notify: broadcast::channel(1).0,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Only the first call has an effect.
    pub fn trigger(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            let _ = self.notify.send(());
        }
    }

    /// Resolves once [`trigger`](Self::trigger) has run, even if it ran
    /// before this call.
    pub async fn wait(&self) {
        let mut rx = self.notify.subscribe();
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        let _ = rx.recv().await;
    }
}
