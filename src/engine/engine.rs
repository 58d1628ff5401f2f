use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::Reconciler;
use crate::Result;
use crate::Settings;
use crate::SubscriptionRouter;

/// The wired sync core: one subscription router and one billing
/// reconciler sharing a shutdown signal.
///
/// Servers and feed listeners run as spawned tasks; `run` only parks the
/// caller until shutdown so `main` has something to await.
pub struct Engine {
    pub router: SubscriptionRouter,
    pub reconciler: Arc<Reconciler>,
    pub ready: AtomicBool,
    pub settings: Arc<Settings>,
    pub(super) shutdown_signal: watch::Receiver<()>,
}

impl Engine {
    pub async fn run(&self) -> Result<()> {
        self.set_ready(true);

        let mut shutdown_signal = self.shutdown_signal.clone();
        // A closed sender counts as shutdown too
        let _ = shutdown_signal.changed().await;

        info!("shutdown signal received, engine stopping");
        self.set_ready(false);
        Ok(())
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
