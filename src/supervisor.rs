//! Restart-on-panic supervision for periodic jobs and actors

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Receiving end of an actor's channel, shared across restarts so a
/// respawned actor keeps draining the same queue its handles send to
pub struct Mailbox<R>(Arc<Mutex<R>>);

impl<R> Mailbox<R> {
    pub fn new(receiver: R) -> Self {
        Self(Arc::new(Mutex::new(receiver)))
    }

    /// Exclusive use of the receiver for one actor run. The guard is
    /// released when the run ends, panics included.
    pub async fn open(&self) -> OwnedMutexGuard<R> {
        self.0.clone().lock_owned().await
    }
}

impl<R> Clone for Mailbox<R> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<R> From<R> for Mailbox<R> {
    fn from(receiver: R) -> Self {
        Self::new(receiver)
    }
}

/// Run the job built by `factory` in its own task. A panic is logged and a
/// fresh job is started after `restart_delay`. A clean return or an
/// external abort ends supervision.
pub fn supervise<F, Fut>(name: &'static str, restart_delay: Duration, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts = 0u32;
        loop {
            match tokio::spawn(factory()).await {
                Ok(()) => {
                    debug!("{name} finished");
                    break;
                }
                Err(e) if e.is_panic() => {
                    restarts += 1;
                    error!("{name} panicked, restart #{restarts} in {restart_delay:?}");
                    tokio::time::sleep(restart_delay).await;
                }
                Err(e) => {
                    warn!("{name} was cancelled: {e}");
                    break;
                }
            }
        }
    })
}
