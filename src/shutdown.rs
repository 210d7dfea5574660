//! Operator interrupts.
//!
//! The first interrupt stops the sweep and lets container cleanup run. Every
//! interrupt is logged, including ones that arrive while cleanup or output is
//! in progress, and a second one lets the caller abandon cleanup.

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::warn;

/// Counts interrupts delivered by a background listener.
#[derive(Debug, Clone)]
pub struct Interrupts {
    count: watch::Receiver<u32>,
}

impl Interrupts {
    /// Listen on an arbitrary signal source. Each item is one interrupt.
    pub fn listen<S>(signals: S) -> Self
    where
        S: Stream<Item = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(0u32);
        tokio::spawn(async move {
            let mut signals = std::pin::pin!(signals);
            let mut count = 0u32;
            while signals.next().await.is_some() {
                count += 1;
                if count == 1 {
                    warn!("Interrupt received, stopping sweep (interrupt again to skip cleanup)");
                } else {
                    warn!(count, "Interrupt received again, abandoning cleanup");
                }
                if tx.send(count).is_err() {
                    break;
                }
            }
        });
        Self { count: rx }
    }

    /// Listen for Ctrl-C for the rest of the process.
    pub fn ctrl_c() -> Self {
        Self::listen(futures::stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        }))
    }

    /// Resolves once at least `n` interrupts have arrived. Never resolves if
    /// the signal source ends first.
    pub async fn wait_for(mut self, n: u32) {
        if self.count.wait_for(|&count| count >= n).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
