//! Shutdown signalling shared by the proxy and the bridges.
//!
//! A `watch::channel(false)` is flipped to `true` once; every long-running
//! loop selects on [`wait_for_shutdown`].

use tokio::sync::watch;

/// Resolve once the shutdown flag is set.
///
/// If the sender is dropped without signalling, this never resolves.
pub async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
