// Filesystem watcher
//
// External edits under the storage root (a certificate dropped in by hand,
// a meta.json fixed with an editor) are picked up without a restart. Event
// bursts are debounced into a single full rescan.

use crate::error::EngineError;
use crate::index::MetadataIndex;
use crate::store::CertificateStore;
use crate::Result;
use notify::{Event, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;

const QUIET_PERIOD: Duration = Duration::from_millis(1500);

pub async fn run(
    store: Arc<CertificateStore>,
    index: Arc<MetadataIndex>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                let _ = tx.send(());
            }
        }
    })
    .map_err(|e| EngineError::Internal(format!("Failed to create filesystem watcher: {}", e)))?;
    watcher
        .watch(store.root(), RecursiveMode::Recursive)
        .map_err(|e| EngineError::Internal(format!("Failed to watch storage root: {}", e)))?;
    tracing::info!(root = %store.root().display(), "Filesystem watcher started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            event = rx.recv() => {
                if event.is_none() {
                    break;
                }
                // Drain follow-up events until the burst settles
                while tokio::time::timeout(QUIET_PERIOD, rx.recv())
                    .await
                    .ok()
                    .flatten()
                    .is_some()
                {}

                match store.load_all() {
                    Ok(certs) => {
                        index.rebuild(certs).await;
                        tracing::debug!("Index rebuilt after filesystem change");
                    }
                    Err(e) => tracing::warn!(error = %e, "Storage rescan failed"),
                }
            }
        }
    }

    tracing::info!("Filesystem watcher stopped");
    Ok(())
}
