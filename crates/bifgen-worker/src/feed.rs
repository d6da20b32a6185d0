//! JSON-lines event feed for a remote consumer.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use bifgen_pool::PoolEvent;

/// Drain pool events into an append-only JSON-lines file.
///
/// The writer runs until the sending side is dropped; a feed write
/// failure is logged and stops the feed without touching the job.
pub fn spawn_feed_writer(
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<PoolEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                warn!("Cannot open event feed {}: {e}", path.display());
                return;
            }
        };

        while let Some(event) = rx.recv().await {
            let mut line = match serde_json::to_vec(&event) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Cannot serialize feed event: {e}");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = file.write_all(&line).await {
                warn!("Event feed write failed, stopping feed: {e}");
                return;
            }
        }
    })
}
