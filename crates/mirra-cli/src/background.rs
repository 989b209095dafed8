//! Background population of the tree.
//!
//! [`spawn_background_scan`] runs the engine's resumable walk on a tokio
//! task, one directory per lock acquisition, so user commands interleave
//! with it. When the walk runs dry the task parks until woken; operations
//! and recoveries can queue new directories at any time.

use std::sync::Arc;

use mirra_core::{Engine, Step};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Progress reports from the background task to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMessage {
    /// The walk ran dry after scanning `scanned` directories.
    Idle { scanned: usize, skipped: usize },
    /// The walk stopped on an error it cannot continue past.
    Failed(String),
}

/// Current status of the background walk, as last seen by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
}

impl ScanStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
        }
    }
}

/// Spawns the background walk. Call `wake.notify_one()` after anything
/// that may have queued more directories.
pub fn spawn_background_scan(
    engine: Arc<Mutex<Engine>>,
    wake: Arc<Notify>,
    tx: UnboundedSender<ScanMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scanned = 0;
        let mut skipped = 0;
        loop {
            let step = engine.lock().await.background_step();
            match step {
                Ok(Step::Scanned(_)) => scanned += 1,
                Ok(Step::Skipped(path)) => {
                    tracing::debug!("background skipped {}", path.display());
                    skipped += 1;
                }
                Ok(Step::Idle) => {
                    if scanned + skipped > 0 {
                        tracing::info!("background walk idle ({scanned} scanned, {skipped} skipped)");
                        let _ = tx.send(ScanMessage::Idle { scanned, skipped });
                        scanned = 0;
                        skipped = 0;
                    }
                    wake.notified().await;
                    continue;
                }
                Err(e) => {
                    tracing::error!("background walk stopped: {e}");
                    let _ = tx.send(ScanMessage::Failed(e.to_string()));
                    return;
                }
            }
            tokio::task::yield_now().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_core::{Config, Event, MemoryStorage};
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine(storage: &Arc<MemoryStorage>) -> Arc<Mutex<Engine>> {
        let engine =
            Engine::open("/lib", storage.clone(), Config::default(), Vec::<Event>::new()).unwrap();
        Arc::new(Mutex::new(engine))
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ScanMessage>) -> ScanMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("background task timed out")
            .expect("background task hung up")
    }

    #[tokio::test]
    async fn walk_scans_every_directory_then_parks() {
        let storage = Arc::new(MemoryStorage::new("/lib"));
        storage.write("/lib/2024/jan/a.jpg", "a");
        storage.write("/lib/2024/feb/b.jpg", "b");
        storage.add_dir("/lib/music");
        let engine = engine(&storage);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = spawn_background_scan(engine.clone(), Arc::new(Notify::new()), tx);

        assert_eq!(next(&mut rx).await, ScanMessage::Idle { scanned: 4, skipped: 0 });
        let engine = engine.lock().await;
        assert!(engine.store().dir(Path::new("lib/2024/feb")).unwrap().scanned());
        assert_eq!(engine.store().file_count(), 2);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn wake_resumes_after_new_work() {
        let storage = Arc::new(MemoryStorage::new("/lib"));
        storage.add_dir("/lib/a");
        let engine = engine(&storage);
        let wake = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_background_scan(engine.clone(), wake.clone(), tx);
        assert_eq!(next(&mut rx).await, ScanMessage::Idle { scanned: 1, skipped: 0 });

        storage.add_dir("/lib/a/b");
        storage.add_dir("/lib/a/b/c");
        engine.lock().await.recover(Path::new("lib/a")).unwrap();
        wake.notify_one();

        assert_eq!(next(&mut rx).await, ScanMessage::Idle { scanned: 2, skipped: 0 });
        handle.abort();
    }

    #[tokio::test]
    async fn vanished_root_stops_the_walk() {
        let storage = Arc::new(MemoryStorage::new("/lib"));
        storage.add_dir("/lib/a");
        let engine = engine(&storage);
        storage.delete("/lib");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = spawn_background_scan(engine, Arc::new(Notify::new()), tx);

        assert!(matches!(next(&mut rx).await, ScanMessage::Failed(_)));
        handle.await.unwrap();
    }
}
