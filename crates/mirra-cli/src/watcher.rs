//! Filesystem watcher for the opened directory.
//!
//! Uses [`notify`] with debouncing so a burst of external changes results
//! in a single refresh of the directory the user is looking at.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind, Debouncer};
use tokio::sync::mpsc::UnboundedSender;

/// Messages from the watcher to the main loop.
#[derive(Debug)]
pub enum WatchMessage {
    /// Something inside the watched directory changed.
    Changed,
    /// An error occurred while watching.
    Error(String),
}

/// Watches a single directory, non-recursively.
pub struct DirWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher>,
    current: Option<PathBuf>,
}

impl DirWatcher {
    /// Creates a watcher that reports through `tx` after `debounce` of quiet.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying notify watcher cannot be initialised.
    pub fn new(tx: UnboundedSender<WatchMessage>, debounce: Duration) -> anyhow::Result<Self> {
        let debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    if events.iter().any(|e| matches!(e.kind, DebouncedEventKind::Any)) {
                        let _ = tx.send(WatchMessage::Changed);
                    }
                }
                Err(e) => {
                    let _ = tx.send(WatchMessage::Error(e.to_string()));
                }
            },
        )?;

        Ok(Self {
            debouncer,
            current: None,
        })
    }

    /// Switches to `dir`, unwatching the previous directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched.
    pub fn watch(&mut self, dir: &Path) -> anyhow::Result<()> {
        if self.current.as_deref() == Some(dir) {
            return Ok(());
        }
        if let Some(prev) = self.current.take() {
            let _ = self.debouncer.watcher().unwatch(&prev);
        }
        self.debouncer
            .watcher()
            .watch(dir, notify::RecursiveMode::NonRecursive)?;
        self.current = Some(dir.to_path_buf());
        tracing::debug!("watching {}", dir.display());
        Ok(())
    }

    pub fn watched(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}
