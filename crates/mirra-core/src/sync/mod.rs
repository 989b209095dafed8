//! Keeping the tree in line with storage.
//!
//! [`Scanner`] reconciles one directory at a time and
//! [`TreeSynchronizer`] applies the structural part of the result.
//! [`recovery`] handles stale handles and [`scheduler`] walks the rest of
//! the tree in the background.

pub mod recovery;
pub mod scanner;
pub mod scheduler;
pub mod synchronizer;

use std::path::Path;

use crate::error::CoreResult;
use crate::event::EventSink;
use crate::fs::storage::Storage;
use crate::tree::store::NodeStore;

pub use recovery::{Recovery, RecoveryProtocol};
pub use scanner::{DiffEntry, ScanDiff, Scanner};
pub use scheduler::{BackgroundScanScheduler, Step};
pub use synchronizer::TreeSynchronizer;

/// Borrowed view of everything a reconciliation touches.
pub(crate) struct SyncContext<'a> {
    pub store: &'a mut NodeStore,
    pub storage: &'a dyn Storage,
    pub scanner: &'a Scanner,
    pub sink: &'a mut dyn EventSink,
}

impl SyncContext<'_> {
    /// Reconciles `path` and applies the result.
    pub fn resync(&mut self, path: &Path) -> CoreResult<ScanDiff> {
        let diff = self.scanner.reconcile(self.store, self.storage, path)?;
        TreeSynchronizer::apply(self.store, &diff, self.sink)?;
        Ok(diff)
    }
}
