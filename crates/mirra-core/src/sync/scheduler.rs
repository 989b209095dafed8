//! Resumable depth-first walk over the tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::tree::store::NodeStore;

/// Outcome of one background step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The directory was reconciled.
    Scanned(PathBuf),
    /// The directory was dropped from the tree or could not be read.
    Skipped(PathBuf),
    /// Nothing left to do.
    Idle,
}

/// Cursor over the directories still waiting for a background scan.
///
/// The cursor is an explicit stack rather than recursion so it can be
/// paused between any two directories and restarted from an arbitrary
/// ancestor after recovery.
#[derive(Debug, Default)]
pub struct BackgroundScanScheduler {
    stack: Vec<PathBuf>,
}

impl BackgroundScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets any pending work and queues the children of `root`.
    pub fn start(&mut self, store: &NodeStore, root: &Path) {
        self.stack.clear();
        self.descend(store, root);
    }

    /// Re-queues the subtree below `path`, ahead of anything else pending.
    ///
    /// Pending entries inside that subtree are dropped first so nothing is
    /// visited twice.
    pub fn resume_from(&mut self, store: &NodeStore, path: &Path) {
        self.stack.retain(|p| !p.starts_with(path));
        self.descend(store, path);
    }

    /// Queues the children of a freshly scanned directory so they are
    /// visited next, in natural order.
    pub fn descend(&mut self, store: &NodeStore, path: &Path) {
        if let Some(node) = store.dir(path) {
            self.stack
                .extend(node.children().iter().rev().map(|c| path.join(c)));
        }
    }

    /// Queues every unscanned directory reachable from `path` through
    /// scanned ones and not already pending, ahead of everything else.
    ///
    /// Called after the tree changed outside a background step, so that
    /// re-keyed or newly attached directories are still visited.
    pub fn adopt(&mut self, store: &NodeStore, path: &Path) {
        let pending: HashSet<&PathBuf> = self.stack.iter().collect();
        let mut found = Vec::new();
        let mut walk = vec![path.to_path_buf()];
        while let Some(current) = walk.pop() {
            let Some(node) = store.dir(&current) else {
                continue;
            };
            if !node.scanned() {
                if !pending.contains(&current) {
                    found.push(current);
                }
                continue;
            }
            walk.extend(node.children().iter().rev().map(|c| current.join(c)));
        }
        if !found.is_empty() {
            tracing::debug!("queued {} directories below {}", found.len(), path.display());
        }
        self.stack.extend(found.into_iter().rev());
    }

    /// Pops the next directory to visit.
    pub fn next_pending(&mut self) -> Option<PathBuf> {
        self.stack.pop()
    }

    pub fn cancel(&mut self) {
        self.stack.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    /// Number of directories still queued.
    pub fn pending(&self) -> usize {
        self.stack.len()
    }
}
