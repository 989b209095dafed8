//! Recovery from stale handles.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::sync::scanner::ScanDiff;
use crate::sync::scheduler::BackgroundScanScheduler;
use crate::sync::SyncContext;

/// Report of a completed recovery.
///
/// `requested` may no longer exist afterwards; callers re-resolve it by
/// path before using it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub requested: PathBuf,
    pub ancestor: PathBuf,
    pub diff: ScanDiff,
}

/// Walks up from a stale node to the nearest valid ancestor and
/// reconciles only that ancestor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryProtocol;

impl RecoveryProtocol {
    pub(crate) fn recover(
        ctx: &mut SyncContext<'_>,
        scheduler: &mut BackgroundScanScheduler,
        requested: &Path,
    ) -> CoreResult<Recovery> {
        let ancestor = Self::valid_ancestor(ctx, requested)?;
        let diff = ctx.resync(&ancestor)?;
        scheduler.resume_from(&*ctx.store, &ancestor);

        tracing::info!(
            "recovered {} at {} (+{} -{})",
            requested.display(),
            ancestor.display(),
            diff.added.len(),
            diff.removed.len()
        );
        ctx.sink.emit(Event::Recovered {
            requested: requested.to_path_buf(),
            ancestor: ancestor.clone(),
        });
        Ok(Recovery {
            requested: requested.to_path_buf(),
            ancestor,
            diff,
        })
    }

    /// First directory, walking up from `requested`, whose handle still
    /// validates.
    fn valid_ancestor(ctx: &SyncContext<'_>, requested: &Path) -> CoreResult<PathBuf> {
        let root = ctx
            .store
            .root()
            .map(Path::to_path_buf)
            .ok_or_else(|| CoreError::Unrecoverable(requested.to_path_buf()))?;
        if !requested.starts_with(&root) {
            return Err(CoreError::NotFound(requested.to_path_buf()));
        }

        let mut current = requested
            .ancestors()
            .find(|p| ctx.store.contains_dir(p))
            .map(Path::to_path_buf);
        while let Some(path) = current {
            let Some(node) = ctx.store.dir(&path) else {
                break;
            };
            if ctx.storage.validate(node.handle().location()) {
                return Ok(path);
            }
            tracing::debug!("{} no longer valid, walking up", path.display());
            current = node.parent().map(Path::to_path_buf);
        }
        tracing::warn!("root {} is no longer valid", root.display());
        Err(CoreError::Unrecoverable(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::storage::EntryKind;
    use crate::fs::MemoryStorage;
    use crate::sync::scanner::Scanner;
    use crate::tree::node::Handle;
    use crate::tree::store::NodeStore;

    /// root/{a/{b/{c}}, z/} fully scanned.
    fn setup(storage: &MemoryStorage) -> (NodeStore, Scanner) {
        storage.add_dir("/m/a/b/c");
        storage.add_dir("/m/z");
        storage.write("/m/a/b/c/x.jpg", "x");
        let scanner = Scanner::default();
        let mut store = NodeStore::new();
        store.set_root("root", Handle::new("/m"));
        let mut sink: Vec<Event> = Vec::new();
        let mut ctx = SyncContext {
            store: &mut store,
            storage,
            scanner: &scanner,
            sink: &mut sink,
        };
        for dir in ["root", "root/a", "root/a/b", "root/a/b/c", "root/z"] {
            ctx.resync(Path::new(dir)).unwrap();
        }
        (store, scanner)
    }

    #[test]
    fn walks_up_to_nearest_valid_ancestor_and_reconciles_only_it() {
        let storage = MemoryStorage::new("/m");
        let (mut store, scanner) = setup(&storage);
        let mut scheduler = BackgroundScanScheduler::new();
        let mut events: Vec<Event> = Vec::new();
        storage.delete("/m/a/b");
        let before = storage.total_list_calls();

        let mut ctx = SyncContext {
            store: &mut store,
            storage: &storage,
            scanner: &scanner,
            sink: &mut events,
        };
        let recovery =
            RecoveryProtocol::recover(&mut ctx, &mut scheduler, Path::new("root/a/b/c/x.jpg"))
                .unwrap();

        assert_eq!(recovery.ancestor, PathBuf::from("root/a"));
        assert_eq!(recovery.diff.removed_names(EntryKind::Directory), vec!["b"]);
        assert_eq!(storage.total_list_calls(), before + 1);
        assert_eq!(storage.list_calls("/m/a"), 2);
        assert!(!store.contains_dir(Path::new("root/a/b")));
        assert!(store.contains_dir(Path::new("root/z")));
        assert_eq!(
            events,
            vec![
                Event::Detached {
                    path: PathBuf::from("root/a/b")
                },
                Event::Recovered {
                    requested: PathBuf::from("root/a/b/c/x.jpg"),
                    ancestor: PathBuf::from("root/a"),
                },
            ]
        );
    }

    #[test]
    fn path_already_dropped_from_tree_starts_at_deepest_known_ancestor() {
        let storage = MemoryStorage::new("/m");
        let (mut store, scanner) = setup(&storage);
        let mut scheduler = BackgroundScanScheduler::new();
        let mut sink: Vec<Event> = Vec::new();

        let mut ctx = SyncContext {
            store: &mut store,
            storage: &storage,
            scanner: &scanner,
            sink: &mut sink,
        };
        let recovery =
            RecoveryProtocol::recover(&mut ctx, &mut scheduler, Path::new("root/z/gone/deeper"))
                .unwrap();

        assert_eq!(recovery.ancestor, PathBuf::from("root/z"));
        assert!(recovery.diff.is_empty());
    }

    #[test]
    fn scheduler_resumes_below_the_ancestor() {
        let storage = MemoryStorage::new("/m");
        let (mut store, scanner) = setup(&storage);
        let mut scheduler = BackgroundScanScheduler::new();
        storage.delete("/m/a/b/c");

        let mut sink: Vec<Event> = Vec::new();
        let mut ctx = SyncContext {
            store: &mut store,
            storage: &storage,
            scanner: &scanner,
            sink: &mut sink,
        };
        RecoveryProtocol::recover(&mut ctx, &mut scheduler, Path::new("root/a/b/c")).unwrap();

        assert_eq!(scheduler.pending(), 0);
        assert!(store.dir(Path::new("root/a/b")).unwrap().children().is_empty());
    }

    #[test]
    fn missing_root_is_unrecoverable() {
        let storage = MemoryStorage::new("/m");
        let (mut store, scanner) = setup(&storage);
        let mut scheduler = BackgroundScanScheduler::new();
        storage.delete("/m");

        let mut sink: Vec<Event> = Vec::new();
        let mut ctx = SyncContext {
            store: &mut store,
            storage: &storage,
            scanner: &scanner,
            sink: &mut sink,
        };
        let result = RecoveryProtocol::recover(&mut ctx, &mut scheduler, Path::new("root/a/b"));

        assert!(matches!(result, Err(CoreError::Unrecoverable(p)) if p == Path::new("root")));
    }

    #[test]
    fn path_outside_the_tree_is_not_found() {
        let storage = MemoryStorage::new("/m");
        let (mut store, scanner) = setup(&storage);
        let mut scheduler = BackgroundScanScheduler::new();
        let mut sink: Vec<Event> = Vec::new();
        let mut ctx = SyncContext {
            store: &mut store,
            storage: &storage,
            scanner: &scanner,
            sink: &mut sink,
        };
        let result = RecoveryProtocol::recover(&mut ctx, &mut scheduler, Path::new("elsewhere"));
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
