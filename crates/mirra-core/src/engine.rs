//! The engine context that owns the tree and every component acting on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::settings::Config;
use crate::error::{CoreError, CoreResult};
use crate::event::EventSink;
use crate::fs::hash::{ContentAddress, ContentHasher, PrefixSha256};
use crate::fs::media::MediaFilter;
use crate::fs::storage::Storage;
use crate::ops::{Operation, OperationLog, Staging};
use crate::sync::{
    BackgroundScanScheduler, Recovery, RecoveryProtocol, ScanDiff, Scanner, Step, SyncContext,
};
use crate::tree::node::{FileEntry, Handle};
use crate::tree::snapshot::Snapshot;
use crate::tree::store::{NodeRef, NodeStore};
use crate::tree::view::View;

/// Result of [`Engine::open_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    /// The directory was reconciled and is ready to show.
    Ready,
    /// The directory had gone stale; `ancestor` was reconciled instead.
    Recovered { ancestor: PathBuf },
}

/// Single-writer owner of the mirrored tree.
///
/// Every mutation goes through `&mut Engine`. Front ends that share the
/// engine between tasks wrap it in a mutex and hold the lock for one
/// operation or one background step at a time.
pub struct Engine {
    store: NodeStore,
    storage: Arc<dyn Storage>,
    scanner: Scanner,
    staging: Staging,
    log: OperationLog,
    scheduler: BackgroundScanScheduler,
    hasher: Box<dyn ContentHasher>,
    sink: Box<dyn EventSink>,
    config: Config,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.store.root())
            .field("dirs", &self.store.dir_count())
            .field("history", &self.log.len())
            .field("pending", &self.scheduler.pending())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Mirrors the directory at `root`, scanning it interactively and
    /// queueing the rest of the tree for background scanning.
    pub fn open(
        root: impl Into<PathBuf>,
        storage: Arc<dyn Storage>,
        config: Config,
        sink: impl EventSink + 'static,
    ) -> CoreResult<Self> {
        let root_location = root.into();
        if !storage.validate(&root_location) {
            return Err(CoreError::Unrecoverable(root_location));
        }
        let name = root_location
            .file_name()
            .map(|n| crate::nfc_string(&n.to_string_lossy()))
            .unwrap_or_else(|| root_location.display().to_string());

        let mut engine = Self {
            store: NodeStore::new(),
            storage,
            scanner: Scanner::new(MediaFilter::from_config(&config.scan))
                .reserving(config.staging.dir_name.clone()),
            staging: Staging::from_config(&config.staging),
            log: OperationLog::new(config.history.capacity),
            scheduler: BackgroundScanScheduler::new(),
            hasher: Box::new(PrefixSha256::new(config.hashing.prefix_bytes)),
            sink: Box::new(sink),
            config,
        };
        let root_key = engine.store.set_root(&name, Handle::new(&root_location));
        engine
            .split()
            .0
            .resync(&root_key)
            .map_err(|e| e.during(format!("open {}", root_location.display())))?;
        engine.scheduler.start(&engine.store, &root_key);

        tracing::info!(
            "opened {} as {} ({} pending)",
            root_location.display(),
            root_key.display(),
            engine.scheduler.pending()
        );
        Ok(engine)
    }

    /// Replaces the content hasher.
    pub fn with_hasher(mut self, hasher: impl ContentHasher + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    /// Path key of the root directory.
    pub fn root(&self) -> &Path {
        self.store.root().unwrap_or(Path::new(""))
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> &OperationLog {
        &self.log
    }

    pub fn scheduler(&self) -> &BackgroundScanScheduler {
        &self.scheduler
    }

    /// Reconciles one directory with storage.
    pub fn refresh(&mut self, path: &Path) -> CoreResult<ScanDiff> {
        let result = self.split().0.resync(path);
        let diff = self.settle(path, result, || format!("refresh {}", path.display()))?;
        self.scheduler.adopt(&self.store, path);
        Ok(diff)
    }

    /// Validates and reconciles a directory the user is about to look at.
    ///
    /// A stale directory is recovered rather than reported; the caller
    /// then shows `ancestor` instead.
    pub fn open_dir(&mut self, path: &Path) -> CoreResult<Opened> {
        let location = self.store.require_dir(path)?.handle().location().to_path_buf();
        if self.storage.validate(&location) {
            match self.split().0.resync(path) {
                Ok(_) => {
                    self.scheduler.adopt(&self.store, path);
                    return Ok(Opened::Ready);
                }
                Err(err) if err.is_vanished() => {}
                Err(err) => return Err(err.during(format!("open {}", path.display()))),
            }
        }
        let recovery = self.recover(path)?;
        Ok(Opened::Recovered {
            ancestor: recovery.ancestor,
        })
    }

    /// Moves an entry to the staging area and records it for undo.
    pub fn delete(&mut self, path: &Path) -> CoreResult<()> {
        let (mut ctx, _, _, staging) = self.split();
        let result = Operation::delete(&mut ctx, staging, path);
        let op = self.settle(path, result, || format!("delete {}", path.display()))?;
        self.log.record(op);
        Ok(())
    }

    /// Renames an entry and returns its new path key.
    pub fn rename(&mut self, path: &Path, new_name: &str) -> CoreResult<PathBuf> {
        let result = Operation::rename(&mut self.split().0, path, new_name);
        let op = self.settle(path, result, || format!("rename {}", path.display()))?;
        let new_path = match &op {
            Operation::Rename(t) => t.to().to_path_buf(),
            _ => path.to_path_buf(),
        };
        self.log.record(op);
        if let Some(parent) = new_path.parent() {
            self.scheduler.adopt(&self.store, parent);
        }
        Ok(new_path)
    }

    /// Moves an entry into `dest_dir` and returns its new path key.
    ///
    /// An unscanned destination is reconciled first so the entry shows up
    /// there right away.
    pub fn move_entry(&mut self, path: &Path, dest_dir: &Path) -> CoreResult<PathBuf> {
        if !self.store.require_dir(dest_dir)?.scanned() {
            let result = self.split().0.resync(dest_dir);
            self.settle(dest_dir, result, || format!("scan {}", dest_dir.display()))?;
            self.scheduler.adopt(&self.store, dest_dir);
        }
        let result = Operation::move_to(&mut self.split().0, path, dest_dir);
        let stale = match &result {
            Err(err) if err.is_vanished() => self.stale_among(&[path, dest_dir]),
            _ => path.to_path_buf(),
        };
        let op = self.settle(&stale, result, || {
            format!("move {} to {}", path.display(), dest_dir.display())
        })?;
        let new_path = match &op {
            Operation::Move(t) => t.to().to_path_buf(),
            _ => path.to_path_buf(),
        };
        self.log.record(op);
        for dir in [path.parent().unwrap_or(path), dest_dir] {
            self.scheduler.adopt(&self.store, dir);
        }
        Ok(new_path)
    }

    /// Inverts the most recent operation and returns its description.
    pub fn undo(&mut self) -> CoreResult<String> {
        let (affected, origin) = self
            .log
            .last()
            .map(|op| (op.affected_path().to_path_buf(), op.origin_dir().to_path_buf()))
            .ok_or(CoreError::NothingToUndo)?;
        let (mut ctx, _, log, _) = self.split();
        let result = log.undo(&mut ctx);
        let description = self.settle(&affected, result, || "undo".to_string())?;
        self.scheduler.adopt(&self.store, &origin);
        Ok(description)
    }

    /// Runs the recovery protocol for a path whose handle went stale.
    pub fn recover(&mut self, path: &Path) -> CoreResult<Recovery> {
        let (mut ctx, scheduler, _, _) = self.split();
        RecoveryProtocol::recover(&mut ctx, scheduler, path)
    }

    /// Reconciles the next pending directory, if any.
    pub fn background_step(&mut self) -> CoreResult<Step> {
        let Some(path) = self.scheduler.next_pending() else {
            return Ok(Step::Idle);
        };
        if !self.store.contains_dir(&path) {
            tracing::debug!("{} left the tree before its scan", path.display());
            return Ok(Step::Skipped(path));
        }
        match self.split().0.resync(&path) {
            Ok(_) => {
                self.scheduler.descend(&self.store, &path);
                Ok(Step::Scanned(path))
            }
            Err(err) if err.is_vanished() => {
                match self.recover(&path) {
                    Ok(_) => {}
                    Err(fatal @ CoreError::Unrecoverable(_)) => return Err(fatal),
                    Err(other) => tracing::warn!("recovery from {} failed: {other}", path.display()),
                }
                Ok(Step::Skipped(path))
            }
            Err(CoreError::PermissionDenied(denied)) => {
                tracing::warn!("skipping {}: permission denied", denied.display());
                Ok(Step::Skipped(path))
            }
            Err(err) => Err(err.during(format!("scan {}", path.display()))),
        }
    }

    /// Runs background steps until the cursor is exhausted and returns the
    /// number of directories scanned.
    pub fn run_background(&mut self) -> CoreResult<usize> {
        let mut scanned = 0;
        loop {
            match self.background_step()? {
                Step::Idle => return Ok(scanned),
                Step::Scanned(_) => scanned += 1,
                Step::Skipped(_) => {}
            }
        }
    }

    /// Content address of a file, computed on first request and cached
    /// until the file changes.
    pub fn content_address(&mut self, path: &Path) -> CoreResult<ContentAddress> {
        let file = self
            .store
            .file(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?;
        if let Some(address) = file.content_address() {
            return Ok(address.clone());
        }
        let location = file.handle().location().to_path_buf();
        let result = self.hasher.address(self.storage.as_ref(), &location);
        let address = self.settle(path, result, || format!("hash {}", path.display()))?;
        if let Some(file) = self.store.file_mut(path) {
            file.set_content_address(address.clone());
        }
        Ok(address)
    }

    /// Files visible in `view`.
    pub fn view_files(&self, view: &View) -> CoreResult<Vec<&FileEntry>> {
        view.files(&self.store)
    }

    /// Permanently removes everything staged by deletes. Those deletes can
    /// no longer be undone and are dropped from the history; returns how
    /// many were dropped.
    pub fn empty_staging(&mut self) -> CoreResult<usize> {
        let root_location = self
            .store
            .root_node()
            .map(|r| r.handle().location().to_path_buf())
            .ok_or_else(|| CoreError::NotFound(PathBuf::new()))?;
        let purged = self
            .staging
            .purge(self.storage.as_ref(), &root_location)
            .map_err(|e| e.during("empty staging"))?;
        let dropped = self.log.drop_deletes();
        tracing::info!("emptied staging (purged: {purged}, dropped {dropped} history entries)");
        Ok(dropped)
    }

    /// Identity-free copy of the current tree.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Stops background work and releases the tree.
    pub fn close(mut self) {
        self.scheduler.cancel();
        self.log.clear();
        tracing::info!("closed {}", self.root().display());
        self.store.clear();
    }

    /// Borrows the components an operation needs, disjointly.
    fn split(
        &mut self,
    ) -> (
        SyncContext<'_>,
        &mut BackgroundScanScheduler,
        &mut OperationLog,
        &Staging,
    ) {
        let Self {
            store,
            storage,
            scanner,
            sink,
            scheduler,
            log,
            staging,
            ..
        } = self;
        let ctx = SyncContext {
            store,
            storage: &**storage,
            scanner,
            sink: &mut **sink,
        };
        (ctx, scheduler, log, &*staging)
    }

    /// Recovers from a vanished resource before handing the original
    /// error back with the attempted action attached.
    fn settle<T>(
        &mut self,
        path: &Path,
        result: CoreResult<T>,
        action: impl FnOnce() -> String,
    ) -> CoreResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_vanished() => {
                match self.recover(path) {
                    Ok(_) => {}
                    Err(fatal @ CoreError::Unrecoverable(_)) => return Err(fatal),
                    Err(other) => tracing::warn!("recovery from {} failed: {other}", path.display()),
                }
                Err(err.during(action()))
            }
            Err(err) => Err(err.during(action())),
        }
    }

    /// First of `paths` whose storage entry is gone, or the first path.
    fn stale_among(&self, paths: &[&Path]) -> PathBuf {
        paths
            .iter()
            .find(|p| {
                let location = match self.store.resolve(p) {
                    Some(NodeRef::Directory(d)) => d.handle().location(),
                    Some(NodeRef::File(f)) => f.handle().location(),
                    None => return false,
                };
                !self.storage.exists(location)
            })
            .or_else(|| paths.first())
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }
}
