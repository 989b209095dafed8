//! Single-pass reconciliation of one directory against storage.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::media::MediaFilter;
use crate::fs::storage::{EntryKind, ListedEntry, Storage};
use crate::tree::node::{FileEntry, Handle};
use crate::tree::order::natural_cmp;
use crate::tree::store::NodeStore;

/// One entry added or removed by a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub name: String,
    pub kind: EntryKind,
    pub handle: Handle,
}

/// Result of [`Scanner::reconcile`].
///
/// Files are already applied to the node when the diff is returned;
/// directory entries still have to go through
/// [`TreeSynchronizer::apply`](crate::sync::TreeSynchronizer::apply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDiff {
    /// Path key of the reconciled directory.
    pub path: PathBuf,
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    /// Files kept with a new size or modification time.
    pub changed: usize,
    /// Entries kept untouched, directories included.
    pub unchanged: usize,
}

impl ScanDiff {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            added: Vec::new(),
            removed: Vec::new(),
            changed: 0,
            unchanged: 0,
        }
    }

    /// `true` when nothing was added, removed or changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed == 0
    }

    /// Names of added entries of the given kind.
    pub fn added_names(&self, kind: EntryKind) -> Vec<&str> {
        names_of(&self.added, kind)
    }

    /// Names of removed entries of the given kind.
    pub fn removed_names(&self, kind: EntryKind) -> Vec<&str> {
        names_of(&self.removed, kind)
    }

    /// Returns `true` if the directory's file list was modified.
    pub fn files_changed(&self) -> bool {
        self.changed > 0
            || self.added.iter().any(|e| e.kind == EntryKind::File)
            || self.removed.iter().any(|e| e.kind == EntryKind::File)
    }
}

fn names_of(entries: &[DiffEntry], kind: EntryKind) -> Vec<&str> {
    entries
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.name.as_str())
        .collect()
}

/// Reconciles directories against their live listing.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    filter: MediaFilter,
    reserved: Option<String>,
}

impl Scanner {
    pub fn new(filter: MediaFilter) -> Self {
        Self {
            filter,
            reserved: None,
        }
    }

    /// Never mirrors a directory called `name` directly under the root,
    /// whatever the filter says.
    pub fn reserving(mut self, name: impl Into<String>) -> Self {
        self.reserved = Some(name.into());
        self
    }

    pub fn filter(&self) -> &MediaFilter {
        &self.filter
    }

    /// Returns `true` if `name` is the reserved name and `parent` is the root.
    pub fn is_reserved(&self, store: &NodeStore, parent: &Path, name: &str) -> bool {
        self.reserved.as_deref() == Some(name) && store.root() == Some(parent)
    }

    /// Returns `true` if a directory called `name` under `parent` is mirrored.
    pub fn mirrors_dir(&self, store: &NodeStore, parent: &Path, name: &str) -> bool {
        self.filter.accepts_dir(name) && !self.is_reserved(store, parent, name)
    }

    /// Brings the files of the directory at `path` in line with storage
    /// and reports what changed.
    ///
    /// Kept files retain their [`EntryId`](crate::tree::EntryId) and, when
    /// unchanged, their cached content address. A file whose probe fails
    /// mid-scan is reported as removed. Failing to list the directory
    /// itself aborts without touching the node.
    pub fn reconcile(
        &self,
        store: &mut NodeStore,
        storage: &dyn Storage,
        path: &Path,
    ) -> CoreResult<ScanDiff> {
        let dir = store.require_dir(path)?;
        let location = dir.handle().location().to_path_buf();
        let mut known_dirs: HashSet<String> = dir.children().iter().cloned().collect();
        let at_root = dir.is_root();

        let listing = storage.list(&location)?;

        let mut known_files: HashMap<String, FileEntry> = store
            .dir_mut(path)
            .map(|d| d.take_files())
            .unwrap_or_default()
            .into_iter()
            .map(|f| (f.name().to_string(), f))
            .collect();

        let mut diff = ScanDiff::new(path);
        let mut files = Vec::with_capacity(listing.len());
        let mut seen = HashSet::new();

        for entry in listing {
            let entry = ListedEntry {
                name: crate::nfc_string(&entry.name),
                ..entry
            };
            if !seen.insert(entry.name.clone()) {
                tracing::warn!(
                    "duplicate name {:?} in {}, keeping the first",
                    entry.name,
                    location.display()
                );
                continue;
            }
            match entry.kind {
                EntryKind::Directory => {
                    if !self.filter.accepts_dir(&entry.name)
                        || (at_root && self.reserved.as_deref() == Some(entry.name.as_str()))
                    {
                        continue;
                    }
                    if known_dirs.remove(&entry.name) {
                        diff.unchanged += 1;
                        if let Some(child) = store.dir_mut(&path.join(&entry.name)) {
                            if child.handle().location() != entry.location {
                                child.set_handle(Handle::new(entry.location));
                            }
                        }
                    } else {
                        diff.added.push(DiffEntry {
                            name: entry.name,
                            kind: EntryKind::Directory,
                            handle: Handle::new(entry.location),
                        });
                    }
                }
                EntryKind::File => {
                    if !self.filter.accepts_file(&entry.name) {
                        continue;
                    }
                    let stat = match storage.stat(&entry.location) {
                        Ok(stat) => stat,
                        Err(err) => {
                            tracing::warn!("probe failed for {}: {err}", entry.location.display());
                            if let Some(stale) = known_files.remove(&entry.name) {
                                diff.removed.push(DiffEntry {
                                    name: entry.name,
                                    kind: EntryKind::File,
                                    handle: stale.handle().clone(),
                                });
                            }
                            continue;
                        }
                    };
                    match known_files.remove(&entry.name) {
                        Some(mut kept) => {
                            if kept.matches(&stat) {
                                diff.unchanged += 1;
                            } else {
                                kept.refresh(&stat);
                                diff.changed += 1;
                            }
                            if kept.handle().location() != entry.location {
                                kept.set_handle(Handle::new(entry.location));
                            }
                            files.push(kept);
                        }
                        None => {
                            let handle = Handle::new(entry.location);
                            diff.added.push(DiffEntry {
                                name: entry.name.clone(),
                                kind: EntryKind::File,
                                handle: handle.clone(),
                            });
                            files.push(store.new_file(path, entry.name, &stat, handle));
                        }
                    }
                }
            }
        }

        for (name, stale) in known_files {
            diff.removed.push(DiffEntry {
                name,
                kind: EntryKind::File,
                handle: stale.handle().clone(),
            });
        }
        for name in known_dirs {
            let handle = store
                .dir(&path.join(&name))
                .map(|d| d.handle().clone())
                .unwrap_or_else(|| Handle::new(location.join(&name)));
            diff.removed.push(DiffEntry {
                name,
                kind: EntryKind::Directory,
                handle,
            });
        }

        files.sort_by(|a, b| natural_cmp(a.name(), b.name()));
        diff.added.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        diff.removed.sort_by(|a, b| natural_cmp(&a.name, &b.name));

        let node = store
            .dir_mut(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?;
        node.replace_files(files);
        node.mark_scanned();

        tracing::debug!(
            "reconciled {}: +{} -{} ~{} ={}",
            path.display(),
            diff.added.len(),
            diff.removed.len(),
            diff.changed,
            diff.unchanged
        );
        Ok(diff)
    }
}
