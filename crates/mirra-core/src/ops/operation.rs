//! Reversible destructive operations.
//!
//! Each constructor executes the operation against storage and the tree
//! and returns the value needed to invert it. Storage is always mutated
//! first; if the tree cannot follow, the affected parents are reconciled
//! so the model never keeps a stale path.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::fs::storage::{is_valid_filename, EntryKind};
use crate::ops::staging::Staging;
use crate::sync::synchronizer::attached;
use crate::sync::SyncContext;
use crate::tree::node::{FileEntry, Handle};
use crate::tree::store::{NodeRef, NodeStore, ParkedSubtree};

/// Tree state taken out by an operation, kept so undo restores identity.
#[derive(Debug)]
pub(crate) enum Removed {
    File(FileEntry),
    Directory(ParkedSubtree),
}

/// A delete: the entry now sits in the staging area.
#[derive(Debug)]
pub struct Staged {
    kind: EntryKind,
    path: PathBuf,
    storage_name: String,
    staged: PathBuf,
    entry: Option<Removed>,
}

/// A rename or move.
#[derive(Debug)]
pub struct Transfer {
    kind: EntryKind,
    from: PathBuf,
    to: PathBuf,
    original_name: String,
    location: PathBuf,
    parked: Option<Removed>,
}

impl Transfer {
    /// Path key before the operation.
    pub fn from(&self) -> &Path {
        &self.from
    }

    /// Path key after the operation.
    pub fn to(&self) -> &Path {
        &self.to
    }
}

/// An executed operation, as kept in the [`OperationLog`](crate::ops::OperationLog).
#[derive(Debug)]
pub enum Operation {
    Delete(Staged),
    Rename(Transfer),
    Move(Transfer),
}

/// What an operation acts on, resolved from the tree.
struct Target {
    kind: EntryKind,
    location: PathBuf,
    storage_name: String,
    parent: PathBuf,
}

/// Where a transferred entry ended up.
struct Landing {
    key: PathBuf,
    location: PathBuf,
    parked: Option<Removed>,
}

impl Operation {
    /// Moves the entry at `path` into the staging area.
    ///
    /// Directories are only accepted when they are empty on storage.
    pub(crate) fn delete(ctx: &mut SyncContext<'_>, staging: &Staging, path: &Path) -> CoreResult<Self> {
        let target = resolve(ctx.store, path)?;
        match target.kind {
            EntryKind::File => {
                ctx.storage.stat(&target.location)?;
            }
            EntryKind::Directory => {
                if !ctx.storage.list(&target.location)?.is_empty() {
                    return Err(CoreError::NotEmpty(path.to_path_buf()));
                }
            }
        }

        let root = ctx
            .store
            .root_node()
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?;
        let root_location = root.handle().location().to_path_buf();
        let relative = target
            .parent
            .strip_prefix(root.path())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let staged_dir = staging.prepare(ctx.storage, &root_location, &relative)?;
        let staged_name = staging.free_name(ctx.storage, &staged_dir, &target.storage_name);
        let staged = ctx
            .storage
            .move_to(&target.location, &staged_dir, &staged_name)?;

        let entry = match target.kind {
            EntryKind::File => {
                let taken = ctx
                    .store
                    .dir_mut(&target.parent)
                    .and_then(|dir| dir.take_file(&file_name(path)));
                ctx.sink.emit(Event::FilesChanged {
                    path: target.parent.clone(),
                });
                taken.map(Removed::File)
            }
            EntryKind::Directory => match ctx.store.park_dir(path) {
                Ok(parked) => {
                    ctx.sink.emit(Event::Detached {
                        path: path.to_path_buf(),
                    });
                    Some(Removed::Directory(parked))
                }
                Err(err) => {
                    tracing::warn!("could not detach {}: {err}", path.display());
                    self_correct(ctx, &[target.parent.as_path()]);
                    None
                }
            },
        };

        tracing::info!("staged {} at {}", path.display(), staged.display());
        Ok(Self::Delete(Staged {
            kind: target.kind,
            path: path.to_path_buf(),
            storage_name: target.storage_name,
            staged,
            entry,
        }))
    }

    /// Renames the entry at `path` within its directory.
    pub(crate) fn rename(ctx: &mut SyncContext<'_>, path: &Path, new_name: &str) -> CoreResult<Self> {
        let target = resolve(ctx.store, path)?;
        let landing = transfer(ctx, path, None, &target.parent, new_name)?;
        tracing::info!("renamed {} to {}", path.display(), landing.key.display());
        Ok(Self::Rename(Transfer {
            kind: target.kind,
            from: path.to_path_buf(),
            to: landing.key,
            original_name: target.storage_name,
            location: landing.location,
            parked: landing.parked,
        }))
    }

    /// Moves the entry at `path` into the directory `dest_dir`, keeping its name.
    pub(crate) fn move_to(ctx: &mut SyncContext<'_>, path: &Path, dest_dir: &Path) -> CoreResult<Self> {
        let target = resolve(ctx.store, path)?;
        let landing = transfer(ctx, path, None, dest_dir, &target.storage_name)?;
        tracing::info!("moved {} to {}", path.display(), landing.key.display());
        Ok(Self::Move(Transfer {
            kind: target.kind,
            from: path.to_path_buf(),
            to: landing.key,
            original_name: target.storage_name,
            location: landing.location,
            parked: landing.parked,
        }))
    }

    /// Inverts the operation. On error nothing has been changed and the
    /// operation can be retried.
    pub(crate) fn undo(&mut self, ctx: &mut SyncContext<'_>) -> CoreResult<()> {
        match self {
            Self::Delete(staged) => staged.restore(ctx),
            Self::Rename(t) | Self::Move(t) => {
                let parent = parent_of(&t.from)?;
                let fallback = Fallback {
                    kind: t.kind,
                    location: &t.location,
                    parked: &mut t.parked,
                };
                transfer(ctx, &t.to, Some(fallback), &parent, &t.original_name)?;
                Ok(())
            }
        }
    }

    /// Human-readable summary, e.g. `rename photos/a.jpg to b.jpg`.
    pub fn description(&self) -> String {
        match self {
            Self::Delete(s) => format!("delete {}", s.path.display()),
            Self::Rename(t) => format!("rename {} to {}", t.from.display(), file_name(&t.to)),
            Self::Move(t) => format!(
                "move {} to {}",
                t.from.display(),
                t.to.parent().unwrap_or(Path::new("")).display()
            ),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Delete(s) => s.kind,
            Self::Rename(t) | Self::Move(t) => t.kind,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete(_))
    }

    /// Storage location of a staged entry.
    pub fn staged_location(&self) -> Option<&Path> {
        match self {
            Self::Delete(s) => Some(&s.staged),
            _ => None,
        }
    }

    /// Directory the entry returns to on undo.
    pub fn origin_dir(&self) -> &Path {
        let path = match self {
            Self::Delete(s) => &s.path,
            Self::Rename(t) | Self::Move(t) => &t.from,
        };
        path.parent().unwrap_or(path.as_path())
    }

    /// The path to recover from when undo hits a stale handle.
    pub fn affected_path(&self) -> &Path {
        match self {
            Self::Delete(s) => s.path.parent().unwrap_or(s.path.as_path()),
            Self::Rename(t) | Self::Move(t) => &t.to,
        }
    }
}

impl Staged {
    /// Moves the entry back from staging and reinserts the removed node,
    /// keeping its identity.
    fn restore(&mut self, ctx: &mut SyncContext<'_>) -> CoreResult<()> {
        let parent = parent_of(&self.path)?;
        let name = file_name(&self.path);
        let dest = ctx
            .store
            .dir(&parent)
            .ok_or_else(|| CoreError::ResourceVanished(parent.clone()))?;
        if dest.file(&name).is_some() || dest.has_child(&name) {
            return Err(CoreError::NameCollision(self.path.clone()));
        }
        let dest_location = dest.handle().location().to_path_buf();
        let scanned = dest.scanned();

        let location = ctx
            .storage
            .move_to(&self.staged, &dest_location, &self.storage_name)?;

        let entry = self.entry.take();
        if !scanned {
            return Ok(());
        }
        match entry {
            Some(Removed::File(mut file)) => {
                file.set_handle(Handle::new(&location));
                match ctx.storage.stat(&location) {
                    Ok(stat) if !file.matches(&stat) => file.refresh(&stat),
                    Ok(_) => {}
                    Err(err) => tracing::warn!("probe of restored {} failed: {err}", location.display()),
                }
                let inserted = ctx
                    .store
                    .dir_mut(&parent)
                    .map(|dir| dir.insert_file(file).is_ok())
                    .unwrap_or(false);
                if inserted {
                    ctx.sink.emit(Event::FilesChanged { path: parent });
                } else {
                    self_correct(ctx, &[parent.as_path()]);
                }
            }
            Some(Removed::Directory(parked)) => match ctx.store.unpark_dir(parked, &location) {
                Ok(_) => {
                    if let Some(event) = attached(&*ctx.store, &parent, &name) {
                        ctx.sink.emit(event);
                    }
                }
                Err((err, _)) => {
                    tracing::warn!("could not reattach {}: {err}", self.path.display());
                    self_correct(ctx, &[parent.as_path()]);
                }
            },
            None => self_correct(ctx, &[parent.as_path()]),
        }
        tracing::info!("restored {}", self.path.display());
        Ok(())
    }
}

/// Resolves a non-root path into what the operations need.
fn resolve(store: &NodeStore, path: &Path) -> CoreResult<Target> {
    let (kind, handle) = match store.resolve(path) {
        Some(NodeRef::Directory(dir)) if dir.is_root() => {
            return Err(CoreError::InvalidTarget(path.to_path_buf()));
        }
        Some(NodeRef::Directory(dir)) => (EntryKind::Directory, dir.handle()),
        Some(NodeRef::File(file)) => (EntryKind::File, file.handle()),
        None => return Err(CoreError::NotFound(path.to_path_buf())),
    };
    Ok(Target {
        kind,
        location: handle.location().to_path_buf(),
        storage_name: handle.storage_name().unwrap_or_else(|| file_name(path)),
        parent: parent_of(path)?,
    })
}

/// What undo acts on when the transferred entry is no longer in the tree.
struct Fallback<'a> {
    kind: EntryKind,
    location: &'a Path,
    parked: &'a mut Option<Removed>,
}

/// Moves or renames `source` to `dest_parent/name`, storage first.
///
/// When `source` is no longer in the tree, `fallback` supplies the kind
/// and storage location to act on. The tree then takes back the parked
/// entry, or picks it up by reconciling the destination.
fn transfer(
    ctx: &mut SyncContext<'_>,
    source: &Path,
    fallback: Option<Fallback<'_>>,
    dest_parent: &Path,
    name: &str,
) -> CoreResult<Landing> {
    if !is_valid_filename(name) {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    let display = crate::nfc_string(name);
    if ctx.scanner.is_reserved(&*ctx.store, dest_parent, &display) {
        return Err(CoreError::InvalidName(display));
    }

    let (kind, location, parked) = match resolve(ctx.store, source) {
        Ok(target) => (target.kind, target.location, None),
        Err(CoreError::NotFound(path)) => match fallback {
            Some(fallback) => (fallback.kind, fallback.location.to_path_buf(), Some(fallback.parked)),
            None => return Err(CoreError::NotFound(path)),
        },
        Err(err) => return Err(err),
    };

    let dest = ctx.store.require_dir(dest_parent)?;
    let dest_location = dest.handle().location().to_path_buf();
    let dest_scanned = dest.scanned();
    let key = dest_parent.join(&display);
    if key == source || dest.file(&display).is_some() || dest.has_child(&display) {
        return Err(CoreError::NameCollision(key));
    }
    if kind == EntryKind::Directory && dest_parent.starts_with(source) {
        return Err(CoreError::InvalidTarget(dest_parent.to_path_buf()));
    }

    let new_location = if location.parent() == Some(dest_location.as_path()) {
        ctx.storage.rename(&location, name)?
    } else {
        ctx.storage.move_to(&location, &dest_location, name)?
    };

    let source_parent = source.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut left_out = None;
    match parked {
        None => match follow(ctx, kind, source, dest_parent, &display, &new_location, dest_scanned) {
            Ok(removed) => left_out = removed,
            Err(err) => {
                tracing::warn!("tree could not follow {}: {err}", source.display());
                self_correct(ctx, &[source_parent.as_path(), dest_parent]);
            }
        },
        Some(slot) => {
            let restored = match slot.take() {
                Some(removed) => reinstate(ctx, removed, &key, &new_location),
                None => false,
            };
            if !restored {
                self_correct(ctx, &[source_parent.as_path(), dest_parent]);
            }
        }
    }

    Ok(Landing {
        key,
        location: new_location,
        parked: left_out,
    })
}

/// Puts an entry parked by [`follow`] back at `key`. Returns `false` if
/// the tree could not take it.
fn reinstate(ctx: &mut SyncContext<'_>, removed: Removed, key: &Path, location: &Path) -> bool {
    let Ok(parent) = parent_of(key) else {
        return false;
    };
    let name = file_name(key);
    match removed {
        Removed::File(mut file) => {
            let accepted = ctx.scanner.filter().accepts_file(&name);
            let Some(dir) = ctx.store.dir_mut(&parent).filter(|d| d.scanned() && accepted) else {
                return false;
            };
            file.set_name(name);
            file.set_handle(Handle::new(location));
            match ctx.storage.stat(location) {
                Ok(stat) if !file.matches(&stat) => file.refresh(&stat),
                Ok(_) => {}
                Err(err) => tracing::warn!("probe of {} failed: {err}", location.display()),
            }
            if dir.insert_file(file).is_err() {
                return false;
            }
            ctx.sink.emit(Event::FilesChanged { path: parent });
            true
        }
        Removed::Directory(parked) => {
            if parked.path() != key {
                return false;
            }
            match ctx.store.unpark_dir(parked, location) {
                Ok(_) => {
                    if let Some(event) = attached(&*ctx.store, &parent, &name) {
                        ctx.sink.emit(event);
                    }
                    true
                }
                Err((err, _)) => {
                    tracing::warn!("could not reattach {}: {err}", key.display());
                    false
                }
            }
        }
    }
}

/// Applies a completed storage transfer to the tree.
///
/// An entry the destination does not mirror is taken out of the tree and
/// returned so undo can put it back as it was.
fn follow(
    ctx: &mut SyncContext<'_>,
    kind: EntryKind,
    source: &Path,
    dest_parent: &Path,
    display: &str,
    new_location: &Path,
    dest_scanned: bool,
) -> CoreResult<Option<Removed>> {
    let source_parent = parent_of(source)?;
    match kind {
        EntryKind::File => {
            let mut file = ctx
                .store
                .dir_mut(&source_parent)
                .and_then(|dir| dir.take_file(&file_name(source)))
                .ok_or_else(|| CoreError::NotFound(source.to_path_buf()))?;
            file.set_name(display.to_string());
            file.set_handle(Handle::new(new_location));
            ctx.sink.emit(Event::FilesChanged {
                path: source_parent.clone(),
            });
            if !(dest_scanned && ctx.scanner.filter().accepts_file(display)) {
                return Ok(Some(Removed::File(file)));
            }
            let dest = ctx
                .store
                .dir_mut(dest_parent)
                .ok_or_else(|| CoreError::NotFound(dest_parent.to_path_buf()))?;
            dest.insert_file(file)
                .map_err(|f| CoreError::NameCollision(f.path()))?;
            if dest_parent != source_parent {
                ctx.sink.emit(Event::FilesChanged {
                    path: dest_parent.to_path_buf(),
                });
            }
            Ok(None)
        }
        EntryKind::Directory => {
            if dest_scanned && ctx.scanner.mirrors_dir(&*ctx.store, dest_parent, display) {
                ctx.store
                    .relocate_dir(source, dest_parent, display, new_location)?;
                ctx.sink.emit(Event::Detached {
                    path: source.to_path_buf(),
                });
                if let Some(event) = attached(&*ctx.store, dest_parent, display) {
                    ctx.sink.emit(event);
                }
                Ok(None)
            } else {
                let parked = ctx.store.park_dir(source)?;
                ctx.sink.emit(Event::Detached {
                    path: source.to_path_buf(),
                });
                Ok(Some(Removed::Directory(parked)))
            }
        }
    }
}

/// Reconciles each scanned directory in `parents` so the tree matches
/// storage again.
fn self_correct(ctx: &mut SyncContext<'_>, parents: &[&Path]) {
    let mut done: Vec<&Path> = Vec::new();
    for &parent in parents {
        if done.contains(&parent) {
            continue;
        }
        done.push(parent);
        let scanned = ctx.store.dir(parent).is_some_and(|d| d.scanned());
        if !scanned {
            continue;
        }
        if let Err(err) = ctx.resync(parent) {
            tracing::warn!("reconcile of {} failed: {err}", parent.display());
        }
    }
}

fn parent_of(path: &Path) -> CoreResult<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| CoreError::InvalidTarget(path.to_path_buf()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
