//! Directory and file nodes.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{CoreError, CoreResult};
use crate::fs::hash::ContentAddress;
use crate::fs::storage::Stat;
use crate::tree::order::natural_cmp;

/// Stable identity of a node across reconciliations.
///
/// Allocated once by the [`NodeStore`](crate::tree::NodeStore) when an
/// entry is first discovered and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

/// Opaque capability referencing a live external entry.
///
/// A handle can go stale at any time when the entry is changed by another
/// process; every use must be prepared for [`CoreError::ResourceVanished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    location: PathBuf,
}

impl Handle {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// Storage location this handle refers to.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The on-storage name, which may differ from the display name in
    /// Unicode normalisation form.
    pub fn storage_name(&self) -> Option<String> {
        self.location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Re-bases this handle after an ancestor moved from `from` to `to`.
    pub(crate) fn rebase(&self, from: &Path, to: &Path) -> Self {
        match self.location.strip_prefix(from) {
            Ok(rest) if rest.as_os_str().is_empty() => Self::new(to),
            Ok(rest) => Self::new(to.join(rest)),
            Err(_) => self.clone(),
        }
    }
}

/// A mirrored media file.
///
/// Owned exclusively by its parent [`DirectoryNode`]; `parent` is a path
/// key, not an owning link.
#[derive(Debug)]
pub struct FileEntry {
    id: EntryId,
    name: String,
    size: u64,
    modified: Option<SystemTime>,
    parent: PathBuf,
    handle: Handle,
    content_address: Option<ContentAddress>,
}

impl FileEntry {
    pub(crate) fn new(id: EntryId, parent: &Path, name: String, stat: &Stat, handle: Handle) -> Self {
        Self {
            id,
            name,
            size: stat.size,
            modified: stat.modified,
            parent: parent.to_path_buf(),
            handle,
            content_address: None,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Path key of the owning directory.
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Full path key of this file.
    pub fn path(&self) -> PathBuf {
        self.parent.join(&self.name)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Cached content address, if one has been computed since the last change.
    pub fn content_address(&self) -> Option<&ContentAddress> {
        self.content_address.as_ref()
    }

    /// Returns `true` if `stat` describes the same content revision.
    pub fn matches(&self, stat: &Stat) -> bool {
        self.size == stat.size && self.modified == stat.modified
    }

    /// Applies a newer stat in place and drops the cached content address.
    pub(crate) fn refresh(&mut self, stat: &Stat) {
        self.size = stat.size;
        self.modified = stat.modified;
        self.content_address = None;
    }

    pub(crate) fn set_handle(&mut self, handle: Handle) {
        self.handle = handle;
    }

    pub(crate) fn set_content_address(&mut self, address: ContentAddress) {
        self.content_address = Some(address);
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_parent(&mut self, parent: &Path) {
        self.parent = parent.to_path_buf();
    }
}

/// A mirrored directory.
#[derive(Debug)]
pub struct DirectoryNode {
    id: EntryId,
    path: PathBuf,
    name: String,
    parent: Option<PathBuf>,
    children: Vec<String>,
    files: Vec<FileEntry>,
    handle: Handle,
    scanned: bool,
}

impl DirectoryNode {
    pub(crate) fn new(id: EntryId, parent: Option<&Path>, name: String, handle: Handle) -> Self {
        let path = match parent {
            Some(p) => p.join(&name),
            None => PathBuf::from(&name),
        };
        Self {
            id,
            path,
            name,
            parent: parent.map(Path::to_path_buf),
            children: Vec::new(),
            files: Vec::new(),
            handle,
            scanned: false,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path key of the parent, `None` for the root.
    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Child directory names in natural order.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Files in natural order.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.file_index(name).map(|i| &self.files[i])
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child_index(name).is_ok()
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Whether this directory has been reconciled at least once.
    pub fn scanned(&self) -> bool {
        self.scanned
    }

    /// Returns `true` when no child directory or file is mirrored.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.files.is_empty()
    }

    fn child_index(&self, name: &str) -> Result<usize, usize> {
        self.children
            .binary_search_by(|probe| natural_cmp(probe, name))
    }

    fn file_index(&self, name: &str) -> Option<usize> {
        self.files
            .binary_search_by(|probe| natural_cmp(probe.name(), name))
            .ok()
    }

    pub(crate) fn file_mut(&mut self, name: &str) -> Option<&mut FileEntry> {
        self.file_index(name).map(move |i| &mut self.files[i])
    }

    /// Inserts a child name at its sorted position and returns that position.
    pub(crate) fn insert_child(&mut self, name: &str) -> CoreResult<usize> {
        match self.child_index(name) {
            Ok(_) => Err(CoreError::NameCollision(self.path.join(name))),
            Err(index) => {
                self.children.insert(index, name.to_string());
                Ok(index)
            }
        }
    }

    pub(crate) fn remove_child(&mut self, name: &str) -> bool {
        match self.child_index(name) {
            Ok(index) => {
                self.children.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Inserts a file at its sorted position, taking ownership of it.
    pub(crate) fn insert_file(&mut self, mut file: FileEntry) -> Result<usize, FileEntry> {
        match self
            .files
            .binary_search_by(|probe| natural_cmp(probe.name(), file.name()))
        {
            Ok(_) => Err(file),
            Err(index) => {
                file.set_parent(&self.path);
                self.files.insert(index, file);
                Ok(index)
            }
        }
    }

    pub(crate) fn take_file(&mut self, name: &str) -> Option<FileEntry> {
        self.file_index(name).map(|i| self.files.remove(i))
    }

    /// Replaces the file list wholesale; `files` must already be sorted.
    pub(crate) fn replace_files(&mut self, files: Vec<FileEntry>) -> Vec<FileEntry> {
        std::mem::replace(&mut self.files, files)
    }

    pub(crate) fn take_children(&mut self) -> Vec<String> {
        std::mem::take(&mut self.children)
    }

    pub(crate) fn take_files(&mut self) -> Vec<FileEntry> {
        std::mem::take(&mut self.files)
    }

    pub(crate) fn set_handle(&mut self, handle: Handle) {
        self.handle = handle;
    }

    pub(crate) fn mark_scanned(&mut self) {
        self.scanned = true;
    }

    /// Moves this node to a new key, updating the file back-references.
    pub(crate) fn relocate(&mut self, parent: Option<&Path>, name: String, handle: Handle) {
        self.path = match parent {
            Some(p) => p.join(&name),
            None => PathBuf::from(&name),
        };
        self.parent = parent.map(Path::to_path_buf);
        self.name = name;
        self.handle = handle;
        for file in &mut self.files {
            file.set_parent(&self.path);
        }
    }

    /// Re-bases every file handle after the directory moved in storage.
    pub(crate) fn rebase_file_handles(&mut self, from: &Path, to: &Path) {
        for file in &mut self.files {
            let handle = file.handle().rebase(from, to);
            file.set_handle(handle);
        }
    }
}
