//! In-memory [`Storage`] with fault injection.
//!
//! Used by tests and by embedders that want to drive the engine without a
//! disk. Modification times come from a logical clock so that every write
//! produces a distinct, deterministic timestamp.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::error::{CoreError, CoreResult};
use crate::fs::storage::{is_valid_filename, EntryKind, ListedEntry, Stat, Storage};

#[derive(Debug, Clone)]
enum MemNode {
    Dir,
    File { data: Vec<u8>, modified: SystemTime },
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, MemNode>,
    denied: HashSet<PathBuf>,
    broken_probes: HashSet<PathBuf>,
    list_calls: HashMap<PathBuf, usize>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.get(path), Some(MemNode::Dir))
    }

    /// Re-keys `from` and everything below it to `to`.
    fn relocate(&mut self, from: &Path, to: &Path) {
        let moved: Vec<PathBuf> = self
            .nodes
            .keys()
            .filter(|k| k.starts_with(from))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = self.nodes.remove(&key) {
                let rest = key.strip_prefix(from).unwrap_or(Path::new(""));
                let new_key = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
                self.nodes.insert(new_key, node);
            }
        }
    }

    fn remove_subtree(&mut self, path: &Path) {
        self.nodes.retain(|k, _| !k.starts_with(path));
    }
}

/// A thread-safe in-memory directory tree.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    /// Creates a store containing only the directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut state = State::default();
        state.nodes.insert(root.into(), MemNode::Dir);
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a directory and any missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.lock();
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert(MemNode::Dir);
        }
    }

    /// Creates or overwrites a file, bumping its modification time.
    pub fn write(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let mut state = self.lock();
        let modified = state.tick();
        state.nodes.insert(
            path.to_path_buf(),
            MemNode::File {
                data: data.into(),
                modified,
            },
        );
    }

    /// Removes an entry and its subtree, as another process would.
    pub fn delete(&self, path: impl AsRef<Path>) {
        self.lock().remove_subtree(path.as_ref());
    }

    /// Makes `list` on `dir` fail with `PermissionDenied`.
    pub fn deny(&self, dir: impl Into<PathBuf>) {
        self.lock().denied.insert(dir.into());
    }

    /// Makes `stat` on `path` fail as if the entry vanished right after
    /// being listed.
    pub fn break_probe(&self, path: impl Into<PathBuf>) {
        self.lock().broken_probes.insert(path.into());
    }

    /// Number of `list` calls made against `dir`.
    pub fn list_calls(&self, dir: impl AsRef<Path>) -> usize {
        self.lock()
            .list_calls
            .get(dir.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Total number of `list` calls against any directory.
    pub fn total_list_calls(&self) -> usize {
        self.lock().list_calls.values().sum()
    }

    /// Returns the contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().nodes.get(path.as_ref()) {
            Some(MemNode::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }
}

impl Storage for MemoryStorage {
    fn list(&self, dir: &Path) -> CoreResult<Vec<ListedEntry>> {
        let mut state = self.lock();
        *state.list_calls.entry(dir.to_path_buf()).or_default() += 1;
        if state.denied.contains(dir) {
            return Err(CoreError::PermissionDenied(dir.to_path_buf()));
        }
        if !state.is_dir(dir) {
            return Err(CoreError::ResourceVanished(dir.to_path_buf()));
        }

        Ok(state
            .nodes
            .iter()
            .filter(|(k, _)| k.parent() == Some(dir))
            .map(|(k, node)| ListedEntry {
                name: k
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                kind: match node {
                    MemNode::Dir => EntryKind::Directory,
                    MemNode::File { .. } => EntryKind::File,
                },
                location: k.clone(),
            })
            .collect())
    }

    fn stat(&self, location: &Path) -> CoreResult<Stat> {
        let state = self.lock();
        if state.broken_probes.contains(location) {
            return Err(CoreError::ResourceVanished(location.to_path_buf()));
        }
        match state.nodes.get(location) {
            Some(MemNode::Dir) => Ok(Stat {
                kind: EntryKind::Directory,
                size: 0,
                modified: None,
            }),
            Some(MemNode::File { data, modified }) => Ok(Stat {
                kind: EntryKind::File,
                size: data.len() as u64,
                modified: Some(*modified),
            }),
            None => Err(CoreError::ResourceVanished(location.to_path_buf())),
        }
    }

    fn read(&self, location: &Path, limit: u64) -> CoreResult<Vec<u8>> {
        match self.lock().nodes.get(location) {
            Some(MemNode::File { data, .. }) => {
                let end = data.len().min(usize::try_from(limit).unwrap_or(usize::MAX));
                Ok(data[..end].to_vec())
            }
            Some(MemNode::Dir) => Err(CoreError::InvalidTarget(location.to_path_buf())),
            None => Err(CoreError::ResourceVanished(location.to_path_buf())),
        }
    }

    fn rename(&self, location: &Path, new_name: &str) -> CoreResult<PathBuf> {
        let parent = location
            .parent()
            .ok_or_else(|| CoreError::InvalidTarget(location.to_path_buf()))?;
        self.move_to(location, parent, new_name)
    }

    fn move_to(&self, location: &Path, dest_dir: &Path, name: &str) -> CoreResult<PathBuf> {
        if !is_valid_filename(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        let mut state = self.lock();
        if !state.nodes.contains_key(location) {
            return Err(CoreError::ResourceVanished(location.to_path_buf()));
        }
        if !state.is_dir(dest_dir) {
            return Err(CoreError::ResourceVanished(dest_dir.to_path_buf()));
        }
        let dest = dest_dir.join(name);
        if dest == location {
            return Ok(dest);
        }
        if dest.starts_with(location) {
            return Err(CoreError::InvalidTarget(dest));
        }
        if state.nodes.contains_key(&dest) {
            return Err(CoreError::NameCollision(dest));
        }
        state.relocate(location, &dest);
        Ok(dest)
    }

    fn remove(&self, location: &Path) -> CoreResult<()> {
        let mut state = self.lock();
        if !state.nodes.contains_key(location) {
            return Err(CoreError::ResourceVanished(location.to_path_buf()));
        }
        state.remove_subtree(location);
        Ok(())
    }

    fn create_dir(&self, parent: &Path, name: &str) -> CoreResult<PathBuf> {
        if !is_valid_filename(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        let mut state = self.lock();
        if !state.is_dir(parent) {
            return Err(CoreError::ResourceVanished(parent.to_path_buf()));
        }
        let location = parent.join(name);
        match state.nodes.get(&location) {
            Some(MemNode::Dir) => Ok(location),
            Some(MemNode::File { .. }) => Err(CoreError::NameCollision(location)),
            None => {
                state.nodes.insert(location.clone(), MemNode::Dir);
                Ok(location)
            }
        }
    }

    fn exists(&self, location: &Path) -> bool {
        self.lock().nodes.contains_key(location)
    }
}
