//! Arena of directory nodes keyed by path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::storage::Stat;
use crate::tree::node::{DirectoryNode, EntryId, FileEntry, Handle};
use crate::tree::snapshot::{DirSnapshot, FileSnapshot, Snapshot};

/// A borrowed node of either kind, as returned by [`NodeStore::resolve`].
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Directory(&'a DirectoryNode),
    File(&'a FileEntry),
}

/// Owns every mirrored directory.
///
/// Invariants maintained by all mutating methods:
/// - every non-root node's parent exists and lists it in `children`;
/// - a node's key equals `parent.join(name)`;
/// - an unscanned node has neither children nor files.
#[derive(Debug, Default)]
pub struct NodeStore {
    dirs: HashMap<PathBuf, DirectoryNode>,
    root: Option<PathBuf>,
    next_id: u64,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards everything and installs a fresh, unscanned root.
    pub fn set_root(&mut self, name: &str, handle: Handle) -> PathBuf {
        self.dirs.clear();
        let id = self.allocate_id();
        let node = DirectoryNode::new(id, None, name.to_string(), handle);
        let path = node.path().to_path_buf();
        self.dirs.insert(path.clone(), node);
        self.root = Some(path.clone());
        path
    }

    /// Drops every node, leaving the store as after [`NodeStore::new`].
    pub fn clear(&mut self) {
        self.dirs.clear();
        self.root = None;
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn root_node(&self) -> Option<&DirectoryNode> {
        self.root.as_ref().and_then(|r| self.dirs.get(r))
    }

    pub fn dir(&self, path: &Path) -> Option<&DirectoryNode> {
        self.dirs.get(path)
    }

    pub(crate) fn dir_mut(&mut self, path: &Path) -> Option<&mut DirectoryNode> {
        self.dirs.get_mut(path)
    }

    /// Like [`NodeStore::dir`] but reports a missing node as [`CoreError::NotFound`].
    pub fn require_dir(&self, path: &Path) -> CoreResult<&DirectoryNode> {
        self.dirs
            .get(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))
    }

    pub fn contains_dir(&self, path: &Path) -> bool {
        self.dirs.contains_key(path)
    }

    pub fn file(&self, path: &Path) -> Option<&FileEntry> {
        let (parent, name) = split(path)?;
        self.dirs.get(parent)?.file(name)
    }

    pub(crate) fn file_mut(&mut self, path: &Path) -> Option<&mut FileEntry> {
        let (parent, name) = split(path)?;
        self.dirs.get_mut(parent)?.file_mut(name)
    }

    /// Looks a path up as a directory first, then as a file.
    pub fn resolve(&self, path: &Path) -> Option<NodeRef<'_>> {
        if let Some(dir) = self.dirs.get(path) {
            return Some(NodeRef::Directory(dir));
        }
        self.file(path).map(NodeRef::File)
    }

    /// Number of mirrored directories, root included.
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    /// Number of mirrored files across all directories.
    pub fn file_count(&self) -> usize {
        self.dirs.values().map(|d| d.files().len()).sum()
    }

    pub(crate) fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Builds a fresh file entry for `parent` with a new identity.
    pub(crate) fn new_file(&mut self, parent: &Path, name: String, stat: &Stat, handle: Handle) -> FileEntry {
        let id = self.allocate_id();
        FileEntry::new(id, parent, name, stat, handle)
    }

    /// Creates an unscanned child directory under `parent` and returns its
    /// sorted position among the parent's children.
    pub(crate) fn attach_dir(&mut self, parent: &Path, name: &str, handle: Handle) -> CoreResult<usize> {
        let id = self.allocate_id();
        let parent_node = self
            .dirs
            .get_mut(parent)
            .ok_or_else(|| CoreError::NotFound(parent.to_path_buf()))?;
        let index = parent_node.insert_child(name)?;
        let node = DirectoryNode::new(id, Some(parent), name.to_string(), handle);
        self.dirs.insert(node.path().to_path_buf(), node);
        Ok(index)
    }

    /// Unlinks a directory and takes its subtree out of the arena intact,
    /// children and files included.
    pub(crate) fn park_dir(&mut self, path: &Path) -> CoreResult<ParkedSubtree> {
        let node = self
            .dirs
            .get(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?;
        let parent = node
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| CoreError::InvalidTarget(path.to_path_buf()))?;
        let location = node.handle().location().to_path_buf();
        if let Some((_, name)) = split(path) {
            if let Some(parent_node) = self.dirs.get_mut(&parent) {
                parent_node.remove_child(name);
            }
        }
        let nodes = self
            .subtree(path)
            .into_iter()
            .filter_map(|key| self.dirs.remove(&key))
            .collect();
        Ok(ParkedSubtree {
            path: path.to_path_buf(),
            location,
            nodes,
        })
    }

    /// Puts a parked subtree back under its original key, re-basing every
    /// handle onto `location`. On failure the subtree is handed back.
    pub(crate) fn unpark_dir(
        &mut self,
        parked: ParkedSubtree,
        location: &Path,
    ) -> Result<usize, (CoreError, ParkedSubtree)> {
        let Some((parent, name)) = split(&parked.path) else {
            let err = CoreError::InvalidTarget(parked.path.clone());
            return Err((err, parked));
        };
        let index = match self.dirs.get_mut(parent) {
            Some(parent_node) if parent_node.scanned() => match parent_node.insert_child(name) {
                Ok(index) => index,
                Err(err) => return Err((err, parked)),
            },
            _ => {
                let err = CoreError::ResourceVanished(parent.to_path_buf());
                return Err((err, parked));
            }
        };
        let ParkedSubtree {
            location: old_location,
            nodes,
            ..
        } = parked;
        for mut node in nodes {
            let handle = node.handle().rebase(&old_location, location);
            node.set_handle(handle);
            node.rebase_file_handles(&old_location, location);
            self.dirs.insert(node.path().to_path_buf(), node);
        }
        Ok(index)
    }

    /// Unlinks a directory from its parent and drops its whole subtree.
    ///
    /// Returns the detached node itself (emptied of children and files) and
    /// the number of directories released, the node included.
    pub(crate) fn detach_dir(&mut self, path: &Path) -> CoreResult<(DirectoryNode, usize)> {
        let parent = self
            .dirs
            .get(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| CoreError::InvalidTarget(path.to_path_buf()))?;
        if let Some((_, name)) = split(path) {
            if let Some(parent_node) = self.dirs.get_mut(&parent) {
                parent_node.remove_child(name);
            }
        }
        let released = self.subtree(path);
        let count = released.len();
        let mut detached = None;
        for key in released {
            if let Some(mut node) = self.dirs.remove(&key) {
                if key == path {
                    node.take_children();
                    node.take_files();
                    detached = Some(node);
                }
            }
        }
        let node = detached.ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?;
        Ok((node, count))
    }

    /// Re-keys a directory subtree after storage moved it from
    /// `old_location` to `new_location`.
    ///
    /// On success the node lives at `new_parent/new_name` with every
    /// descendant and file handle re-based. Fails without touching the
    /// store if `new_parent` is missing or unscanned, or if the name is
    /// already taken there.
    pub(crate) fn relocate_dir(
        &mut self,
        path: &Path,
        new_parent: &Path,
        new_name: &str,
        new_location: &Path,
    ) -> CoreResult<PathBuf> {
        let node = self
            .dirs
            .get(path)
            .ok_or_else(|| CoreError::NotFound(path.to_path_buf()))?;
        let old_parent = node
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| CoreError::InvalidTarget(path.to_path_buf()))?;
        let old_location = node.handle().location().to_path_buf();
        let target = self
            .dirs
            .get(new_parent)
            .ok_or_else(|| CoreError::NotFound(new_parent.to_path_buf()))?;
        if !target.scanned() {
            return Err(CoreError::InvalidTarget(new_parent.to_path_buf()));
        }
        let same_parent = new_parent == old_parent.as_path();
        let old_name = split(path).map(|(_, n)| n.to_string()).unwrap_or_default();
        if target.has_child(new_name) && !(same_parent && old_name == new_name) {
            return Err(CoreError::NameCollision(new_parent.join(new_name)));
        }
        if new_parent.starts_with(path) {
            return Err(CoreError::InvalidTarget(new_parent.to_path_buf()));
        }

        if let Some(parent_node) = self.dirs.get_mut(&old_parent) {
            parent_node.remove_child(&old_name);
        }
        if let Some(parent_node) = self.dirs.get_mut(new_parent) {
            parent_node.insert_child(new_name)?;
        }

        let new_path = new_parent.join(new_name);
        for key in self.subtree(path) {
            let Some(mut node) = self.dirs.remove(&key) else {
                continue;
            };
            let rest = key.strip_prefix(path).unwrap_or(Path::new(""));
            let (parent, name) = if rest.as_os_str().is_empty() {
                (new_parent.to_path_buf(), new_name.to_string())
            } else {
                let moved = new_path.join(rest);
                let parent = moved.parent().map(Path::to_path_buf).unwrap_or_default();
                (parent, node.name().to_string())
            };
            let handle = node.handle().rebase(&old_location, new_location);
            node.relocate(Some(&parent), name, handle);
            node.rebase_file_handles(&old_location, new_location);
            self.dirs.insert(node.path().to_path_buf(), node);
        }
        Ok(new_path)
    }

    /// Paths of `path` and all its descendants, parents before children.
    pub fn subtree(&self, path: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![path.to_path_buf()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.dirs.get(&current) else {
                continue;
            };
            for child in node.children().iter().rev() {
                stack.push(current.join(child));
            }
            out.push(current);
        }
        out
    }

    /// Every mirrored file, directories visited depth-first in natural order.
    pub fn all_files(&self) -> Vec<&FileEntry> {
        let Some(root) = self.root.as_deref() else {
            return Vec::new();
        };
        self.subtree(root)
            .iter()
            .filter_map(|p| self.dirs.get(p))
            .flat_map(|d| d.files().iter())
            .collect()
    }

    /// Identity-free structural copy of the whole tree.
    pub fn snapshot(&self) -> Snapshot {
        let dirs = self
            .dirs
            .values()
            .map(|node| {
                (
                    node.path().to_path_buf(),
                    DirSnapshot {
                        scanned: node.scanned(),
                        children: node.children().to_vec(),
                        files: node
                            .files()
                            .iter()
                            .map(|f| FileSnapshot {
                                name: f.name().to_string(),
                                size: f.size(),
                                modified: f.modified(),
                            })
                            .collect(),
                    },
                )
            })
            .collect();
        Snapshot { dirs }
    }
}

/// A directory subtree taken out of the store by [`NodeStore::park_dir`].
#[derive(Debug)]
pub(crate) struct ParkedSubtree {
    path: PathBuf,
    location: PathBuf,
    nodes: Vec<DirectoryNode>,
}

impl ParkedSubtree {
    /// Key the subtree was parked from.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// Splits a key into parent key and final component.
fn split(path: &Path) -> Option<(&Path, &str)> {
    let parent = path.parent()?;
    let name = path.file_name()?.to_str()?;
    Some((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::EntryKind;

    fn stat() -> Stat {
        Stat {
            kind: EntryKind::File,
            size: 3,
            modified: None,
        }
    }

    /// root/{a/{x.jpg, deep/}, b/}, every directory scanned.
    fn sample() -> NodeStore {
        let mut store = NodeStore::new();
        let root = store.set_root("root", Handle::new("/r"));
        store.dir_mut(&root).unwrap().mark_scanned();
        store.attach_dir(&root, "b", Handle::new("/r/b")).unwrap();
        store.attach_dir(&root, "a", Handle::new("/r/a")).unwrap();
        let a = root.join("a");
        store.attach_dir(&a, "deep", Handle::new("/r/a/deep")).unwrap();
        let file = store.new_file(&a, "x.jpg".into(), &stat(), Handle::new("/r/a/x.jpg"));
        let dir = store.dir_mut(&a).unwrap();
        dir.mark_scanned();
        dir.insert_file(file).unwrap();
        store.dir_mut(&root.join("b")).unwrap().mark_scanned();
        store.dir_mut(&a.join("deep")).unwrap().mark_scanned();
        store
    }

    #[test]
    fn attach_keeps_children_sorted() {
        let store = sample();
        assert_eq!(store.root_node().unwrap().children(), ["a", "b"]);
        assert_eq!(store.dir_count(), 4);
        assert_eq!(store.file_count(), 1);
    }

    #[test]
    fn resolve_finds_dirs_and_files() {
        let store = sample();
        assert!(matches!(
            store.resolve(Path::new("root/a")),
            Some(NodeRef::Directory(_))
        ));
        assert!(matches!(
            store.resolve(Path::new("root/a/x.jpg")),
            Some(NodeRef::File(f)) if f.name() == "x.jpg"
        ));
        assert!(store.resolve(Path::new("root/zzz")).is_none());
    }

    #[test]
    fn detach_releases_whole_subtree() {
        let mut store = sample();
        let (node, released) = store.detach_dir(Path::new("root/a")).unwrap();

        assert_eq!(released, 2);
        assert_eq!(node.name(), "a");
        assert!(node.is_empty());
        assert!(!store.contains_dir(Path::new("root/a/deep")));
        assert_eq!(store.root_node().unwrap().children(), ["b"]);
    }

    #[test]
    fn park_and_unpark_restore_the_subtree() {
        let mut store = sample();
        let before = store.snapshot();
        let deep_id = store.dir(Path::new("root/a/deep")).unwrap().id();

        let parked = store.park_dir(Path::new("root/a")).unwrap();
        assert_eq!(parked.path(), Path::new("root/a"));
        assert!(!store.contains_dir(Path::new("root/a/deep")));
        assert_eq!(store.root_node().unwrap().children(), ["b"]);

        let index = store.unpark_dir(parked, Path::new("/r/.a")).unwrap();

        assert_eq!(index, 0);
        assert_eq!(store.snapshot(), before);
        let deep = store.dir(Path::new("root/a/deep")).unwrap();
        assert_eq!(deep.id(), deep_id);
        assert_eq!(deep.handle().location(), Path::new("/r/.a/deep"));
        let file = store.file(Path::new("root/a/x.jpg")).unwrap();
        assert_eq!(file.handle().location(), Path::new("/r/.a/x.jpg"));
    }

    #[test]
    fn unpark_into_a_taken_name_hands_the_subtree_back() {
        let mut store = sample();
        let parked = store.park_dir(Path::new("root/b")).unwrap();
        store.attach_dir(Path::new("root"), "b", Handle::new("/r/b")).unwrap();

        let (err, parked) = store.unpark_dir(parked, Path::new("/r/b")).unwrap_err();

        assert!(matches!(err, CoreError::NameCollision(_)));
        assert_eq!(parked.path(), Path::new("root/b"));
    }

    #[test]
    fn detach_root_is_rejected() {
        let mut store = sample();
        assert!(matches!(
            store.detach_dir(Path::new("root")),
            Err(CoreError::InvalidTarget(_))
        ));
    }

    #[test]
    fn relocate_moves_subtree_and_rebases_handles() {
        let mut store = sample();
        let deep_id = store.dir(Path::new("root/a/deep")).unwrap().id();

        let new_path = store
            .relocate_dir(Path::new("root/a"), Path::new("root/b"), "a2", Path::new("/r/b/a2"))
            .unwrap();

        assert_eq!(new_path, PathBuf::from("root/b/a2"));
        assert!(!store.contains_dir(Path::new("root/a")));
        let deep = store.dir(Path::new("root/b/a2/deep")).unwrap();
        assert_eq!(deep.id(), deep_id);
        assert_eq!(deep.handle().location(), Path::new("/r/b/a2/deep"));
        assert_eq!(deep.parent(), Some(Path::new("root/b/a2")));
        let file = store.file(Path::new("root/b/a2/x.jpg")).unwrap();
        assert_eq!(file.handle().location(), Path::new("/r/b/a2/x.jpg"));
        assert_eq!(store.root_node().unwrap().children(), ["b"]);
        assert_eq!(store.dir(Path::new("root/b")).unwrap().children(), ["a2"]);
    }

    #[test]
    fn relocate_into_own_subtree_is_rejected() {
        let mut store = sample();
        let before = store.snapshot();
        let result = store.relocate_dir(
            Path::new("root/a"),
            Path::new("root/a/deep"),
            "a",
            Path::new("/r/a/deep/a"),
        );
        assert!(matches!(result, Err(CoreError::InvalidTarget(_))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn relocate_onto_existing_name_collides() {
        let mut store = sample();
        let result =
            store.relocate_dir(Path::new("root/a"), Path::new("root"), "b", Path::new("/r/b"));
        assert!(matches!(result, Err(CoreError::NameCollision(_))));
    }

    #[test]
    fn subtree_is_parent_first_in_natural_order() {
        let store = sample();
        assert_eq!(
            store.subtree(Path::new("root")),
            vec![
                PathBuf::from("root"),
                PathBuf::from("root/a"),
                PathBuf::from("root/a/deep"),
                PathBuf::from("root/b"),
            ]
        );
    }

    #[test]
    fn all_files_walks_the_tree() {
        let store = sample();
        let names: Vec<PathBuf> = store.all_files().iter().map(|f| f.path()).collect();
        assert_eq!(names, vec![PathBuf::from("root/a/x.jpg")]);
    }
}
