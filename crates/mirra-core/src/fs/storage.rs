//! The resource capability the engine is built on, and its local-disk
//! implementation.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{CoreError, CoreResult};

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// One child reported by [`Storage::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    /// Display name, NFC-normalised.
    pub name: String,
    pub kind: EntryKind,
    /// Location to use for every further call on this entry.
    pub location: PathBuf,
}

/// Result of the per-entry validity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    /// Always `0` for directories.
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Capability set over some backing store.
///
/// Locations are opaque to the engine: they are only ever obtained from
/// [`Storage::list`], [`Storage::rename`], [`Storage::move_to`] or the
/// root passed to the engine. Any method may fail with
/// [`CoreError::ResourceVanished`] when a location went away out-of-band.
pub trait Storage: Send + Sync {
    /// Enumerates the immediate children of the directory at `dir`.
    fn list(&self, dir: &Path) -> CoreResult<Vec<ListedEntry>>;

    /// Cheap metadata probe.
    fn stat(&self, location: &Path) -> CoreResult<Stat>;

    /// Reads at most `limit` bytes from the start of a file.
    fn read(&self, location: &Path, limit: u64) -> CoreResult<Vec<u8>>;

    /// Renames an entry within its directory and returns its new location.
    fn rename(&self, location: &Path, new_name: &str) -> CoreResult<PathBuf>;

    /// Moves an entry into `dest_dir` under `name` and returns its new location.
    fn move_to(&self, location: &Path, dest_dir: &Path, name: &str) -> CoreResult<PathBuf>;

    /// Removes an entry; directories are removed recursively.
    fn remove(&self, location: &Path) -> CoreResult<()>;

    /// Creates `name` under `parent` (and nothing else) if it does not
    /// exist yet, returning its location.
    fn create_dir(&self, parent: &Path, name: &str) -> CoreResult<PathBuf>;

    /// Returns `true` if something exists at `location`.
    fn exists(&self, location: &Path) -> bool;

    /// Returns `true` if `dir` is still a usable directory.
    fn validate(&self, dir: &Path) -> bool {
        matches!(self.stat(dir), Ok(stat) if stat.kind == EntryKind::Directory)
    }
}

/// [`Storage`] over the local filesystem via `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    fn list(&self, dir: &Path) -> CoreResult<Vec<ListedEntry>> {
        let read_dir = std::fs::read_dir(dir).map_err(|e| CoreError::from_io(e, dir))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry in {}: {e}", dir.display());
                    continue;
                }
            };
            let location = dir_entry.path();
            // Follow symlinks so linked media and folders are mirrored.
            let metadata = match std::fs::metadata(&location) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(ListedEntry {
                name: dir_entry.file_name().to_string_lossy().into_owned(),
                kind,
                location,
            });
        }

        Ok(entries)
    }

    fn stat(&self, location: &Path) -> CoreResult<Stat> {
        let metadata = std::fs::metadata(location).map_err(|e| CoreError::from_io(e, location))?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(Stat {
            kind,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().ok(),
        })
    }

    fn read(&self, location: &Path, limit: u64) -> CoreResult<Vec<u8>> {
        let file = std::fs::File::open(location).map_err(|e| CoreError::from_io(e, location))?;
        let mut buf = Vec::new();
        file.take(limit).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn rename(&self, location: &Path, new_name: &str) -> CoreResult<PathBuf> {
        if !is_valid_filename(new_name) {
            return Err(CoreError::InvalidName(new_name.to_string()));
        }
        let parent = location
            .parent()
            .ok_or_else(|| CoreError::InvalidTarget(location.to_path_buf()))?;
        let new_location = parent.join(new_name);
        if new_location == location {
            return Ok(new_location);
        }
        // std::fs::rename silently replaces files on unix.
        if std::fs::symlink_metadata(&new_location).is_ok() {
            return Err(CoreError::NameCollision(new_location));
        }
        std::fs::rename(location, &new_location).map_err(|e| CoreError::from_io(e, location))?;
        Ok(new_location)
    }

    fn move_to(&self, location: &Path, dest_dir: &Path, name: &str) -> CoreResult<PathBuf> {
        if !is_valid_filename(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        if std::fs::symlink_metadata(location).is_err() {
            return Err(CoreError::ResourceVanished(location.to_path_buf()));
        }
        if !dest_dir.is_dir() {
            return Err(CoreError::ResourceVanished(dest_dir.to_path_buf()));
        }
        let dest = dest_dir.join(name);
        if std::fs::symlink_metadata(&dest).is_ok() {
            return Err(CoreError::NameCollision(dest));
        }

        match std::fs::rename(location, &dest) {
            Ok(()) => Ok(dest),
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                if let Err(err) = copy_recursive(location, &dest, 0) {
                    // Never leave a partial copy next to an intact source.
                    if std::fs::symlink_metadata(&dest).is_ok() {
                        if let Err(cleanup) = self.remove(&dest) {
                            tracing::warn!("could not clean up {}: {cleanup}", dest.display());
                        }
                    }
                    return Err(err);
                }
                self.remove(location)?;
                Ok(dest)
            }
            Err(e) => Err(CoreError::from_io(e, location)),
        }
    }

    fn remove(&self, location: &Path) -> CoreResult<()> {
        // symlink_metadata: never follow a link into its target when deleting.
        let meta =
            std::fs::symlink_metadata(location).map_err(|e| CoreError::from_io(e, location))?;
        if meta.is_dir() {
            std::fs::remove_dir_all(location).map_err(|e| CoreError::from_io(e, location))?;
        } else {
            std::fs::remove_file(location).map_err(|e| CoreError::from_io(e, location))?;
        }
        Ok(())
    }

    fn create_dir(&self, parent: &Path, name: &str) -> CoreResult<PathBuf> {
        if !is_valid_filename(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        let location = parent.join(name);
        match std::fs::create_dir(&location) {
            Ok(()) => Ok(location),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && location.is_dir() => {
                Ok(location)
            }
            Err(e) => Err(CoreError::from_io(e, &location)),
        }
    }

    fn exists(&self, location: &Path) -> bool {
        std::fs::symlink_metadata(location).is_ok()
    }
}

/// Maximum recursion depth for `copy_recursive` to prevent symlink loops.
const MAX_COPY_DEPTH: usize = 64;

fn copy_recursive(src: &Path, dest: &Path, depth: usize) -> CoreResult<()> {
    if depth > MAX_COPY_DEPTH {
        return Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("maximum recursion depth ({MAX_COPY_DEPTH}) exceeded during copy"),
        )));
    }

    let meta = std::fs::symlink_metadata(src).map_err(|e| CoreError::from_io(e, src))?;
    if !meta.is_dir() {
        std::fs::copy(src, dest).map_err(|e| CoreError::from_io(e, src))?;
        return Ok(());
    }

    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        copy_recursive(&entry.path(), &dest.join(entry.file_name()), depth + 1)?;
    }
    Ok(())
}

/// Returns `true` for a single, non-special path component.
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\0') {
        return false;
    }
    #[cfg(windows)]
    if name.contains('\\') || name.contains(':') {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn list_reports_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpg"), "aa").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let mut entries = LocalStorage.list(tmp.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.jpg");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].location, tmp.path().join("a.jpg"));
        assert_eq!(entries[1].name, "sub");
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn list_missing_directory_is_vanished() {
        let tmp = TempDir::new().unwrap();
        let result = LocalStorage.list(&tmp.path().join("gone"));
        assert!(matches!(result, Err(CoreError::ResourceVanished(_))));
    }

    #[test]
    fn stat_reports_size_and_time() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, "12345").unwrap();

        let stat = LocalStorage.stat(&path).unwrap();

        assert_eq!(stat.kind, EntryKind::File);
        assert_eq!(stat.size, 5);
        assert!(stat.modified.is_some());
    }

    #[test]
    fn read_honours_limit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, "abcdef").unwrap();

        assert_eq!(LocalStorage.read(&path, 3).unwrap(), b"abc");
        assert_eq!(LocalStorage.read(&path, 100).unwrap(), b"abcdef");
    }

    #[test]
    fn rename_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpg"), "a").unwrap();
        fs::write(tmp.path().join("b.jpg"), "b").unwrap();

        let result = LocalStorage.rename(&tmp.path().join("a.jpg"), "b.jpg");

        assert!(matches!(result, Err(CoreError::NameCollision(_))));
        assert_eq!(fs::read_to_string(tmp.path().join("b.jpg")).unwrap(), "b");
    }

    #[test]
    fn rename_returns_new_location() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpg"), "a").unwrap();

        let moved = LocalStorage
            .rename(&tmp.path().join("a.jpg"), "c.jpg")
            .unwrap();

        assert_eq!(moved, tmp.path().join("c.jpg"));
        assert!(moved.exists());
        assert!(!tmp.path().join("a.jpg").exists());
    }

    #[test]
    fn rename_rejects_invalid_names() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpg"), "a").unwrap();

        for bad in ["", ".", "..", "x/y"] {
            let result = LocalStorage.rename(&tmp.path().join("a.jpg"), bad);
            assert!(matches!(result, Err(CoreError::InvalidName(_))), "{bad:?}");
        }
    }

    #[test]
    fn move_to_moves_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src").join("a.jpg"), "a").unwrap();
        fs::create_dir(tmp.path().join("dest")).unwrap();

        let moved = LocalStorage
            .move_to(&tmp.path().join("src"), &tmp.path().join("dest"), "src")
            .unwrap();

        assert_eq!(moved, tmp.path().join("dest").join("src"));
        assert!(moved.join("a.jpg").exists());
        assert!(!tmp.path().join("src").exists());
    }

    #[test]
    fn failed_move_leaves_source_alone() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.jpg"), "a").unwrap();

        let result = LocalStorage.move_to(&src, &src, "inner");

        assert!(result.is_err());
        assert!(src.join("a.jpg").exists());
        assert!(!src.join("inner").exists());
    }

    #[test]
    fn listed_names_are_left_as_stored() {
        let tmp = TempDir::new().unwrap();
        let decomposed = "Cafe\u{301}.jpg";
        fs::write(tmp.path().join(decomposed), "c").unwrap();

        let entries = LocalStorage.list(tmp.path()).unwrap();

        assert_eq!(entries[0].name, decomposed);
    }

    #[test]
    fn move_to_missing_source_is_vanished() {
        let tmp = TempDir::new().unwrap();
        let result = LocalStorage.move_to(&tmp.path().join("nope.jpg"), tmp.path(), "x.jpg");
        assert!(matches!(result, Err(CoreError::ResourceVanished(_))));
    }

    #[test]
    fn remove_deletes_recursively() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("a.jpg"), "").unwrap();

        LocalStorage.remove(&dir).unwrap();

        assert!(!dir.exists());
    }

    #[test]
    fn create_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let first = LocalStorage.create_dir(tmp.path(), ".trash").unwrap();
        let second = LocalStorage.create_dir(tmp.path(), ".trash").unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn validate_distinguishes_directories() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpg"), "").unwrap();

        assert!(LocalStorage.validate(tmp.path()));
        assert!(!LocalStorage.validate(&tmp.path().join("a.jpg")));
        assert!(!LocalStorage.validate(&tmp.path().join("missing")));
    }

    #[test]
    fn valid_filename_rules() {
        assert!(is_valid_filename("a.jpg"));
        assert!(is_valid_filename(".trash"));
        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename(".."));
        assert!(!is_valid_filename("a\0b"));
    }
}
