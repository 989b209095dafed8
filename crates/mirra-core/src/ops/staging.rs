//! The hidden staging area soft-deleted entries are moved into.

use std::path::{Component, Path, PathBuf};

use crate::config::settings::StagingConfig;
use crate::error::CoreResult;
use crate::fs::storage::Storage;

/// Upper bound on suffix probing before giving up on a free name.
const MAX_SUFFIX: usize = 10_000;

/// Staging root directly under the tree root, mirroring the relative
/// directory of every staged entry.
#[derive(Debug, Clone)]
pub struct Staging {
    dir_name: String,
}

impl Staging {
    pub fn new(dir_name: impl Into<String>) -> Self {
        Self {
            dir_name: dir_name.into(),
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(config.dir_name.clone())
    }

    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Creates `<root>/<staging>/<relative>` one level at a time and
    /// returns its location.
    pub fn prepare(&self, storage: &dyn Storage, root: &Path, relative: &Path) -> CoreResult<PathBuf> {
        let mut location = storage.create_dir(root, &self.dir_name)?;
        for component in relative.components() {
            if let Component::Normal(name) = component {
                location = storage.create_dir(&location, &name.to_string_lossy())?;
            }
        }
        Ok(location)
    }

    /// First name in `name`, `stem_1.ext`, `stem_2.ext`, ... not yet taken
    /// inside `dir`.
    pub fn free_name(&self, storage: &dyn Storage, dir: &Path, name: &str) -> String {
        if !storage.exists(&dir.join(name)) {
            return name.to_string();
        }
        (1..MAX_SUFFIX)
            .map(|n| suffixed(name, n))
            .find(|candidate| !storage.exists(&dir.join(candidate)))
            .unwrap_or_else(|| suffixed(name, MAX_SUFFIX))
    }

    /// Permanently removes the staging root. Returns `false` if there was
    /// nothing to remove.
    pub fn purge(&self, storage: &dyn Storage, root: &Path) -> CoreResult<bool> {
        let location = root.join(&self.dir_name);
        if !storage.exists(&location) {
            return Ok(false);
        }
        storage.remove(&location)?;
        Ok(true)
    }
}

impl Default for Staging {
    fn default() -> Self {
        Self::new(".trash")
    }
}

/// `photo.jpg` becomes `photo_<n>.jpg`; names without an extension get
/// the suffix appended.
pub fn suffixed(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{name}_{n}"),
    }
}
