//! Identity-free structural copies of the tree.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Mirrored state of one file, without identity or cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    pub name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Mirrored state of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirSnapshot {
    pub scanned: bool,
    pub children: Vec<String>,
    pub files: Vec<FileSnapshot>,
}

/// Structural copy of a whole [`NodeStore`](crate::tree::NodeStore).
///
/// Two snapshots compare equal when the trees have the same shape and the
/// same file revisions, regardless of [`EntryId`](crate::tree::EntryId)s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub dirs: BTreeMap<PathBuf, DirSnapshot>,
}

impl Snapshot {
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn file_count(&self) -> usize {
        self.dirs.values().map(|d| d.files.len()).sum()
    }

    /// Pretty-printed JSON, for dumps and debugging.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Io(e.into()))
    }
}
