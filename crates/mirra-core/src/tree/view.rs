//! Read-only views over the tree.

use std::path::PathBuf;

use crate::error::CoreResult;
use crate::tree::node::FileEntry;
use crate::tree::store::NodeStore;

/// What a presentation layer is currently showing.
///
/// `AllMedia` is a virtual aggregate: it owns nothing and composes over
/// the files of every real directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Directory(PathBuf),
    AllMedia,
}

impl View {
    /// Files visible in this view. For `AllMedia`, directories are visited
    /// depth-first in natural order.
    pub fn files<'a>(&self, store: &'a NodeStore) -> CoreResult<Vec<&'a FileEntry>> {
        match self {
            Self::Directory(path) => Ok(store.require_dir(path)?.files().iter().collect()),
            Self::AllMedia => Ok(store.all_files()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Directory(path) => path.display().to_string(),
            Self::AllMedia => "All media".to_string(),
        }
    }
}
