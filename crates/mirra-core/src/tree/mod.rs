//! The in-memory mirror of the directory tree.
//!
//! [`NodeStore`] is an arena of [`DirectoryNode`]s keyed by path. Each
//! directory exclusively owns its [`FileEntry`] values and lists its child
//! directories by name; parents are referenced by path key only.

pub mod node;
pub mod order;
pub mod snapshot;
pub mod store;
pub mod view;

pub use node::{DirectoryNode, EntryId, FileEntry, Handle};
pub use order::natural_cmp;
pub use snapshot::{DirSnapshot, FileSnapshot, Snapshot};
pub use store::{NodeRef, NodeStore};
pub use view::View;
