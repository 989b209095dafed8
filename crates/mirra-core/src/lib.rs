//! Mirra core library: a live in-memory mirror of a media directory tree.
//!
//! `mirra-core` keeps a tree of directories and media files in step with
//! storage, performs reversible delete/rename/move operations and recovers
//! when handles go stale underneath it. It has no UI of its own; front ends
//! drive an [`Engine`] and follow its [`Event`]s.
//!
//! # Modules
//!
//! - [`engine`] — [`Engine`], the single owner of the tree and its components.
//! - [`tree`] — Arena node store, natural ordering, snapshots and views.
//! - [`sync`] — Scanner, tree synchronizer, recovery and background scheduling.
//! - [`ops`] — Reversible operations, the staging area and the undo log.
//! - [`fs`] — The [`Storage`] capability, media filtering and content hashing.
//! - [`config`] — TOML-based engine settings.
//! - [`event`] — Notifications for presentation layers.
//! - [`error`] — Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fs;
pub mod ops;
pub mod sync;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use config::settings::Config;
pub use engine::{Engine, Opened};
pub use error::{CoreError, CoreResult};
pub use event::{ChildSummary, Event, EventSink};
pub use fs::{
    ContentAddress, ContentHasher, EntryKind, LocalStorage, MediaFilter, MediaKind, MemoryStorage,
    PrefixSha256, Storage,
};
pub use ops::{Operation, OperationLog, Staging};
pub use sync::{Recovery, ScanDiff, Scanner, Step};
pub use tree::{natural_cmp, DirectoryNode, EntryId, FileEntry, NodeStore, Snapshot, View};

/// Normalises a string to NFC (composed) form.
///
/// Some filesystems hand back names in decomposed form; path keys and
/// display names are always composed so lookups and ordering agree.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}
