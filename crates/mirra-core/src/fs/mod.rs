//! Storage abstractions for Mirra.
//!
//! The engine never touches the filesystem directly. Everything goes
//! through the [`storage::Storage`] capability, implemented here for the
//! local disk ([`storage::LocalStorage`]) and for an in-memory tree
//! ([`memory::MemoryStorage`]). [`media`] decides which entries are
//! mirrored and [`hash`] computes content addresses.

pub mod hash;
pub mod media;
pub mod memory;
pub mod storage;

pub use hash::{ContentAddress, ContentHasher, PrefixSha256};
pub use media::{MediaFilter, MediaKind};
pub use memory::MemoryStorage;
pub use storage::{EntryKind, ListedEntry, LocalStorage, Stat, Storage};
