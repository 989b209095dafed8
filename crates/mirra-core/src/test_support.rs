//! Fixtures shared by unit tests.

use std::path::{Path, PathBuf};

use crate::event::Event;
use crate::fs::MemoryStorage;
use crate::sync::{Scanner, SyncContext};
use crate::tree::node::Handle;
use crate::tree::store::NodeStore;

/// A fully scanned tree mirrored from an in-memory storage rooted at `/m`.
pub(crate) struct Fixture {
    pub storage: MemoryStorage,
    pub store: NodeStore,
    pub scanner: Scanner,
    pub events: Vec<Event>,
}

impl Fixture {
    pub fn new(populate: impl FnOnce(&MemoryStorage)) -> Self {
        let storage = MemoryStorage::new("/m");
        populate(&storage);
        let mut store = NodeStore::new();
        store.set_root("root", Handle::new("/m"));
        let mut fixture = Self {
            storage,
            store,
            scanner: Scanner::default().reserving(".trash"),
            events: Vec::new(),
        };
        fixture.scan_all();
        fixture.events.clear();
        fixture
    }

    pub fn ctx(&mut self) -> SyncContext<'_> {
        SyncContext {
            store: &mut self.store,
            storage: &self.storage,
            scanner: &self.scanner,
            sink: &mut self.events,
        }
    }

    /// Reconciles every directory, parents first.
    pub fn scan_all(&mut self) {
        let mut pending = vec![PathBuf::from("root")];
        while let Some(path) = pending.pop() {
            self.ctx().resync(&path).unwrap();
            if let Some(node) = self.store.dir(&path) {
                pending.extend(node.children().iter().map(|c| path.join(c)));
            }
        }
    }

    pub fn id_of(&self, path: &str) -> crate::tree::EntryId {
        match self.store.resolve(Path::new(path)) {
            Some(crate::tree::NodeRef::Directory(d)) => d.id(),
            Some(crate::tree::NodeRef::File(f)) => f.id(),
            None => panic!("{path} not in tree"),
        }
    }
}
