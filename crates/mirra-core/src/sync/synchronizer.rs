//! Applies directory changes from a [`ScanDiff`] to the tree.

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::event::{ChildSummary, Event, EventSink};
use crate::fs::storage::EntryKind;
use crate::sync::scanner::ScanDiff;
use crate::tree::store::NodeStore;

/// Turns scan diffs into structural changes and notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSynchronizer;

impl TreeSynchronizer {
    /// Detaches removed child directories, attaches added ones at their
    /// sorted position and reports file-list changes.
    ///
    /// Returns the number of events emitted. Untouched children are never
    /// reported, so an empty diff emits nothing.
    pub fn apply(store: &mut NodeStore, diff: &ScanDiff, sink: &mut dyn EventSink) -> CoreResult<usize> {
        if !store.contains_dir(&diff.path) {
            return Err(CoreError::NotFound(diff.path.clone()));
        }
        let mut emitted = 0;

        for entry in diff.removed.iter().filter(|e| e.kind == EntryKind::Directory) {
            let path = diff.path.join(&entry.name);
            match store.detach_dir(&path) {
                Ok((_, released)) => {
                    tracing::debug!("detached {} ({released} nodes)", path.display());
                    sink.emit(Event::Detached { path });
                    emitted += 1;
                }
                Err(CoreError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        for entry in diff.added.iter().filter(|e| e.kind == EntryKind::Directory) {
            match store.attach_dir(&diff.path, &entry.name, entry.handle.clone()) {
                Ok(_) => {
                    if let Some(event) = attached(store, &diff.path, &entry.name) {
                        sink.emit(event);
                        emitted += 1;
                    }
                }
                Err(CoreError::NameCollision(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if diff.files_changed() {
            sink.emit(Event::FilesChanged {
                path: diff.path.clone(),
            });
            emitted += 1;
        }

        Ok(emitted)
    }
}

/// Builds the [`Event::Attached`] notification for an existing child.
pub(crate) fn attached(store: &NodeStore, parent: &Path, name: &str) -> Option<Event> {
    let index = store
        .dir(parent)?
        .children()
        .iter()
        .position(|c| c == name)?;
    let child = store.dir(&parent.join(name))?;
    Some(Event::Attached {
        parent: parent.to_path_buf(),
        child: ChildSummary {
            id: child.id(),
            name: name.to_string(),
            path: child.path().to_path_buf(),
            index,
        },
    })
}
