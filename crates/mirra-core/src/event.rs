//! Notifications from the engine to presentation layers.
//!
//! The engine pushes [`Event`]s into an [`EventSink`] as the tree changes.
//! A presentation layer mirrors the structural view from these alone; it
//! never needs to diff the tree itself.

use std::path::PathBuf;

use crate::tree::node::EntryId;

/// Summary of a directory that was just attached to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSummary {
    /// Identity of the new node.
    pub id: EntryId,
    /// The directory's display name.
    pub name: String,
    /// Full path key of the new node.
    pub path: PathBuf,
    /// Position among the parent's children, in natural order.
    pub index: usize,
}

/// A notification the engine sends to the presentation layer.
///
/// Events flow **Engine → UI**, in the order the changes were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A child directory appeared under `parent`.
    Attached {
        /// Path key of the parent directory.
        parent: PathBuf,
        child: ChildSummary,
    },
    /// A directory and its whole subtree were dropped from the tree.
    Detached {
        /// Path key the directory had.
        path: PathBuf,
    },
    /// The file list of a directory changed.
    FilesChanged {
        /// Path key of the directory.
        path: PathBuf,
    },
    /// A stale reference was recovered by re-reading an ancestor.
    Recovered {
        /// The path whose handle went stale.
        requested: PathBuf,
        /// The nearest valid ancestor that was reconciled.
        ancestor: PathBuf,
    },
}

/// Receiver of engine events.
///
/// Sinks must not fail: a disconnected channel simply drops the event.
pub trait EventSink: Send {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl EventSink for std::sync::mpsc::Sender<Event> {
    fn emit(&mut self, event: Event) {
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    fn emit(&mut self, event: Event) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(path: &str) -> Event {
        Event::Detached {
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn vec_sink_collects_in_order() {
        let mut sink: Vec<Event> = Vec::new();
        sink.emit(detached("a"));
        sink.emit(detached("b"));
        assert_eq!(sink, vec![detached("a"), detached("b")]);
    }

    #[test]
    fn std_channel_sink_forwards() {
        let (mut tx, rx) = std::sync::mpsc::channel();
        tx.emit(detached("a"));
        assert_eq!(rx.recv().unwrap(), detached("a"));
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (mut tx, rx) = std::sync::mpsc::channel::<Event>();
        drop(rx);
        tx.emit(detached("a"));
    }

    #[tokio::test]
    async fn tokio_channel_sink_forwards() {
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.emit(Event::FilesChanged {
            path: PathBuf::from("root"),
        });
        assert_eq!(
            rx.recv().await,
            Some(Event::FilesChanged {
                path: PathBuf::from("root")
            })
        );
    }
}
