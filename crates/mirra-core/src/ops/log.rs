//! Bounded undo log.

use std::collections::VecDeque;

use crate::error::{CoreError, CoreResult};
use crate::ops::operation::Operation;
use crate::sync::SyncContext;

/// Sequential log of executed operations, newest last.
///
/// Operations are recorded only after they succeeded. When the log is
/// full the oldest entry is evicted silently.
#[derive(Debug)]
pub struct OperationLog {
    entries: VecDeque<Operation>,
    capacity: usize,
}

impl OperationLog {
    /// Creates an empty log holding at most `capacity` operations.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends an executed operation, evicting the oldest if needed.
    pub fn record(&mut self, op: Operation) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_back(op);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                tracing::debug!("evicted from history: {}", evicted.description());
            }
        }
    }

    /// Inverts the most recent operation and returns its description.
    ///
    /// A failed undo leaves the entry in place so it can be retried.
    pub(crate) fn undo(&mut self, ctx: &mut SyncContext<'_>) -> CoreResult<String> {
        let mut op = self.entries.pop_back().ok_or(CoreError::NothingToUndo)?;
        let description = op.description();
        match op.undo(ctx) {
            Ok(()) => {
                tracing::info!("undone: {description}");
                Ok(description)
            }
            Err(err) => {
                tracing::warn!("undo of {description} failed: {err}");
                self.entries.push_back(op);
                Err(err)
            }
        }
    }

    /// Returns the most recent operation without removing it.
    pub fn last(&self) -> Option<&Operation> {
        self.entries.back()
    }

    /// Description of the operation `undo` would invert next.
    pub fn last_description(&self) -> Option<String> {
        self.last().map(Operation::description)
    }

    /// Descriptions, oldest first.
    pub fn descriptions(&self) -> Vec<String> {
        self.entries.iter().map(Operation::description).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Forgets every delete, e.g. after the staging area was emptied.
    /// Returns how many were dropped.
    pub fn drop_deletes(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|op| !op.is_delete());
        before - self.entries.len()
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::staging::Staging;
    use crate::test_support::Fixture;
    use std::path::Path;

    fn three_files() -> Fixture {
        Fixture::new(|s| {
            s.write("/m/a.jpg", "a");
            s.write("/m/b.jpg", "b");
            s.write("/m/c.jpg", "c");
        })
    }

    fn rename(fx: &mut Fixture, from: &str, to: &str) -> Operation {
        Operation::rename(&mut fx.ctx(), Path::new(from), to).unwrap()
    }

    #[test]
    fn new_log_is_empty() {
        let log = OperationLog::new(5);
        assert!(log.is_empty());
        assert_eq!(log.capacity(), 5);
        assert!(log.last_description().is_none());
    }

    #[test]
    fn default_capacity_is_fifty() {
        assert_eq!(OperationLog::default().capacity(), 50);
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let mut fx = three_files();
        let mut log = OperationLog::new(2);
        log.record(rename(&mut fx, "root/a.jpg", "a1.jpg"));
        log.record(rename(&mut fx, "root/b.jpg", "b1.jpg"));
        log.record(rename(&mut fx, "root/c.jpg", "c1.jpg"));

        assert_eq!(log.len(), 2);
        assert_eq!(
            log.descriptions(),
            vec!["rename root/b.jpg to b1.jpg", "rename root/c.jpg to c1.jpg"]
        );
    }

    #[test]
    fn undo_pops_newest_first() {
        let mut fx = three_files();
        let mut log = OperationLog::new(10);
        log.record(rename(&mut fx, "root/a.jpg", "a1.jpg"));
        log.record(rename(&mut fx, "root/b.jpg", "b1.jpg"));

        let undone = log.undo(&mut fx.ctx()).unwrap();

        assert_eq!(undone, "rename root/b.jpg to b1.jpg");
        assert_eq!(log.len(), 1);
        assert!(fx.store.file(Path::new("root/b.jpg")).is_some());
        assert!(fx.store.file(Path::new("root/a1.jpg")).is_some());
    }

    #[test]
    fn undo_on_empty_log_reports_nothing_to_undo() {
        let mut fx = three_files();
        let mut log = OperationLog::new(10);
        assert!(matches!(log.undo(&mut fx.ctx()), Err(CoreError::NothingToUndo)));
    }

    #[test]
    fn failed_undo_keeps_the_entry_for_retry() {
        let mut fx = three_files();
        let mut log = OperationLog::new(10);
        let op = Operation::delete(&mut fx.ctx(), &Staging::default(), Path::new("root/a.jpg")).unwrap();
        log.record(op);
        fx.storage.write("/m/a.jpg", "replacement");
        fx.ctx().resync(Path::new("root")).unwrap();

        let result = log.undo(&mut fx.ctx());
        assert!(matches!(result, Err(CoreError::NameCollision(_))));
        assert_eq!(log.len(), 1);

        fx.storage.delete("/m/a.jpg");
        fx.ctx().resync(Path::new("root")).unwrap();
        log.undo(&mut fx.ctx()).unwrap();

        assert!(log.is_empty());
        assert_eq!(fx.storage.contents("/m/a.jpg").unwrap(), b"a");
    }

    #[test]
    fn drop_deletes_keeps_other_operations() {
        let mut fx = three_files();
        let mut log = OperationLog::new(10);
        let staging = Staging::default();
        log.record(Operation::delete(&mut fx.ctx(), &staging, Path::new("root/a.jpg")).unwrap());
        log.record(rename(&mut fx, "root/b.jpg", "b1.jpg"));
        log.record(Operation::delete(&mut fx.ctx(), &staging, Path::new("root/c.jpg")).unwrap());

        assert_eq!(log.drop_deletes(), 2);
        assert_eq!(log.descriptions(), vec!["rename root/b.jpg to b1.jpg"]);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut fx = three_files();
        let mut log = OperationLog::new(0);
        log.record(rename(&mut fx, "root/a.jpg", "a1.jpg"));
        assert!(log.is_empty());
    }
}
