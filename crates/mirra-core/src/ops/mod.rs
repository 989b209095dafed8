//! Reversible operations and the log that undoes them.

pub mod log;
pub mod operation;
pub mod staging;

pub use log::OperationLog;
pub use operation::{Operation, Staged, Transfer};
pub use staging::Staging;
