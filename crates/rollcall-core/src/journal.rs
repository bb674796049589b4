//! Write-ahead hook for durable storage.
//!
//! The service calls the journal while holding its writer lock and before
//! the in-memory stores change. A journal error aborts the operation.

use crate::types::{AttendanceEvent, Identity};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("journal write failed: {0}")]
pub struct JournalError(pub String);

impl JournalError {
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string())
    }
}

pub trait Journal: Send + Sync {
    fn identity_added(&self, identity: &Identity) -> Result<(), JournalError>;

    /// Rows appended by one attendance run. Called even when `events` is
    /// empty so implementations can skip cheaply.
    fn events_appended(&self, events: &[AttendanceEvent]) -> Result<(), JournalError>;
}

/// Keeps nothing. State lives only as long as the process.
pub struct NullJournal;

impl Journal for NullJournal {
    fn identity_added(&self, _identity: &Identity) -> Result<(), JournalError> {
        Ok(())
    }

    fn events_appended(&self, _events: &[AttendanceEvent]) -> Result<(), JournalError> {
        Ok(())
    }
}
