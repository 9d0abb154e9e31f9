//! Errors surfaced by the synchronization core.
//!
//! None of these are fatal. Callers on the network side log them and move on;
//! the tick never aborts because of one.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The id is already pending or active.
    DuplicateAdmission,
    /// The entity is beyond the visibility radius.
    OutOfRange,
    /// A handle arrived for an id that is not pending.
    StaleMaterialization,
    /// The registry holds the id but its handle can no longer be used.
    MissingHandle,
    /// The session has been torn down.
    SessionClosed,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::DuplicateAdmission => write!(f, "entity already known"),
            SyncError::OutOfRange => write!(f, "entity outside visibility radius"),
            SyncError::StaleMaterialization => write!(f, "materialization for non-pending entity"),
            SyncError::MissingHandle => write!(f, "entity handle unusable"),
            SyncError::SessionClosed => write!(f, "world session closed"),
        }
    }
}

impl std::error::Error for SyncError {}
