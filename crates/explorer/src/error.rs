//! Error types for explorer operations.

use protocol::PermissionToken;
use thiserror::Error;

use crate::service::ServiceError;

/// Client-side validation failures. These block an action before any
/// service call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The typed confirmation did not match the folder id.
    #[error("Folder name mismatched. Check your typing.")]
    ConfirmationMismatch,

    /// A folder or directory name uses characters outside `[A-Za-z0-9_-]`.
    #[error("invalid name {0:?}: allows letters, numbers and -_")]
    InvalidName(String),

    /// The entry is not in the current listing.
    #[error("no such entry: {0}")]
    NoSuchEntry(String),

    /// The entry exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The entry is a directory or too large to download.
    #[error("not downloadable: {0}")]
    NotDownloadable(String),

    /// The folder is not in the folder list.
    #[error("unknown folder: {0}")]
    UnknownFolder(String),

    /// The folder does not grant the capability the action needs.
    #[error("{capability} permission required on folder {folder_id}")]
    PermissionDenied {
        folder_id: String,
        capability: PermissionToken,
    },

    /// No upload task with this id, or the task cannot take this action.
    #[error("no failed upload task: {0}")]
    UnknownTask(String),
}

/// Errors returned by explorer operations.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// The operation needs an open folder.
    #[error("no folder is open")]
    NotOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExplorerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ExplorerError::Validation(_))
    }
}
