//! Storage service boundary.
//!
//! Every remote call the explorer makes goes through [`VirtualFolderService`].
//! Controllers receive the service as an `Arc<S>` at construction; nothing
//! looks a client up from global state.
//!
//! Two implementations ship with the crate:
//! - [`LocalFolderService`]: folders are directories below a storage root
//! - [`MemoryFolderService`]: in-memory double with failure injection

use std::future::Future;

use bytes::Bytes;
use protocol::{FileListing, FolderInfo, HostList, ProtocolError, VirtualFolder};
use thiserror::Error;

pub mod local;
pub mod memory;

pub use local::LocalFolderService;
pub use memory::{MemoryFolderService, Operation, ServiceCall};

/// Errors returned by the storage service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service rejected the call with a message meant for the operator.
    #[error("{0}")]
    Rejected(String),

    /// The call failed without any message.
    #[error("request failed")]
    Unreported,

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// The message to show the operator verbatim, if the service supplied one.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected(message) if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        ServiceError::Malformed(err.to_string())
    }
}

/// One file of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    /// Destination path inside the folder, e.g. `./docs/report.pdf`.
    pub path: String,
    /// Local file name.
    pub filename: String,
    /// File contents.
    pub data: Bytes,
}

/// Operations offered by the cluster's storage service.
///
/// Each call is atomic from the caller's point of view. Implementations must
/// return `Send` futures so calls can run on spawned tasks.
pub trait VirtualFolderService: Send + Sync {
    /// Lists the folders visible to the current user.
    fn list_folders(
        &self,
    ) -> impl Future<Output = Result<Vec<VirtualFolder>, ServiceError>> + Send;

    /// Lists the hosts new folders may be created on.
    fn list_hosts(&self) -> impl Future<Output = Result<HostList, ServiceError>> + Send;

    /// Creates a folder named `name` on `host`.
    fn create_folder(
        &self,
        name: &str,
        host: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Deletes the folder `id` with all of its contents.
    fn delete_folder(&self, id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Fetches details about folder `id`.
    fn get_folder_info(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<FolderInfo, ServiceError>> + Send;

    /// Lists the directory at `path` inside folder `id`.
    fn list_files(
        &self,
        path: &str,
        id: &str,
    ) -> impl Future<Output = Result<FileListing, ServiceError>> + Send;

    /// Creates the directory `path` inside folder `id`.
    fn make_directory(
        &self,
        path: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Uploads one file into folder `id`.
    fn upload(
        &self,
        payload: UploadPayload,
        id: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Downloads the file at `path` inside folder `id`.
    fn download(
        &self,
        path: &str,
        id: &str,
    ) -> impl Future<Output = Result<Bytes, ServiceError>> + Send;
}
