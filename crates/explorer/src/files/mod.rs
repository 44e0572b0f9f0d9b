//! Folder contents: navigation, uploads and downloads.
//!
//! This module provides:
//! - [`ExplorerNavigator`] for browsing the directory tree of an open folder
//! - [`UploadQueueManager`] for queued uploads into the current directory
//! - [`save_atomic`] for writing downloads to disk

pub mod breadcrumb;
pub mod download;
pub mod navigator;
pub mod upload;

pub use breadcrumb::Breadcrumb;
pub use download::save_atomic;
pub use navigator::{ExplorerNavigator, ExplorerState};
pub use upload::{
    LocalFile, UploadQueueManager, UploadSettings, UploadStatus, UploadTask, DEFAULT_LINGER,
    TASK_ID_LEN,
};
