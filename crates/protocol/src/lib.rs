//! # Virtual Folder Protocol Library
//!
//! This crate provides the data model shared between the folder explorer
//! core and the cluster's storage service.
//!
//! ## Overview
//!
//! - **Folders**: virtual folders, storage hosts and folder information
//! - **Permissions**: raw `r`/`w`/`d` permission tokens
//! - **Listings**: directory entries and the JSON-in-string listing format
//! - **Paths**: breadcrumb joining, safe-name checks and size limits
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{FileListing, PermissionSet, PermissionToken};
//!
//! let permission = PermissionSet::parse("rw");
//! assert!(permission.contains(PermissionToken::Write));
//!
//! let listing = FileListing {
//!     files: r#"[{"filename":"docs","mode":"drwxr-xr-x","ctime":0,"size":0}]"#.to_string(),
//! };
//! assert!(listing.entries().unwrap()[0].is_directory());
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Service data definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    is_safe_name, join_path, split_path, DirEntry, FileListing, FolderInfo, HostList, PermissionSet,
    PermissionToken, VirtualFolder, DOWNLOAD_SIZE_LIMIT, DROP_UPLOAD_LIMIT, PATH_SEPARATOR,
    ROOT_SEGMENT,
};
