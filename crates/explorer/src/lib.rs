//! # Virtual Folder Explorer Library
//!
//! This crate provides the client-side core of a storage panel for virtual
//! folders: named storage areas on cluster storage hosts that carry per-user
//! read, write and delete permissions.
//!
//! ## Overview
//!
//! - **Folder list**: list, create and delete folders, pick storage hosts
//! - **Explorer**: browse a folder's directory tree with a breadcrumb,
//!   create directories, download files
//! - **Upload queue**: pipelined uploads into the current directory with
//!   retry of failed transfers
//! - **Permissions**: capability checks derived from `r`/`w`/`d` tokens
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          DataPanel                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────┐  │
//! │  │ FolderList       │ │ Explorer         │ │ UploadQueue  │  │
//! │  │ Controller       │ │ Navigator        │ │ Manager      │  │
//! │  └──────────────────┘ └──────────────────┘ └──────────────┘  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              VirtualFolderService (Arc<S>)             │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                 EventBus (notifications)               │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use explorer::{Config, DataPanel, LocalFolderService};
//! use explorer::protocol::HostList;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let hosts = HostList {
//!         default: config.storage.default_host.clone(),
//!         allowed: config.storage.allowed_hosts.clone(),
//!     };
//!     let service = Arc::new(LocalFolderService::open(&config.storage.root, hosts).await?);
//!
//!     let panel = DataPanel::new(service, &config);
//!     for folder in panel.folders().list().await? {
//!         println!("{} ({})", folder.name, folder.permission);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`service`]: Storage service boundary and its implementations
//! - [`folders`]: Folder list and permission evaluation
//! - [`files`]: Navigation, uploads and downloads
//! - [`events`]: Notifications and state events for the rendering layer
//! - [`panel`]: Wiring and permission gating

pub mod config;
pub mod error;
pub mod events;
pub mod files;
pub mod folders;
pub mod panel;
pub mod service;

// Re-export protocol for convenience
pub use protocol;

pub use config::{Config, ConfigError};
pub use error::{ExplorerError, ValidationError};
pub use events::{Dialog, EventBus, ExplorerEvent, Notification, NotificationKind};
pub use files::{
    Breadcrumb, ExplorerNavigator, ExplorerState, LocalFile, UploadQueueManager, UploadSettings,
    UploadStatus, UploadTask,
};
pub use folders::{has_capability, EffectivePermission, FolderListController};
pub use panel::DataPanel;
pub use service::{
    LocalFolderService, MemoryFolderService, ServiceError, UploadPayload, VirtualFolderService,
};
