//! Data panel wiring.
//!
//! This module provides the [`DataPanel`] that builds the folder list, the
//! navigator and the upload queue around one storage service and one event
//! bus, and gates explorer actions on the open folder's permissions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::PermissionToken;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ExplorerError, ValidationError};
use crate::events::{EventBus, ExplorerEvent};
use crate::files::{ExplorerNavigator, LocalFile, UploadQueueManager};
use crate::folders::FolderListController;
use crate::service::VirtualFolderService;

/// The folder list, explorer and upload queue of one storage service.
pub struct DataPanel<S> {
    /// Where downloads go unless told otherwise.
    download_dir: PathBuf,
    /// Event bus shared by all components.
    events: EventBus,
    folders: FolderListController<S>,
    explorer: ExplorerNavigator<S>,
    uploads: UploadQueueManager<S>,
}

impl<S: VirtualFolderService + 'static> DataPanel<S> {
    pub fn new(service: Arc<S>, config: &Config) -> Self {
        let events = EventBus::new(config.events.capacity);
        let folders = FolderListController::new(Arc::clone(&service), events.clone());
        let explorer = ExplorerNavigator::new(Arc::clone(&service), events.clone());
        let uploads = UploadQueueManager::new(
            service,
            events.clone(),
            explorer.clone(),
            config.upload.settings(),
        );

        Self {
            download_dir: config.explorer.download_dir.clone(),
            events,
            folders,
            explorer,
            uploads,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn folders(&self) -> &FolderListController<S> {
        &self.folders
    }

    pub fn explorer(&self) -> &ExplorerNavigator<S> {
        &self.explorer
    }

    pub fn uploads(&self) -> &UploadQueueManager<S> {
        &self.uploads
    }

    /// Open folder `id` in the explorer. Needs read access.
    pub async fn open_folder(&self, id: &str) -> Result<(), ExplorerError> {
        self.require(id, PermissionToken::Read).await?;
        self.explorer.open(id).await
    }

    pub async fn close_folder(&self) {
        self.explorer.close().await;
    }

    /// Create a directory in the open folder. Needs write access.
    pub async fn make_directory(&self, name: &str) -> Result<(), ExplorerError> {
        self.require_open(PermissionToken::Write).await?;
        self.explorer.make_directory(name).await
    }

    /// Upload dropped files into the open folder. Needs write access.
    pub async fn upload_dropped(
        &self,
        files: Vec<LocalFile>,
    ) -> Result<Vec<JoinHandle<()>>, ExplorerError> {
        self.require_open(PermissionToken::Write).await?;
        self.uploads.enqueue_dropped(files).await
    }

    /// Upload picked files into the open folder. Needs write access.
    pub async fn upload_selected(
        &self,
        files: Vec<LocalFile>,
    ) -> Result<Vec<JoinHandle<()>>, ExplorerError> {
        self.require_open(PermissionToken::Write).await?;
        self.uploads.enqueue_selected(files).await
    }

    /// Download `filename` from the current directory. Needs read access.
    ///
    /// Saves into `dest_dir`, or the configured download directory.
    pub async fn download(
        &self,
        filename: &str,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf, ExplorerError> {
        self.require_open(PermissionToken::Read).await?;
        let dest_dir = dest_dir.unwrap_or(self.download_dir.as_path());
        self.explorer.download(filename, dest_dir).await
    }

    /// Delete folder `id`. Needs delete access.
    pub async fn delete_folder(
        &self,
        id: &str,
        confirmation: &str,
    ) -> Result<JoinHandle<()>, ExplorerError> {
        self.require(id, PermissionToken::Delete).await?;
        self.folders.delete(id, confirmation)
    }

    async fn require_open(&self, capability: PermissionToken) -> Result<(), ExplorerError> {
        let (folder_id, _) = self.explorer.location().await.ok_or(ExplorerError::NotOpen)?;
        self.require(&folder_id, capability).await
    }

    /// Check `capability` on folder `id`, fetching the folder list once if
    /// the folder is not cached yet.
    async fn require(&self, id: &str, capability: PermissionToken) -> Result<(), ExplorerError> {
        if self.folders.find(id).await.is_none() {
            debug!(folder_id = %id, "Folder not cached, refreshing folder list");
            self.folders.list().await?;
        }

        let Some(permissions) = self.folders.permissions(id).await else {
            return Err(ValidationError::UnknownFolder(id.to_string()).into());
        };
        if !permissions.allows(capability) {
            warn!(folder_id = %id, capability = %capability, "Action not permitted");
            return Err(ValidationError::PermissionDenied {
                folder_id: id.to_string(),
                capability,
            }
            .into());
        }
        Ok(())
    }
}
