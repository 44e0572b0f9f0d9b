//! Top-level folder list.
//!
//! Keeps the cached folder list, resolves storage hosts for the creation
//! dialog, and runs folder creation and deletion.
//!
//! Create and delete are optimistic about their dialogs: the dialog is
//! dismissed as soon as the request is accepted locally, and only a
//! notification reports how the service call ended.

use std::sync::Arc;

use protocol::{is_safe_name, FolderInfo, HostList, PermissionToken, VirtualFolder};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::permissions::{has_capability, EffectivePermission};
use crate::error::{ExplorerError, ValidationError};
use crate::events::{Dialog, EventBus, ExplorerEvent};
use crate::service::VirtualFolderService;

/// Notification shown after a folder was created.
pub const FOLDER_CREATED: &str = "Folder is successfully created.";

/// Notification shown after a folder was deleted.
pub const FOLDER_DELETED: &str = "Folder is successfully deleted.";

/// Lists, creates and deletes virtual folders.
pub struct FolderListController<S> {
    service: Arc<S>,
    events: EventBus,
    /// Last successfully fetched folder list.
    folders: Arc<RwLock<Vec<VirtualFolder>>>,
}

impl<S> Clone for FolderListController<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            events: self.events.clone(),
            folders: Arc::clone(&self.folders),
        }
    }
}

impl<S: VirtualFolderService + 'static> FolderListController<S> {
    pub fn new(service: Arc<S>, events: EventBus) -> Self {
        Self {
            service,
            events,
            folders: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fetch the folder list and replace the cache.
    ///
    /// On failure the previous cache is kept untouched.
    pub async fn list(&self) -> Result<Vec<VirtualFolder>, ExplorerError> {
        match self.service.list_folders().await {
            Ok(folders) => {
                *self.folders.write().await = folders.clone();
                debug!(count = folders.len(), "Refreshed folder list");
                self.events.emit(ExplorerEvent::FoldersRefreshed {
                    count: folders.len(),
                });
                Ok(folders)
            }
            Err(err) => {
                self.events
                    .report_service_error("Failed to list folders", &err);
                Err(err.into())
            }
        }
    }

    /// The cached folder list.
    pub async fn folders(&self) -> Vec<VirtualFolder> {
        self.folders.read().await.clone()
    }

    pub async fn find(&self, id: &str) -> Option<VirtualFolder> {
        self.folders.read().await.iter().find(|f| f.id == id).cloned()
    }

    /// Whether cached folder `id` grants `capability`. Unknown folders grant
    /// nothing.
    pub async fn capability(&self, id: &str, capability: PermissionToken) -> bool {
        self.find(id)
            .await
            .map(|f| has_capability(&f.permission, capability))
            .unwrap_or(false)
    }

    /// Effective permissions of cached folder `id`.
    pub async fn permissions(&self, id: &str) -> Option<EffectivePermission> {
        self.find(id).await.map(|f| EffectivePermission::of(&f))
    }

    /// Fetch the hosts offered in the creation dialog.
    ///
    /// Never cached: hosts may change between two creation attempts.
    pub async fn list_allowed_hosts(&self) -> Result<HostList, ExplorerError> {
        self.service.list_hosts().await.map_err(|err| {
            self.events.report_service_error("Failed to list hosts", &err);
            err.into()
        })
    }

    /// Fetch details about folder `id`.
    pub async fn info(&self, id: &str) -> Result<FolderInfo, ExplorerError> {
        self.service.get_folder_info(id).await.map_err(|err| {
            self.events
                .report_service_error("Failed to fetch folder info", &err);
            err.into()
        })
    }

    /// Create folder `name` on `host`.
    ///
    /// Returns once the request is accepted locally; the returned handle
    /// resolves after the service answered and the outcome was notified.
    pub fn create(&self, name: &str, host: &str) -> Result<JoinHandle<()>, ExplorerError> {
        if !is_safe_name(name) {
            let err = ValidationError::InvalidName(name.to_string());
            self.events.notify_error(err.to_string());
            return Err(err.into());
        }

        self.events
            .emit(ExplorerEvent::DialogDismissed(Dialog::AddFolder));

        let this = self.clone();
        let name = name.to_string();
        let host = host.to_string();
        Ok(tokio::spawn(async move {
            match this.service.create_folder(&name, &host).await {
                Ok(()) => {
                    info!(folder = %name, host = %host, "Folder created");
                    this.events.notify_success(FOLDER_CREATED);
                    if let Err(e) = this.list().await {
                        debug!(error = %e, "Folder list refresh after create failed");
                    }
                }
                Err(err) => this
                    .events
                    .report_service_error("Failed to create folder", &err),
            }
        }))
    }

    /// Delete folder `id` after the operator retyped its id as
    /// `confirmation`.
    ///
    /// A mismatch never reaches the service.
    pub fn delete(&self, id: &str, confirmation: &str) -> Result<JoinHandle<()>, ExplorerError> {
        if confirmation != id {
            let err = ValidationError::ConfirmationMismatch;
            self.events.notify_error(err.to_string());
            return Err(err.into());
        }

        self.events
            .emit(ExplorerEvent::DialogDismissed(Dialog::DeleteFolder));

        let this = self.clone();
        let id = id.to_string();
        Ok(tokio::spawn(async move {
            match this.service.delete_folder(&id).await {
                Ok(()) => {
                    info!(folder_id = %id, "Folder deleted");
                    this.events.notify_success(FOLDER_DELETED);
                    if let Err(e) = this.list().await {
                        debug!(error = %e, "Folder list refresh after delete failed");
                    }
                }
                Err(err) => this
                    .events
                    .report_service_error("Failed to delete folder", &err),
            }
        }))
    }
}
