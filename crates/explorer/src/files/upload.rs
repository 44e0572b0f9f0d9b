//! Upload queue.
//!
//! Every accepted file becomes an [`UploadTask`] and is uploaded on its own
//! spawned task right away; there is no client-side concurrency limit.
//! Finished tasks linger briefly so the operator can see them complete, then
//! leave the queue. Failed tasks stay until they are retried or dismissed.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use protocol::DROP_UPLOAD_LIMIT;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::navigator::ExplorerNavigator;
use crate::error::{ExplorerError, ValidationError};
use crate::events::{EventBus, ExplorerEvent};
use crate::service::{UploadPayload, VirtualFolderService};

/// Length of generated task ids.
pub const TASK_ID_LEN: usize = 5;

/// How long a completed task stays in the queue by default.
pub const DEFAULT_LINGER: Duration = Duration::from_millis(1000);

/// A file picked or dropped by the operator.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub data: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, named after its last path component.
    pub async fn read(path: &Path) -> io::Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                )
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Complete,
    /// The service rejected the upload; holds the message shown to the
    /// operator.
    Failed(String),
}

/// One file in the upload queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub folder_id: String,
    /// Service path the file is written to, fixed at submission.
    pub destination: String,
    /// 0 to 100.
    pub progress: u8,
    pub status: UploadStatus,
}

impl UploadTask {
    pub fn complete(&self) -> bool {
        self.status == UploadStatus::Complete
    }

    pub fn error(&self) -> bool {
        matches!(self.status, UploadStatus::Failed(_))
    }
}

/// Tunables for the upload queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    /// Dropped files above this many bytes are skipped.
    pub drop_size_limit: u64,
    /// Delay between completion and removal from the queue.
    pub linger: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            drop_size_limit: DROP_UPLOAD_LIMIT,
            linger: DEFAULT_LINGER,
        }
    }
}

#[derive(Debug)]
struct QueuedUpload {
    task: UploadTask,
    data: Bytes,
}

/// Owns the upload queue of the open folder.
pub struct UploadQueueManager<S> {
    service: Arc<S>,
    events: EventBus,
    navigator: ExplorerNavigator<S>,
    settings: UploadSettings,
    queue: Arc<RwLock<Vec<QueuedUpload>>>,
}

impl<S> Clone for UploadQueueManager<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            events: self.events.clone(),
            navigator: self.navigator.clone(),
            settings: self.settings,
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<S: VirtualFolderService + 'static> UploadQueueManager<S> {
    pub fn new(
        service: Arc<S>,
        events: EventBus,
        navigator: ExplorerNavigator<S>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            service,
            events,
            navigator,
            settings,
            queue: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn settings(&self) -> UploadSettings {
        self.settings
    }

    /// Queue files dropped onto the explorer.
    ///
    /// Files larger than the drop limit are skipped without notice.
    pub async fn enqueue_dropped(
        &self,
        files: Vec<LocalFile>,
    ) -> Result<Vec<JoinHandle<()>>, ExplorerError> {
        let limit = self.settings.drop_size_limit;
        let accepted = files
            .into_iter()
            .filter(|file| {
                let fits = file.size() <= limit;
                if !fits {
                    debug!(filename = %file.name, size = file.size(), limit, "Skipping oversized dropped file");
                }
                fits
            })
            .collect();
        self.enqueue(accepted).await
    }

    /// Queue files chosen in the file picker. No size limit applies.
    pub async fn enqueue_selected(
        &self,
        files: Vec<LocalFile>,
    ) -> Result<Vec<JoinHandle<()>>, ExplorerError> {
        self.enqueue(files).await
    }

    /// Resubmit a failed task to its original destination.
    pub async fn retry(&self, id: &str) -> Result<JoinHandle<()>, ExplorerError> {
        {
            let mut queue = self.queue.write().await;
            let entry = queue
                .iter_mut()
                .find(|q| q.task.id == id && q.task.error())
                .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
            entry.task.status = UploadStatus::Uploading;
            entry.task.progress = 0;
        }

        info!(task_id = %id, "Retrying upload");
        Ok(self.spawn_upload(id.to_string()))
    }

    /// Drop a failed task from the queue.
    pub async fn dismiss(&self, id: &str) -> Result<(), ExplorerError> {
        {
            let mut queue = self.queue.write().await;
            let index = queue
                .iter()
                .position(|q| q.task.id == id && q.task.error())
                .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
            queue.remove(index);
        }

        debug!(task_id = %id, "Dismissed failed upload");
        self.events.emit(ExplorerEvent::UploadRemoved {
            task_id: id.to_string(),
        });
        Ok(())
    }

    /// Snapshot of the queue in submission order.
    pub async fn tasks(&self) -> Vec<UploadTask> {
        self.queue
            .read()
            .await
            .iter()
            .map(|q| q.task.clone())
            .collect()
    }

    async fn enqueue(&self, files: Vec<LocalFile>) -> Result<Vec<JoinHandle<()>>, ExplorerError> {
        let (folder_id, breadcrumb) = self
            .navigator
            .location()
            .await
            .ok_or(ExplorerError::NotOpen)?;

        let mut queued = Vec::with_capacity(files.len());
        {
            let mut queue = self.queue.write().await;
            for file in files {
                let id = unique_task_id(&queue);
                let task = UploadTask {
                    id: id.clone(),
                    filename: file.name.clone(),
                    size: file.size(),
                    folder_id: folder_id.clone(),
                    destination: breadcrumb.join_with(&file.name),
                    progress: 0,
                    status: UploadStatus::Uploading,
                };
                debug!(task_id = %id, filename = %file.name, destination = %task.destination, "Queued upload");
                queue.push(QueuedUpload {
                    task,
                    data: file.data,
                });
                queued.push((id, file.name));
            }
        }

        let handles = queued
            .into_iter()
            .map(|(task_id, filename)| {
                self.events.emit(ExplorerEvent::UploadQueued {
                    task_id: task_id.clone(),
                    filename,
                });
                self.spawn_upload(task_id)
            })
            .collect();
        Ok(handles)
    }

    fn spawn_upload(&self, id: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_upload(id).await })
    }

    async fn run_upload(&self, id: String) {
        let job = {
            let queue = self.queue.read().await;
            queue.iter().find(|q| q.task.id == id).map(|q| {
                (
                    q.task.folder_id.clone(),
                    UploadPayload {
                        path: q.task.destination.clone(),
                        filename: q.task.filename.clone(),
                        data: q.data.clone(),
                    },
                )
            })
        };
        let Some((folder_id, payload)) = job else {
            debug!(task_id = %id, "Upload task left the queue before starting");
            return;
        };
        let destination = payload.path.clone();

        match self.service.upload(payload, &folder_id).await {
            Ok(()) => {
                self.update(&id, |task| {
                    task.status = UploadStatus::Complete;
                    task.progress = 100;
                })
                .await;
                info!(task_id = %id, folder_id = %folder_id, destination = %destination, "Upload complete");
                self.events.emit(ExplorerEvent::UploadCompleted {
                    task_id: id.clone(),
                });

                if let Err(e) = self.navigator.refresh().await {
                    debug!(error = %e, "Listing refresh after upload failed");
                }

                tokio::time::sleep(self.settings.linger).await;
                self.remove(&id).await;
            }
            Err(err) => {
                let message = err
                    .user_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                self.update(&id, |task| task.status = UploadStatus::Failed(message.clone()))
                    .await;
                self.events.report_service_error("Upload failed", &err);
                self.events.emit(ExplorerEvent::UploadFailed {
                    task_id: id,
                    message,
                });
            }
        }
    }

    async fn update(&self, id: &str, apply: impl FnOnce(&mut UploadTask)) {
        if let Some(entry) = self.queue.write().await.iter_mut().find(|q| q.task.id == id) {
            apply(&mut entry.task);
        }
    }

    async fn remove(&self, id: &str) {
        let removed = {
            let mut queue = self.queue.write().await;
            let before = queue.len();
            queue.retain(|q| q.task.id != id);
            queue.len() != before
        };
        if removed {
            self.events.emit(ExplorerEvent::UploadRemoved {
                task_id: id.to_string(),
            });
        }
    }
}

/// Random alphanumeric id not used by any queued task.
fn unique_task_id(queue: &[QueuedUpload]) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(TASK_ID_LEN)
            .map(char::from)
            .collect();
        if !queue.iter().any(|q| q.task.id == id) {
            return id;
        }
    }
}
