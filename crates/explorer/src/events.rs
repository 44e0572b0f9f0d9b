//! Events emitted towards the rendering layer.
//!
//! The explorer core owns no UI. Whatever renders it subscribes to the
//! [`EventBus`] and reacts to notifications, dialog dismissals and state
//! changes.

use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::service::ServiceError;

/// Default buffer size for the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Severity of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// A toast-style message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Dialogs the core asks the rendering layer to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialog {
    AddFolder,
    DeleteFolder,
    MakeDirectory,
}

/// Events emitted by the explorer core.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplorerEvent {
    /// A message to show the operator.
    Notification(Notification),
    /// A dialog should be closed.
    DialogDismissed(Dialog),
    /// The folder list cache was replaced.
    FoldersRefreshed { count: usize },
    /// The explorer opened a folder at its root.
    ExplorerOpened { folder_id: String },
    /// A fresh listing was applied.
    ListingUpdated {
        folder_id: String,
        path: String,
        entries: usize,
    },
    /// The explorer was closed.
    ExplorerClosed { folder_id: String },
    /// A file was accepted into the upload queue.
    UploadQueued { task_id: String, filename: String },
    /// An upload finished successfully.
    UploadCompleted { task_id: String },
    /// An upload failed and waits for retry or dismissal.
    UploadFailed { task_id: String, message: String },
    /// A task left the upload queue.
    UploadRemoved { task_id: String },
    /// A file was saved locally.
    Downloaded { filename: String, path: PathBuf },
}

/// Cloneable handle for emitting [`ExplorerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExplorerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ExplorerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notify_success(&self, message: impl Into<String>) {
        self.emit(ExplorerEvent::Notification(Notification {
            kind: NotificationKind::Success,
            message: message.into(),
        }));
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        self.emit(ExplorerEvent::Notification(Notification {
            kind: NotificationKind::Error,
            message: message.into(),
        }));
    }

    /// Log a failed service call and show the service's message verbatim
    /// when it supplied one.
    pub fn report_service_error(&self, context: &str, err: &ServiceError) {
        warn!(error = %err, "{}", context);
        match err.user_message() {
            Some(message) => self.notify_error(message),
            None => debug!("No message to show for failed call"),
        }
    }
}
