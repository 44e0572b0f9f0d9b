//! Navigation inside an open virtual folder.
//!
//! The navigator owns which folder is open, the breadcrumb and the entries of
//! the current directory. Listings are fetched asynchronously and can finish
//! out of order, so every fetch carries a ticket:
//!
//! - the session, bumped by every `open` and `close`
//! - the breadcrumb it targets
//! - a monotonically increasing request number
//!
//! A listing is applied only while its session is still open, its breadcrumb
//! is still where navigation is heading, and no newer listing was applied.
//! Anything else is dropped without touching the state.
//!
//! Only a failed navigation moves the target back to the shown breadcrumb. A
//! failed refresh leaves a navigation still in flight alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::{is_safe_name, DirEntry};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::breadcrumb::Breadcrumb;
use super::download::save_atomic;
use crate::error::{ExplorerError, ValidationError};
use crate::events::{Dialog, EventBus, ExplorerEvent};
use crate::service::{ServiceError, VirtualFolderService};

/// Snapshot of the open folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerState {
    pub folder_id: String,
    pub breadcrumb: Breadcrumb,
    /// Entries of the directory at `breadcrumb`, as last fetched.
    pub entries: Vec<DirEntry>,
}

impl ExplorerState {
    pub fn entry(&self, filename: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }
}

#[derive(Debug, Default)]
struct NavigatorInner {
    /// Applied state; `None` while closed.
    view: Option<ExplorerState>,
    /// Breadcrumb the latest navigation is heading to.
    target: Breadcrumb,
    session: u64,
    next_request: u64,
    /// Request number of the latest `open`, `descend` or `goto_breadcrumb`.
    latest_navigation: u64,
    applied_request: u64,
}

impl NavigatorInner {
    /// Ticket for a fetch that moves navigation to `breadcrumb`.
    fn navigate(&mut self, folder_id: &str, breadcrumb: Breadcrumb) -> Ticket {
        let ticket = self.ticket(folder_id, breadcrumb, true);
        self.latest_navigation = ticket.request;
        self.target = ticket.breadcrumb.clone();
        ticket
    }

    /// Ticket for a re-fetch of the current target.
    fn reload(&mut self, folder_id: &str) -> Ticket {
        let target = self.target.clone();
        self.ticket(folder_id, target, false)
    }

    fn ticket(&mut self, folder_id: &str, breadcrumb: Breadcrumb, navigation: bool) -> Ticket {
        self.next_request += 1;
        Ticket {
            session: self.session,
            request: self.next_request,
            navigation,
            folder_id: folder_id.to_string(),
            breadcrumb,
        }
    }

    fn accepts(&self, ticket: &Ticket) -> bool {
        self.view.is_some()
            && self.session == ticket.session
            && self.target == ticket.breadcrumb
            && ticket.request > self.applied_request
    }

    fn open_view(&self) -> Result<&ExplorerState, ExplorerError> {
        self.view.as_ref().ok_or(ExplorerError::NotOpen)
    }
}

#[derive(Debug)]
struct Ticket {
    session: u64,
    request: u64,
    navigation: bool,
    folder_id: String,
    breadcrumb: Breadcrumb,
}

/// Navigates the directory tree of one virtual folder at a time.
pub struct ExplorerNavigator<S> {
    service: Arc<S>,
    events: EventBus,
    inner: Arc<RwLock<NavigatorInner>>,
}

impl<S> Clone for ExplorerNavigator<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            events: self.events.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: VirtualFolderService> ExplorerNavigator<S> {
    pub fn new(service: Arc<S>, events: EventBus) -> Self {
        Self {
            service,
            events,
            inner: Arc::new(RwLock::new(NavigatorInner::default())),
        }
    }

    /// Open `folder_id` at its root and fetch the root listing.
    ///
    /// The folder counts as open even when the first listing fails.
    pub async fn open(&self, folder_id: &str) -> Result<(), ExplorerError> {
        let ticket = {
            let mut inner = self.inner.write().await;
            inner.session += 1;
            inner.view = Some(ExplorerState {
                folder_id: folder_id.to_string(),
                breadcrumb: Breadcrumb::root(),
                entries: Vec::new(),
            });
            inner.navigate(folder_id, Breadcrumb::root())
        };

        info!(folder_id = %folder_id, "Opened folder");
        self.events.emit(ExplorerEvent::ExplorerOpened {
            folder_id: folder_id.to_string(),
        });

        self.fetch(ticket).await
    }

    /// Enter the sub-directory `segment` of the current directory.
    pub async fn descend(&self, segment: &str) -> Result<(), ExplorerError> {
        let ticket = {
            let mut inner = self.inner.write().await;
            let view = inner.open_view()?;
            let entry = view
                .entry(segment)
                .ok_or_else(|| ValidationError::NoSuchEntry(segment.to_string()))?;
            if !entry.is_directory() {
                return Err(ValidationError::NotADirectory(segment.to_string()).into());
            }
            let folder_id = view.folder_id.clone();
            let target = view.breadcrumb.descend(segment);
            inner.navigate(&folder_id, target)
        };

        self.fetch(ticket).await
    }

    /// Jump back to the breadcrumb segment `target`.
    ///
    /// Returns `Ok(false)` without fetching when `target` is not part of the
    /// current breadcrumb.
    pub async fn goto_breadcrumb(&self, target: &str) -> Result<bool, ExplorerError> {
        let ticket = {
            let mut inner = self.inner.write().await;
            let view = inner.open_view()?;
            let Some(breadcrumb) = view.breadcrumb.truncate_to(target) else {
                debug!(target = %target, "Breadcrumb target not in path");
                return Ok(false);
            };
            let folder_id = view.folder_id.clone();
            inner.navigate(&folder_id, breadcrumb)
        };

        self.fetch(ticket).await?;
        Ok(true)
    }

    /// Re-fetch the directory navigation is currently at.
    pub async fn refresh(&self) -> Result<(), ExplorerError> {
        let ticket = {
            let mut inner = self.inner.write().await;
            let folder_id = inner.open_view()?.folder_id.clone();
            inner.reload(&folder_id)
        };

        self.fetch(ticket).await
    }

    /// Create directory `name` inside the current directory.
    ///
    /// On success the make-directory dialog is dismissed and the listing
    /// refreshed; the breadcrumb does not move.
    pub async fn make_directory(&self, name: &str) -> Result<(), ExplorerError> {
        if !is_safe_name(name) {
            let err = ValidationError::InvalidName(name.to_string());
            self.events.notify_error(err.to_string());
            return Err(err.into());
        }

        let (folder_id, path) = {
            let inner = self.inner.read().await;
            let view = inner.open_view()?;
            (view.folder_id.clone(), view.breadcrumb.join_with(name))
        };

        if let Err(err) = self.service.make_directory(&path, &folder_id).await {
            self.events
                .report_service_error("Failed to create directory", &err);
            return Err(err.into());
        }

        info!(folder_id = %folder_id, path = %path, "Directory created");
        self.events
            .emit(ExplorerEvent::DialogDismissed(Dialog::MakeDirectory));
        self.refresh().await
    }

    /// Download `filename` from the current directory into `dest_dir`.
    pub async fn download(
        &self,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ExplorerError> {
        let (folder_id, path) = {
            let inner = self.inner.read().await;
            let view = inner.open_view()?;
            let entry = view
                .entry(filename)
                .ok_or_else(|| ValidationError::NoSuchEntry(filename.to_string()))?;
            if !entry.is_downloadable() {
                return Err(ValidationError::NotDownloadable(filename.to_string()).into());
            }
            (view.folder_id.clone(), view.breadcrumb.join_with(filename))
        };

        let data = match self.service.download(&path, &folder_id).await {
            Ok(data) => data,
            Err(err) => {
                self.events.report_service_error("Failed to download", &err);
                return Err(err.into());
            }
        };

        let saved = save_atomic(dest_dir, filename, &data).await?;
        info!(folder_id = %folder_id, path = %path, saved = ?saved, "Downloaded file");
        self.events.emit(ExplorerEvent::Downloaded {
            filename: filename.to_string(),
            path: saved.clone(),
        });
        Ok(saved)
    }

    /// Close the open folder. Listings still in flight are discarded.
    pub async fn close(&self) {
        let closed = {
            let mut inner = self.inner.write().await;
            inner.session += 1;
            inner.target = Breadcrumb::root();
            inner.view.take()
        };

        if let Some(view) = closed {
            info!(folder_id = %view.folder_id, "Closed folder");
            self.events.emit(ExplorerEvent::ExplorerClosed {
                folder_id: view.folder_id,
            });
        }
    }

    /// Snapshot of the open folder, if any.
    pub async fn state(&self) -> Option<ExplorerState> {
        self.inner.read().await.view.clone()
    }

    /// Open folder id and the breadcrumb shown to the operator.
    pub async fn location(&self) -> Option<(String, Breadcrumb)> {
        self.inner
            .read()
            .await
            .view
            .as_ref()
            .map(|v| (v.folder_id.clone(), v.breadcrumb.clone()))
    }

    async fn fetch(&self, ticket: Ticket) -> Result<(), ExplorerError> {
        let path = ticket.breadcrumb.join();
        debug!(folder_id = %ticket.folder_id, path = %path, request = ticket.request, "Fetching listing");

        let result = match self.service.list_files(&path, &ticket.folder_id).await {
            Ok(listing) => listing.entries().map_err(ServiceError::from),
            Err(err) => Err(err),
        };

        let mut inner = self.inner.write().await;
        match result {
            Ok(entries) => {
                if !inner.accepts(&ticket) {
                    debug!(path = %path, request = ticket.request, "Discarding stale listing");
                    return Ok(());
                }
                inner.applied_request = ticket.request;
                let count = entries.len();
                if let Some(view) = inner.view.as_mut() {
                    view.breadcrumb = ticket.breadcrumb;
                    view.entries = entries;
                }
                drop(inner);

                self.events.emit(ExplorerEvent::ListingUpdated {
                    folder_id: ticket.folder_id,
                    path,
                    entries: count,
                });
                Ok(())
            }
            Err(err) => {
                let current = inner.session == ticket.session;
                if current && ticket.navigation && inner.latest_navigation == ticket.request {
                    // Navigation did not happen; head back to what is shown.
                    if let Some(shown) = inner.view.as_ref().map(|v| v.breadcrumb.clone()) {
                        inner.target = shown;
                    }
                }
                drop(inner);

                if current {
                    self.events.report_service_error("Failed to list files", &err);
                } else {
                    debug!(path = %path, error = %err, "Ignoring listing failure of closed session");
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Notification, NotificationKind};
    use crate::service::{MemoryFolderService, Operation, ServiceCall};
    use tempfile::TempDir;
    use tokio::sync::broadcast::Receiver;

    fn service() -> Arc<MemoryFolderService> {
        let service = MemoryFolderService::new().with_folder("f1", "rwd");
        service.add_directory("f1", "docs");
        service.add_directory("f1", "docs/2024");
        service.add_directory("f1", "media");
        service.add_file("f1", "readme.txt", "hello");
        service.add_file("f1", "docs/a.txt", "alpha");
        Arc::new(service)
    }

    fn navigator(
        service: &Arc<MemoryFolderService>,
    ) -> (ExplorerNavigator<MemoryFolderService>, Receiver<ExplorerEvent>) {
        let events = EventBus::default();
        let rx = events.subscribe();
        (ExplorerNavigator::new(Arc::clone(service), events), rx)
    }

    fn names(state: &ExplorerState) -> Vec<&str> {
        state.entries.iter().map(|e| e.filename.as_str()).collect()
    }

    async fn wait_for_listings(service: &MemoryFolderService, count: usize) {
        while service.count(Operation::ListFiles) < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_open_lists_root() {
        let service = service();
        let (nav, _rx) = navigator(&service);

        nav.open("f1").await.unwrap();

        let state = nav.state().await.unwrap();
        assert_eq!(state.folder_id, "f1");
        assert_eq!(state.breadcrumb.segments(), ["."]);
        assert_eq!(names(&state), ["docs", "media", "readme.txt"]);
        assert_eq!(
            service.calls(),
            vec![ServiceCall::ListFiles {
                path: ".".to_string(),
                id: "f1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_descend_then_breadcrumb_back() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        nav.open("f1").await.unwrap();

        nav.descend("docs").await.unwrap();
        nav.descend("2024").await.unwrap();
        let state = nav.state().await.unwrap();
        assert_eq!(state.breadcrumb.join(), "./docs/2024");

        assert!(nav.goto_breadcrumb("docs").await.unwrap());
        let state = nav.state().await.unwrap();
        assert_eq!(state.breadcrumb.segments(), [".", "docs"]);
        assert_eq!(names(&state), ["2024", "a.txt"]);
    }

    #[tokio::test]
    async fn test_descend_requires_directory_entry() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        nav.open("f1").await.unwrap();

        let err = nav.descend("readme.txt").await.unwrap_err();
        assert!(matches!(
            err,
            ExplorerError::Validation(ValidationError::NotADirectory(_))
        ));
        let err = nav.descend("missing").await.unwrap_err();
        assert!(matches!(
            err,
            ExplorerError::Validation(ValidationError::NoSuchEntry(_))
        ));
        assert_eq!(service.count(Operation::ListFiles), 1);
    }

    #[tokio::test]
    async fn test_closed_navigator_rejects_navigation() {
        let service = service();
        let (nav, _rx) = navigator(&service);

        assert!(matches!(
            nav.descend("docs").await,
            Err(ExplorerError::NotOpen)
        ));
        assert!(matches!(nav.refresh().await, Err(ExplorerError::NotOpen)));
        assert!(nav.state().await.is_none());
    }

    #[tokio::test]
    async fn test_goto_unknown_breadcrumb_is_noop() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        nav.open("f1").await.unwrap();
        nav.descend("docs").await.unwrap();
        let before = nav.state().await;

        assert!(!nav.goto_breadcrumb("zzz").await.unwrap());

        assert_eq!(nav.state().await, before);
        assert_eq!(service.count(Operation::ListFiles), 2);
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_state() {
        let service = service();
        let (nav, mut rx) = navigator(&service);
        nav.open("f1").await.unwrap();
        let before = nav.state().await;
        while rx.try_recv().is_ok() {}

        service.fail_next(
            Operation::ListFiles,
            ServiceError::Rejected("permission denied".to_string()),
        );
        assert!(nav.descend("docs").await.is_err());

        assert_eq!(nav.state().await, before);
        assert_eq!(
            rx.try_recv().unwrap(),
            ExplorerEvent::Notification(Notification {
                kind: NotificationKind::Error,
                message: "permission denied".to_string(),
            })
        );

        // A refresh after the failure stays at the shown directory.
        nav.refresh().await.unwrap();
        assert_eq!(nav.state().await.unwrap().breadcrumb, Breadcrumb::root());
    }

    #[tokio::test]
    async fn test_stale_listing_is_discarded() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        nav.open("f1").await.unwrap();

        let gate = service.hold_listing("./docs");
        let slow = {
            let nav = nav.clone();
            tokio::spawn(async move { nav.descend("docs").await })
        };
        wait_for_listings(&service, 2).await;

        nav.descend("media").await.unwrap();
        gate.notify_one();
        slow.await.unwrap().unwrap();

        let state = nav.state().await.unwrap();
        assert_eq!(state.breadcrumb.join(), "./media");
        assert!(state.entries.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_pending_navigation() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        nav.open("f1").await.unwrap();

        let gate = service.hold_listing("./docs");
        let pending = {
            let nav = nav.clone();
            tokio::spawn(async move { nav.descend("docs").await })
        };
        wait_for_listings(&service, 2).await;

        service.fail_next(Operation::ListFiles, ServiceError::Unreported);
        assert!(nav.refresh().await.is_err());

        gate.notify_one();
        pending.await.unwrap().unwrap();

        let state = nav.state().await.unwrap();
        assert_eq!(state.breadcrumb.join(), "./docs");
        assert_eq!(names(&state), ["2024", "a.txt"]);

        // The next refresh stays where navigation landed.
        nav.refresh().await.unwrap();
        assert_eq!(nav.state().await.unwrap().breadcrumb.join(), "./docs");
    }

    #[tokio::test]
    async fn test_close_discards_late_listing() {
        let service = service();
        let (nav, _rx) = navigator(&service);

        let gate = service.hold_listing(".");
        let opening = {
            let nav = nav.clone();
            tokio::spawn(async move { nav.open("f1").await })
        };
        wait_for_listings(&service, 1).await;

        nav.close().await;
        gate.notify_one();
        opening.await.unwrap().unwrap();

        assert!(nav.state().await.is_none());
    }

    #[tokio::test]
    async fn test_make_directory_refreshes_in_place() {
        let service = service();
        let (nav, mut rx) = navigator(&service);
        nav.open("f1").await.unwrap();
        nav.descend("docs").await.unwrap();
        while rx.try_recv().is_ok() {}

        nav.make_directory("new").await.unwrap();

        assert!(service.has_directory("f1", "docs/new"));
        let state = nav.state().await.unwrap();
        assert_eq!(state.breadcrumb.join(), "./docs");
        assert!(names(&state).contains(&"new"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ExplorerEvent::DialogDismissed(Dialog::MakeDirectory)
        );
    }

    #[tokio::test]
    async fn test_make_directory_failure_keeps_dialog_open() {
        let service = service();
        let (nav, mut rx) = navigator(&service);
        nav.open("f1").await.unwrap();
        nav.descend("docs").await.unwrap();
        let before = nav.state().await;
        while rx.try_recv().is_ok() {}

        service.fail_next(
            Operation::MakeDirectory,
            ServiceError::Rejected("exists".to_string()),
        );
        let err = nav.make_directory("new").await.unwrap_err();

        assert!(matches!(
            err,
            ExplorerError::Service(ServiceError::Rejected(ref message)) if message == "exists"
        ));
        assert!(!service.has_directory("f1", "docs/new"));
        assert_eq!(nav.state().await, before);
        assert_eq!(
            rx.try_recv().unwrap(),
            ExplorerEvent::Notification(Notification {
                kind: NotificationKind::Error,
                message: "exists".to_string(),
            })
        );
        // No dismissal and no refresh.
        assert!(rx.try_recv().is_err());
        assert_eq!(service.count(Operation::ListFiles), 2);
    }

    #[tokio::test]
    async fn test_make_directory_rejects_invalid_name() {
        let service = service();
        let (nav, mut rx) = navigator(&service);
        nav.open("f1").await.unwrap();
        while rx.try_recv().is_ok() {}

        let err = nav.make_directory("a b").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(service.count(Operation::MakeDirectory), 0);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ExplorerEvent::Notification(Notification {
                kind: NotificationKind::Error,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_download_saves_file() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        let dir = TempDir::new().unwrap();
        nav.open("f1").await.unwrap();
        nav.descend("docs").await.unwrap();

        let saved = nav.download("a.txt", dir.path()).await.unwrap();

        assert_eq!(saved, dir.path().join("a.txt"));
        assert_eq!(std::fs::read(saved).unwrap(), b"alpha");
        assert!(service.calls().contains(&ServiceCall::Download {
            path: "./docs/a.txt".to_string(),
            id: "f1".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_download_rejects_directory() {
        let service = service();
        let (nav, _rx) = navigator(&service);
        let dir = TempDir::new().unwrap();
        nav.open("f1").await.unwrap();

        let err = nav.download("docs", dir.path()).await.unwrap_err();
        assert!(matches!(
            err,
            ExplorerError::Validation(ValidationError::NotDownloadable(_))
        ));
        assert_eq!(service.count(Operation::Download), 0);
    }
}
