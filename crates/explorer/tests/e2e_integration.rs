//! End-to-end integration tests for the folder explorer.
//!
//! These tests verify complete flows work correctly:
//! - Folder listing, creation and deletion
//! - Navigation and listing order
//! - Uploads and downloads through the panel
//! - The local folder store behind the binary

use std::sync::Arc;

use explorer::config::Config;
use explorer::events::{Dialog, ExplorerEvent, Notification, NotificationKind};
use explorer::files::{LocalFile, UploadStatus};
use explorer::folders::{FOLDER_CREATED, FOLDER_DELETED};
use explorer::panel::DataPanel;
use explorer::protocol::{DirEntry, HostList, PermissionToken, DOWNLOAD_SIZE_LIMIT};
use explorer::service::{
    LocalFolderService, MemoryFolderService, Operation, ServiceCall, ServiceError,
};
use explorer::{ExplorerError, ValidationError};
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

/// Create a test configuration with a temporary download directory.
fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.explorer.download_dir = temp_dir.path().join("downloads");
    config.storage.root = temp_dir.path().join("store");
    config.upload.linger_ms = 0;
    (config, temp_dir)
}

fn memory_panel(
    service: MemoryFolderService,
) -> (DataPanel<MemoryFolderService>, Arc<MemoryFolderService>, TempDir) {
    let (config, temp_dir) = create_test_config();
    let service = Arc::new(service);
    (DataPanel::new(Arc::clone(&service), &config), service, temp_dir)
}

fn drain(rx: &mut Receiver<ExplorerEvent>) -> Vec<ExplorerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn notification(kind: NotificationKind, message: &str) -> ExplorerEvent {
    ExplorerEvent::Notification(Notification {
        kind,
        message: message.to_string(),
    })
}

// =============================================================================
// Folder List Tests
// =============================================================================

#[tokio::test]
async fn test_rw_folder_cannot_be_deleted() {
    let (panel, _service, _temp_dir) =
        memory_panel(MemoryFolderService::new().with_folder("f1", "rw"));

    panel.folders().list().await.unwrap();

    assert!(!panel.folders().capability("f1", PermissionToken::Delete).await);
    assert!(panel.folders().capability("f1", PermissionToken::Read).await);
}

#[tokio::test]
async fn test_wrong_confirmation_never_deletes() {
    let (panel, service, _temp_dir) =
        memory_panel(MemoryFolderService::new().with_folder("f1", "rwd"));
    let mut rx = panel.subscribe();

    let err = panel.delete_folder("f1", "wrong").await.unwrap_err();

    assert!(matches!(
        err,
        ExplorerError::Validation(ValidationError::ConfirmationMismatch)
    ));
    assert_eq!(service.count(Operation::DeleteFolder), 0);
    assert_eq!(
        drain(&mut rx),
        vec![notification(
            NotificationKind::Error,
            "Folder name mismatched. Check your typing."
        )]
    );
}

#[tokio::test]
async fn test_create_then_delete_folder() {
    let (panel, service, _temp_dir) = memory_panel(MemoryFolderService::new().with_hosts(HostList {
        default: "nfs1".to_string(),
        allowed: vec!["nfs1".to_string(), "nfs2".to_string()],
    }));
    let mut rx = panel.subscribe();

    let hosts = panel.folders().list_allowed_hosts().await.unwrap();
    panel
        .folders()
        .create("project-a", &hosts.allowed[1])
        .unwrap()
        .await
        .unwrap();

    let folder = panel.folders().find("project-a").await.unwrap();
    assert_eq!(folder.host, "nfs2");
    let events = drain(&mut rx);
    assert_eq!(events[0], ExplorerEvent::DialogDismissed(Dialog::AddFolder));
    assert!(events.contains(&notification(NotificationKind::Success, FOLDER_CREATED)));

    panel
        .delete_folder("project-a", "project-a")
        .await
        .unwrap()
        .await
        .unwrap();

    assert!(panel.folders().folders().await.is_empty());
    let events = drain(&mut rx);
    assert_eq!(events[0], ExplorerEvent::DialogDismissed(Dialog::DeleteFolder));
    assert!(events.contains(&notification(NotificationKind::Success, FOLDER_DELETED)));
    assert!(service.calls().contains(&ServiceCall::DeleteFolder {
        id: "project-a".to_string(),
    }));
}

#[tokio::test]
async fn test_create_on_disallowed_host_reports_service_message() {
    let (panel, _service, _temp_dir) = memory_panel(MemoryFolderService::new());
    let mut rx = panel.subscribe();

    panel.folders().create("data", "nfs9").unwrap().await.unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            ExplorerEvent::DialogDismissed(Dialog::AddFolder),
            notification(NotificationKind::Error, "host nfs9 is not allowed"),
        ]
    );
    assert!(panel.folders().folders().await.is_empty());
}

// =============================================================================
// Navigation Tests
// =============================================================================

#[tokio::test]
async fn test_open_then_descend_fetches_joined_path() {
    let service = MemoryFolderService::new().with_folder("f1", "rw");
    service.add_directory("f1", "docs");
    let (panel, service, _temp_dir) = memory_panel(service);

    panel.open_folder("f1").await.unwrap();
    panel.explorer().descend("docs").await.unwrap();

    let state = panel.explorer().state().await.unwrap();
    assert_eq!(state.breadcrumb.segments(), [".", "docs"]);
    assert_eq!(
        service.calls().last(),
        Some(&ServiceCall::ListFiles {
            path: "./docs".to_string(),
            id: "f1".to_string(),
        })
    );
}

#[tokio::test]
async fn test_open_resets_breadcrumb() {
    let service = MemoryFolderService::new()
        .with_folder("f1", "rw")
        .with_folder("f2", "r");
    service.add_directory("f1", "a/b");
    let (panel, _service, _temp_dir) = memory_panel(service);

    panel.open_folder("f1").await.unwrap();
    panel.explorer().descend("a").await.unwrap();
    panel.explorer().descend("b").await.unwrap();

    panel.open_folder("f1").await.unwrap();
    assert_eq!(
        panel.explorer().state().await.unwrap().breadcrumb.segments(),
        ["."]
    );

    panel.explorer().descend("a").await.unwrap();
    panel.open_folder("f2").await.unwrap();
    let state = panel.explorer().state().await.unwrap();
    assert_eq!(state.folder_id, "f2");
    assert_eq!(state.breadcrumb.segments(), ["."]);
}

#[tokio::test]
async fn test_goto_breadcrumb_truncates_inclusively() {
    let service = MemoryFolderService::new().with_folder("f1", "rw");
    service.add_directory("f1", "a/b/c");
    let (panel, service, _temp_dir) = memory_panel(service);
    panel.open_folder("f1").await.unwrap();
    for segment in ["a", "b", "c"] {
        panel.explorer().descend(segment).await.unwrap();
    }

    assert!(panel.explorer().goto_breadcrumb("b").await.unwrap());
    assert_eq!(
        panel.explorer().state().await.unwrap().breadcrumb.join(),
        "./a/b"
    );

    let listings = service.count(Operation::ListFiles);
    assert!(!panel.explorer().goto_breadcrumb("c").await.unwrap());
    assert_eq!(service.count(Operation::ListFiles), listings);
}

#[test]
fn test_download_eligibility_boundary() {
    let entry = |size| DirEntry {
        filename: "big.bin".to_string(),
        mode: "-rw-r--r--".to_string(),
        ctime: 0.0,
        size,
    };

    assert!(entry(DOWNLOAD_SIZE_LIMIT - 1).is_downloadable());
    assert!(!entry(DOWNLOAD_SIZE_LIMIT).is_downloadable());
}

// =============================================================================
// Upload Tests
// =============================================================================

#[tokio::test]
async fn test_drop_limit_boundary_through_panel() {
    let (panel, service, _temp_dir) =
        memory_panel(MemoryFolderService::new().with_folder("f1", "rw"));
    panel.open_folder("f1").await.unwrap();
    let limit = 1usize << 20;

    let dropped = panel
        .upload_dropped(vec![
            LocalFile::new("over.bin", vec![0u8; limit + 1]),
            LocalFile::new("exact.bin", vec![0u8; limit]),
        ])
        .await
        .unwrap();
    let selected = panel
        .upload_selected(vec![LocalFile::new("picked.bin", vec![0u8; limit + 1])])
        .await
        .unwrap();
    for handle in dropped.into_iter().chain(selected) {
        handle.await.unwrap();
    }

    assert!(service.file("f1", "exact.bin").is_some());
    assert!(service.file("f1", "picked.bin").is_some());
    assert!(service.file("f1", "over.bin").is_none());
    assert_eq!(service.count(Operation::Upload), 2);
}

#[tokio::test]
async fn test_failed_upload_retry_through_panel() {
    let service = MemoryFolderService::new().with_folder("f1", "rw");
    service.add_directory("f1", "docs");
    let (panel, service, _temp_dir) = memory_panel(service);
    panel.open_folder("f1").await.unwrap();
    panel.explorer().descend("docs").await.unwrap();
    service.fail_next(
        Operation::Upload,
        ServiceError::Rejected("disk quota exceeded".to_string()),
    );

    for handle in panel
        .upload_selected(vec![LocalFile::new("a.txt", "alpha")])
        .await
        .unwrap()
    {
        handle.await.unwrap();
    }
    let task = panel.uploads().tasks().await.remove(0);
    assert_eq!(
        task.status,
        UploadStatus::Failed("disk quota exceeded".to_string())
    );

    // Navigating away does not change where the retry goes.
    panel.explorer().goto_breadcrumb(".").await.unwrap();
    panel.uploads().retry(&task.id).await.unwrap().await.unwrap();

    assert!(panel.uploads().tasks().await.is_empty());
    assert_eq!(service.file("f1", "docs/a.txt").unwrap(), "alpha");
}

#[tokio::test]
async fn test_download_into_configured_directory() {
    let service = MemoryFolderService::new().with_folder("f1", "r");
    service.add_file("f1", "report.pdf", "pdf-bytes");
    let (panel, _service, temp_dir) = memory_panel(service);
    let mut rx = panel.subscribe();

    panel.open_folder("f1").await.unwrap();
    let saved = panel.download("report.pdf", None).await.unwrap();

    assert_eq!(saved, temp_dir.path().join("downloads").join("report.pdf"));
    assert_eq!(std::fs::read(&saved).unwrap(), b"pdf-bytes");
    assert!(drain(&mut rx).contains(&ExplorerEvent::Downloaded {
        filename: "report.pdf".to_string(),
        path: saved,
    }));
}

// =============================================================================
// Local Store Tests
// =============================================================================

#[tokio::test]
async fn test_local_store_full_flow() {
    let (config, temp_dir) = create_test_config();
    let hosts = HostList {
        default: "local".to_string(),
        allowed: vec!["local".to_string()],
    };
    let service = Arc::new(
        LocalFolderService::open(&config.storage.root, hosts.clone())
            .await
            .unwrap(),
    );
    let panel = DataPanel::new(Arc::clone(&service), &config);

    panel.folders().create("team", "local").unwrap().await.unwrap();
    panel.open_folder("team").await.unwrap();
    panel.make_directory("reports").await.unwrap();
    panel.explorer().descend("reports").await.unwrap();

    for handle in panel
        .upload_selected(vec![LocalFile::new("q1.csv", "a,b\n1,2\n")])
        .await
        .unwrap()
    {
        handle.await.unwrap();
    }

    let state = panel.explorer().state().await.unwrap();
    assert_eq!(state.breadcrumb.join(), "./reports");
    assert_eq!(state.entries.len(), 1);
    assert_eq!(state.entries[0].filename, "q1.csv");

    let out = temp_dir.path().join("out");
    let saved = panel.download("q1.csv", Some(&out)).await.unwrap();
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "a,b\n1,2\n");

    let info = panel.folders().info("team").await.unwrap();
    assert_eq!(info.num_files, 1);

    // The registry survives a restart.
    drop(panel);
    let reopened = LocalFolderService::open(&config.storage.root, hosts)
        .await
        .unwrap();
    let panel = DataPanel::new(Arc::new(reopened), &config);
    let folders = panel.folders().list().await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].id, "team");
}
