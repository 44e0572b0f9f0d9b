//! Local-disk storage service.
//!
//! Folders are directories below a storage root, one sub-directory per
//! host: `<root>/<host>/<name>`. The folder registry is persisted as JSON in
//! `<root>/folders.json`.
//!
//! # Security
//!
//! Every path is resolved below its folder directory. `..` segments are
//! rejected up front and existing paths are canonicalized so symlinks cannot
//! point outside the folder.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use bytes::Bytes;
use protocol::{
    is_safe_name, split_path, DirEntry, FileListing, FolderInfo, HostList, PermissionSet,
    VirtualFolder,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ServiceError, UploadPayload, VirtualFolderService};

/// Name of the folder registry file inside the storage root.
pub const REGISTRY_FILE: &str = "folders.json";

/// Registry wrapper for serialization.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryData {
    /// Version of the registry format.
    version: u32,
    folders: Vec<VirtualFolder>,
}

/// [`VirtualFolderService`] backed by the local filesystem.
pub struct LocalFolderService {
    root: PathBuf,
    hosts: HostList,
    folders: RwLock<Vec<VirtualFolder>>,
}

impl LocalFolderService {
    /// Opens (or initializes) a storage root.
    pub async fn open<P: AsRef<Path>>(root: P, hosts: HostList) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create storage root: {}", root.display()))?;

        let registry = root.join(REGISTRY_FILE);
        let folders = if fs::try_exists(&registry).await.unwrap_or(false) {
            let contents = fs::read_to_string(&registry).await.with_context(|| {
                format!("Failed to read folder registry: {}", registry.display())
            })?;
            let data: RegistryData = serde_json::from_str(&contents).with_context(|| {
                format!("Failed to parse folder registry: {}", registry.display())
            })?;
            data.folders
        } else {
            debug!("Folder registry not found at {:?}, starting empty", registry);
            Vec::new()
        };

        info!(
            root = %root.display(),
            folders = folders.len(),
            "Opened local storage"
        );

        Ok(Self {
            root,
            hosts,
            folders: RwLock::new(folders),
        })
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_dir(&self, folder: &VirtualFolder) -> PathBuf {
        self.root.join(&folder.host).join(&folder.name)
    }

    async fn folder(&self, id: &str) -> Result<VirtualFolder, ServiceError> {
        self.folders
            .read()
            .await
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::Rejected(format!("folder not found: {}", id)))
    }

    /// Resolve an existing path inside folder `id`.
    async fn resolve(&self, id: &str, path: &str) -> Result<PathBuf, ServiceError> {
        let base = self.folder_dir(&self.folder(id).await?);
        let candidate = join_segments(&base, path)?;

        let base = canonicalize(&base).await?;
        let canonical = canonicalize(&candidate).await?;
        if !canonical.starts_with(&base) {
            return Err(ServiceError::Rejected(format!(
                "path is outside the folder: {}",
                path
            )));
        }
        Ok(canonical)
    }

    /// Resolve a path that is about to be created inside folder `id`.
    async fn resolve_for_creation(&self, id: &str, path: &str) -> Result<PathBuf, ServiceError> {
        let segments = split_path(path).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        let Some((name, parents)) = segments.split_last() else {
            return Err(ServiceError::Rejected(format!("invalid path: {}", path)));
        };
        let parent = self.resolve(id, &parents.join("/")).await?;
        Ok(parent.join(name))
    }

    async fn save_registry(&self, folders: &[VirtualFolder]) -> Result<(), ServiceError> {
        let data = RegistryData {
            version: 1,
            folders: folders.to_vec(),
        };
        let contents = serde_json::to_string_pretty(&data)
            .map_err(|e| ServiceError::Rejected(format!("failed to encode registry: {}", e)))?;
        write_atomic(&self.root.join(REGISTRY_FILE), contents.as_bytes()).await
    }
}

fn join_segments(base: &Path, path: &str) -> Result<PathBuf, ServiceError> {
    let segments = split_path(path).map_err(|e| ServiceError::Rejected(e.to_string()))?;
    Ok(segments.iter().fold(base.to_path_buf(), |p, s| p.join(s)))
}

async fn canonicalize(path: &Path) -> Result<PathBuf, ServiceError> {
    fs::canonicalize(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ServiceError::Rejected(format!("no such file or directory: {}", display_name(path)))
        } else {
            io_error("failed to resolve path", e)
        }
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn io_error(context: &str, err: std::io::Error) -> ServiceError {
    ServiceError::Rejected(format!("{}: {}", context, err))
}

/// Write through a temporary sibling file and rename it into place.
async fn write_atomic(destination: &Path, data: &[u8]) -> Result<(), ServiceError> {
    let parent = destination
        .parent()
        .ok_or_else(|| ServiceError::Rejected("destination has no parent".to_string()))?;
    let temp_path = parent.join(format!(
        ".upload_{:x}_{}.tmp",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
        rand::random::<u32>()
    ));

    fs::write(&temp_path, data)
        .await
        .map_err(|e| io_error("failed to write file", e))?;
    if let Err(e) = fs::rename(&temp_path, destination).await {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file after rename failure");
        }
        return Err(io_error("failed to store file", e));
    }
    Ok(())
}

/// Render a mode string such as `drwxr-xr-x`.
fn mode_string(metadata: &Metadata) -> String {
    let kind = if metadata.is_dir() {
        'd'
    } else if metadata.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };

    #[cfg(unix)]
    let bits = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode()
    };
    #[cfg(not(unix))]
    let bits: u32 = if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    };

    let mut mode = String::with_capacity(10);
    mode.push(kind);
    for shift in [6u32, 3, 0] {
        let triple = (bits >> shift) & 0o7;
        mode.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        mode.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        mode.push(if triple & 0o1 != 0 { 'x' } else { '-' });
    }
    mode
}

fn ctime_secs(metadata: &Metadata) -> f64 {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn count_files(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => count_files(&entry.path()),
            Ok(t) if t.is_file() => 1,
            _ => 0,
        })
        .sum()
}

impl VirtualFolderService for LocalFolderService {
    async fn list_folders(&self) -> Result<Vec<VirtualFolder>, ServiceError> {
        Ok(self.folders.read().await.clone())
    }

    async fn list_hosts(&self) -> Result<HostList, ServiceError> {
        Ok(self.hosts.clone())
    }

    async fn create_folder(&self, name: &str, host: &str) -> Result<(), ServiceError> {
        if !is_safe_name(name) {
            return Err(ServiceError::Rejected(format!(
                "invalid folder name: {}",
                name
            )));
        }
        if !self.hosts.is_allowed(host) {
            return Err(ServiceError::Rejected(format!(
                "host {} is not allowed",
                host
            )));
        }

        let mut folders = self.folders.write().await;
        if folders.iter().any(|f| f.name == name) {
            return Err(ServiceError::Rejected(format!(
                "folder {} already exists",
                name
            )));
        }

        let folder = VirtualFolder {
            id: name.to_string(),
            name: name.to_string(),
            host: host.to_string(),
            permission: PermissionSet::parse("rwd"),
        };
        fs::create_dir_all(self.folder_dir(&folder))
            .await
            .map_err(|e| io_error("failed to create folder", e))?;

        folders.push(folder);
        self.save_registry(&folders).await?;
        info!(folder = name, host = host, "Created folder");
        Ok(())
    }

    async fn delete_folder(&self, id: &str) -> Result<(), ServiceError> {
        let mut folders = self.folders.write().await;
        let index = folders
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| ServiceError::Rejected(format!("folder not found: {}", id)))?;

        let dir = self.folder_dir(&folders[index]);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(io_error("failed to delete folder", e));
            }
        }

        folders.remove(index);
        self.save_registry(&folders).await?;
        info!(folder = id, "Deleted folder");
        Ok(())
    }

    async fn get_folder_info(&self, id: &str) -> Result<FolderInfo, ServiceError> {
        let folder = self.folder(id).await?;
        let dir = self.folder_dir(&folder);
        let num_files = tokio::task::spawn_blocking(move || count_files(&dir))
            .await
            .map_err(|_| ServiceError::Unreported)?;

        Ok(FolderInfo {
            id: folder.id,
            host: folder.host,
            num_files,
            is_owner: true,
            permission: folder.permission,
        })
    }

    async fn list_files(&self, path: &str, id: &str) -> Result<FileListing, ServiceError> {
        let dir = self.resolve(id, path).await?;
        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|e| io_error("failed to list directory", e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| io_error("failed to list directory", e))?
        {
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.starts_with(".upload_") && filename.ends_with(".tmp") {
                continue;
            }
            // Skip entries we can't stat
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            entries.push(DirEntry {
                filename,
                mode: mode_string(&metadata),
                ctime: ctime_secs(&metadata),
                size: if metadata.is_file() { metadata.len() } else { 0 },
            });
        }

        // Directories first, then files, both by name
        entries.sort_by(|a, b| match (a.is_directory(), b.is_directory()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.filename.to_lowercase().cmp(&b.filename.to_lowercase()),
        });

        Ok(FileListing::from_entries(&entries)?)
    }

    async fn make_directory(&self, path: &str, id: &str) -> Result<(), ServiceError> {
        let target = self.resolve_for_creation(id, path).await?;
        fs::create_dir(&target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ServiceError::Rejected(format!("{} already exists", display_name(&target)))
            } else {
                io_error("failed to create directory", e)
            }
        })
    }

    async fn upload(&self, payload: UploadPayload, id: &str) -> Result<(), ServiceError> {
        let destination = self.resolve_for_creation(id, &payload.path).await?;
        if fs::metadata(&destination)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(ServiceError::Rejected(format!(
                "{} is a directory",
                payload.filename
            )));
        }

        write_atomic(&destination, &payload.data).await?;
        debug!(folder = id, path = %payload.path, size = payload.data.len(), "Stored upload");
        Ok(())
    }

    async fn download(&self, path: &str, id: &str) -> Result<Bytes, ServiceError> {
        let source = self.resolve(id, path).await?;
        let metadata = fs::metadata(&source)
            .await
            .map_err(|e| io_error("failed to stat file", e))?;
        if metadata.is_dir() {
            return Err(ServiceError::Rejected(format!(
                "{} is a directory",
                display_name(&source)
            )));
        }

        let data = fs::read(&source)
            .await
            .map_err(|e| io_error("failed to read file", e))?;
        Ok(Bytes::from(data))
    }
}
