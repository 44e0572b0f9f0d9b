//! In-memory storage service.
//!
//! Keeps folders and their file trees in memory, records every call, and can
//! be told to fail or stall specific operations. Used by the test suites and
//! handy for driving the explorer without a cluster.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use protocol::{
    split_path, DirEntry, FileListing, FolderInfo, HostList, PermissionSet, VirtualFolder,
};
use tokio::sync::Notify;

use super::{ServiceError, UploadPayload, VirtualFolderService};

/// Service operations, used to target injected failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListFolders,
    ListHosts,
    CreateFolder,
    DeleteFolder,
    GetFolderInfo,
    ListFiles,
    MakeDirectory,
    Upload,
    Download,
}

/// A recorded service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    ListFolders,
    ListHosts,
    CreateFolder { name: String, host: String },
    DeleteFolder { id: String },
    GetFolderInfo { id: String },
    ListFiles { path: String, id: String },
    MakeDirectory { path: String, id: String },
    Upload { path: String, id: String },
    Download { path: String, id: String },
}

impl ServiceCall {
    pub fn operation(&self) -> Operation {
        match self {
            ServiceCall::ListFolders => Operation::ListFolders,
            ServiceCall::ListHosts => Operation::ListHosts,
            ServiceCall::CreateFolder { .. } => Operation::CreateFolder,
            ServiceCall::DeleteFolder { .. } => Operation::DeleteFolder,
            ServiceCall::GetFolderInfo { .. } => Operation::GetFolderInfo,
            ServiceCall::ListFiles { .. } => Operation::ListFiles,
            ServiceCall::MakeDirectory { .. } => Operation::MakeDirectory,
            ServiceCall::Upload { .. } => Operation::Upload,
            ServiceCall::Download { .. } => Operation::Download,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Directory,
    File(Bytes),
}

#[derive(Debug)]
struct MemoryState {
    folders: Vec<VirtualFolder>,
    hosts: HostList,
    /// Folder id -> normalized path (`docs/a.txt`) -> node.
    trees: HashMap<String, BTreeMap<String, Node>>,
    failures: HashMap<Operation, VecDeque<ServiceError>>,
    calls: Vec<ServiceCall>,
    /// One-shot gates keyed by listing path.
    listing_gates: HashMap<String, Arc<Notify>>,
}

/// In-memory [`VirtualFolderService`].
#[derive(Debug)]
pub struct MemoryFolderService {
    state: Mutex<MemoryState>,
}

impl Default for MemoryFolderService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFolderService {
    /// Creates an empty service offering the single host `local`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                folders: Vec::new(),
                hosts: HostList {
                    default: "local".to_string(),
                    allowed: vec!["local".to_string()],
                },
                trees: HashMap::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
                listing_gates: HashMap::new(),
            }),
        }
    }

    /// Adds a folder with the given raw permission string.
    pub fn with_folder(self, id: &str, permission: &str) -> Self {
        {
            let mut state = self.lock();
            let host = state.hosts.default.clone();
            state.folders.push(VirtualFolder {
                id: id.to_string(),
                name: id.to_string(),
                host,
                permission: PermissionSet::parse(permission),
            });
            state.trees.entry(id.to_string()).or_default();
        }
        self
    }

    /// Replaces the host list.
    pub fn with_hosts(self, hosts: HostList) -> Self {
        self.lock().hosts = hosts;
        self
    }

    /// Adds a directory (and any missing parents) to a folder.
    pub fn add_directory(&self, id: &str, path: &str) {
        let mut state = self.lock();
        let tree = state.trees.entry(id.to_string()).or_default();
        let mut current = String::new();
        for segment in split_path(path).unwrap_or_default() {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            tree.entry(current.clone()).or_insert(Node::Directory);
        }
    }

    /// Adds a file to a folder. Parent directories must already exist.
    pub fn add_file(&self, id: &str, path: &str, data: impl Into<Bytes>) {
        let key = normalize(path).unwrap_or_default();
        self.lock()
            .trees
            .entry(id.to_string())
            .or_default()
            .insert(key, Node::File(data.into()));
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: ServiceError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Stalls the next listing of `path` until the returned handle is notified.
    pub fn hold_listing(&self, path: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock()
            .listing_gates
            .insert(path.to_string(), Arc::clone(&gate));
        gate
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    /// Number of calls made to `operation`.
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Stored contents of a file, if present.
    pub fn file(&self, id: &str, path: &str) -> Option<Bytes> {
        let key = normalize(path).ok()?;
        match self.lock().trees.get(id)?.get(&key)? {
            Node::File(data) => Some(data.clone()),
            Node::Directory => None,
        }
    }

    /// Whether a directory exists in a folder.
    pub fn has_directory(&self, id: &str, path: &str) -> bool {
        let Ok(key) = normalize(path) else {
            return false;
        };
        matches!(
            self.lock().trees.get(id).and_then(|t| t.get(&key)),
            Some(Node::Directory)
        )
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and pops an injected failure for it, if any.
    fn begin(&self, call: ServiceCall) -> Result<(), ServiceError> {
        let mut state = self.lock();
        let operation = call.operation();
        state.calls.push(call);
        match state.failures.get_mut(&operation).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn tree_mut<'a>(
        state: &'a mut MemoryState,
        id: &str,
    ) -> Result<&'a mut BTreeMap<String, Node>, ServiceError> {
        state
            .trees
            .get_mut(id)
            .ok_or_else(|| ServiceError::Rejected(format!("folder not found: {}", id)))
    }
}

/// `./docs/a.txt` -> `docs/a.txt`; the folder root becomes the empty string.
fn normalize(path: &str) -> Result<String, ServiceError> {
    split_path(path)
        .map(|segments| segments.join("/"))
        .map_err(|e| ServiceError::Rejected(e.to_string()))
}

fn parent_of(key: &str) -> &str {
    key.rfind('/').map(|i| &key[..i]).unwrap_or("")
}

fn name_of(key: &str) -> &str {
    key.rfind('/').map(|i| &key[i + 1..]).unwrap_or(key)
}

fn parent_exists(tree: &BTreeMap<String, Node>, key: &str) -> bool {
    let parent = parent_of(key);
    parent.is_empty() || matches!(tree.get(parent), Some(Node::Directory))
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl VirtualFolderService for MemoryFolderService {
    async fn list_folders(&self) -> Result<Vec<VirtualFolder>, ServiceError> {
        self.begin(ServiceCall::ListFolders)?;
        Ok(self.lock().folders.clone())
    }

    async fn list_hosts(&self) -> Result<HostList, ServiceError> {
        self.begin(ServiceCall::ListHosts)?;
        Ok(self.lock().hosts.clone())
    }

    async fn create_folder(&self, name: &str, host: &str) -> Result<(), ServiceError> {
        self.begin(ServiceCall::CreateFolder {
            name: name.to_string(),
            host: host.to_string(),
        })?;

        let mut state = self.lock();
        if !state.hosts.is_allowed(host) {
            return Err(ServiceError::Rejected(format!(
                "host {} is not allowed",
                host
            )));
        }
        if state.folders.iter().any(|f| f.name == name) {
            return Err(ServiceError::Rejected(format!(
                "folder {} already exists",
                name
            )));
        }
        state.folders.push(VirtualFolder {
            id: name.to_string(),
            name: name.to_string(),
            host: host.to_string(),
            permission: PermissionSet::parse("rwd"),
        });
        state.trees.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_folder(&self, id: &str) -> Result<(), ServiceError> {
        self.begin(ServiceCall::DeleteFolder { id: id.to_string() })?;

        let mut state = self.lock();
        let before = state.folders.len();
        state.folders.retain(|f| f.id != id);
        if state.folders.len() == before {
            return Err(ServiceError::Rejected(format!("folder not found: {}", id)));
        }
        state.trees.remove(id);
        Ok(())
    }

    async fn get_folder_info(&self, id: &str) -> Result<FolderInfo, ServiceError> {
        self.begin(ServiceCall::GetFolderInfo { id: id.to_string() })?;

        let state = self.lock();
        let folder = state
            .folders
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| ServiceError::Rejected(format!("folder not found: {}", id)))?;
        let num_files = state
            .trees
            .get(id)
            .map(|t| t.values().filter(|n| matches!(n, Node::File(_))).count())
            .unwrap_or(0);

        Ok(FolderInfo {
            id: folder.id.clone(),
            host: folder.host.clone(),
            num_files: num_files as u64,
            is_owner: true,
            permission: folder.permission.clone(),
        })
    }

    async fn list_files(&self, path: &str, id: &str) -> Result<FileListing, ServiceError> {
        self.begin(ServiceCall::ListFiles {
            path: path.to_string(),
            id: id.to_string(),
        })?;

        let gate = self.lock().listing_gates.remove(path);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let dir = normalize(path)?;
        let mut state = self.lock();
        let tree = Self::tree_mut(&mut state, id)?;
        if !dir.is_empty() && !matches!(tree.get(&dir), Some(Node::Directory)) {
            return Err(ServiceError::Rejected(format!("no such directory: {}", path)));
        }

        let ctime = now_secs();
        let entries: Vec<DirEntry> = tree
            .iter()
            .filter(|(key, _)| !key.is_empty() && parent_of(key) == dir)
            .map(|(key, node)| match node {
                Node::Directory => DirEntry {
                    filename: name_of(key).to_string(),
                    mode: "drwxr-xr-x".to_string(),
                    ctime,
                    size: 4096,
                },
                Node::File(data) => DirEntry {
                    filename: name_of(key).to_string(),
                    mode: "-rw-r--r--".to_string(),
                    ctime,
                    size: data.len() as u64,
                },
            })
            .collect();

        Ok(FileListing::from_entries(&entries)?)
    }

    async fn make_directory(&self, path: &str, id: &str) -> Result<(), ServiceError> {
        self.begin(ServiceCall::MakeDirectory {
            path: path.to_string(),
            id: id.to_string(),
        })?;

        let key = normalize(path)?;
        let mut state = self.lock();
        let tree = Self::tree_mut(&mut state, id)?;
        if key.is_empty() || tree.contains_key(&key) {
            return Err(ServiceError::Rejected(format!("{} already exists", path)));
        }
        if !parent_exists(tree, &key) {
            return Err(ServiceError::Rejected(format!("no such directory: {}", path)));
        }
        tree.insert(key, Node::Directory);
        Ok(())
    }

    async fn upload(&self, payload: UploadPayload, id: &str) -> Result<(), ServiceError> {
        self.begin(ServiceCall::Upload {
            path: payload.path.clone(),
            id: id.to_string(),
        })?;

        let key = normalize(&payload.path)?;
        let mut state = self.lock();
        let tree = Self::tree_mut(&mut state, id)?;
        if !parent_exists(tree, &key) {
            return Err(ServiceError::Rejected(format!(
                "no such directory: {}",
                payload.path
            )));
        }
        if matches!(tree.get(&key), Some(Node::Directory)) {
            return Err(ServiceError::Rejected(format!(
                "{} is a directory",
                payload.path
            )));
        }
        tree.insert(key, Node::File(payload.data));
        Ok(())
    }

    async fn download(&self, path: &str, id: &str) -> Result<Bytes, ServiceError> {
        self.begin(ServiceCall::Download {
            path: path.to_string(),
            id: id.to_string(),
        })?;

        let key = normalize(path)?;
        let mut state = self.lock();
        match Self::tree_mut(&mut state, id)?.get(&key) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Directory) => Err(ServiceError::Rejected(format!(
                "{} is a directory",
                path
            ))),
            None => Err(ServiceError::Rejected(format!("no such file: {}", path))),
        }
    }
}
