//! Data definitions exchanged with the storage service.
//!
//! These types mirror what the cluster's storage API returns for virtual
//! folders, storage hosts and directory listings. Directory listings arrive
//! as a JSON document embedded in a string field, see [`FileListing`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Root marker used as the first breadcrumb segment of every folder path.
pub const ROOT_SEGMENT: &str = ".";

/// Separator used when joining breadcrumb segments into a service path.
pub const PATH_SEPARATOR: &str = "/";

/// Size cap for files accepted through drag-and-drop (1 MiB).
pub const DROP_UPLOAD_LIMIT: u64 = 1 << 20;

/// Entries of this size or larger cannot be downloaded (200 MiB).
pub const DOWNLOAD_SIZE_LIMIT: u64 = 209_715_200;

// ============================================================================
// Permissions
// ============================================================================

/// A single raw permission token as stored by the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionToken {
    /// `r`
    Read,
    /// `w`
    Write,
    /// `d`
    Delete,
}

impl PermissionToken {
    /// The single-character wire encoding.
    pub fn as_char(&self) -> char {
        match self {
            PermissionToken::Read => 'r',
            PermissionToken::Write => 'w',
            PermissionToken::Delete => 'd',
        }
    }

    /// Decodes a wire character. Unknown characters yield `None`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'r' => Some(PermissionToken::Read),
            'w' => Some(PermissionToken::Write),
            'd' => Some(PermissionToken::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionToken::Read => "read",
            PermissionToken::Write => "write",
            PermissionToken::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Unordered set of raw permission tokens, encoded on the wire as a string
/// such as `"rw"` or `"rwd"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PermissionSet {
    tokens: BTreeSet<PermissionToken>,
}

impl PermissionSet {
    /// Builds a set from tokens.
    pub fn new(tokens: impl IntoIterator<Item = PermissionToken>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Parses the wire encoding, ignoring characters that are not tokens.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.chars().filter_map(PermissionToken::from_char))
    }

    /// Whether `token` is literally present.
    pub fn contains(&self, token: PermissionToken) -> bool {
        self.tokens.contains(&token)
    }

    /// Iterates the tokens in `r`, `w`, `d` order.
    pub fn iter(&self) -> impl Iterator<Item = PermissionToken> + '_ {
        self.tokens.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl From<String> for PermissionSet {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<PermissionSet> for String {
    fn from(set: PermissionSet) -> Self {
        set.to_string()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "{}", token.as_char())?;
        }
        Ok(())
    }
}

// ============================================================================
// Folders and hosts
// ============================================================================

/// A shared storage container exposed by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFolder {
    /// Folder identifier used to address the folder in every call.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Storage host the folder lives on.
    pub host: String,
    /// Raw permission tokens granted to the current user.
    pub permission: PermissionSet,
}

/// Storage hosts the current user may create folders on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostList {
    /// Host preselected in the creation dialog.
    pub default: String,
    /// All hosts the user may choose from.
    pub allowed: Vec<String>,
}

impl HostList {
    pub fn is_allowed(&self, host: &str) -> bool {
        self.allowed.iter().any(|h| h == host)
    }
}

/// Detailed information about a single folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    pub id: String,
    pub host: String,
    /// Number of files stored in the folder.
    #[serde(rename = "numFiles")]
    pub num_files: u64,
    /// Whether the current user owns the folder.
    pub is_owner: bool,
    pub permission: PermissionSet,
}

// ============================================================================
// Directory listings
// ============================================================================

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub filename: String,
    /// Mode string, e.g. `drwxr-xr-x`. A leading `d` marks a directory.
    pub mode: String,
    /// Creation time (Unix epoch seconds, may carry a fraction).
    pub ctime: f64,
    /// Size in bytes.
    pub size: u64,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.mode.starts_with('d')
    }

    /// Only regular entries below [`DOWNLOAD_SIZE_LIMIT`] can be downloaded.
    pub fn is_downloadable(&self) -> bool {
        !self.is_directory() && self.size < DOWNLOAD_SIZE_LIMIT
    }
}

/// Raw listing response. The service embeds the entries as a JSON-encoded
/// array inside the `files` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub files: String,
}

impl FileListing {
    /// Encode entries into the service's listing format.
    pub fn from_entries(entries: &[DirEntry]) -> Result<Self> {
        Ok(Self {
            files: serde_json::to_string(entries)?,
        })
    }

    /// Decode the embedded entries.
    pub fn entries(&self) -> Result<Vec<DirEntry>> {
        Ok(serde_json::from_str(&self.files)?)
    }
}

// ============================================================================
// Names and paths
// ============================================================================

/// Whether `name` only uses the conservative filename charset accepted for
/// new folders and directories (letters, digits, `-`, `_`).
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Join path segments the way the service expects them (`./a/b`).
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Split a service path back into segments below the root marker.
///
/// `"./docs/a.txt"` yields `["docs", "a.txt"]`. Empty segments and `.`
/// are skipped; `..` is rejected so a path can never leave its folder.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in path.split(PATH_SEPARATOR) {
        match segment {
            "" | ROOT_SEGMENT => continue,
            ".." => return Err(ProtocolError::InvalidSegment(segment.to_string())),
            s if s.contains('\\') => return Err(ProtocolError::InvalidSegment(s.to_string())),
            s => segments.push(s),
        }
    }
    Ok(segments)
}
