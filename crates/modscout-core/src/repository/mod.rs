//! Source repository access.
//!
//! [`RepositoryContentClient`] lists trees and fetches file bodies from the
//! content host at a specific ref. [`locator`] turns a registry source URL
//! into the [`RepositoryRef`] to read from.

pub mod github;
pub mod locator;

pub use github::GitHubContentClient;
pub use locator::{LocatedRepository, RepositoryLocator, TagConvention};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::error::EngineError;

/// A repository at a specific ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub host: String,
    pub owner: String,
    pub repo: String,
    /// Tag, branch or `HEAD`.
    pub reference: String,
}

impl RepositoryRef {
    /// `owner/repo` without host or ref.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// `host/owner/repo` without the ref.
    pub fn location(&self) -> String {
        format!("{}/{}/{}", self.host, self.owner, self.repo)
    }

    /// The same repository at another ref.
    pub fn at(&self, reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}@{}", self.host, self.owner, self.repo, self.reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a repository tree, path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size_bytes,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size_bytes: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A fetched text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub text: String,
}

/// Why a requested file was left out of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OmissionReason {
    Binary,
    TooLarge { size_bytes: u64, limit_bytes: u64 },
    FileLimit { limit: usize },
    NotFound,
    Unavailable { detail: String },
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmissionReason::Binary => f.write_str("binary file"),
            OmissionReason::TooLarge {
                size_bytes,
                limit_bytes,
            } => write!(f, "{size_bytes} bytes exceeds the {limit_bytes} byte limit"),
            OmissionReason::FileLimit { limit } => {
                write!(f, "request exceeds the {limit} file limit")
            }
            OmissionReason::NotFound => f.write_str("not found"),
            OmissionReason::Unavailable { detail } => write!(f, "unavailable: {detail}"),
        }
    }
}

/// A file that was requested but not returned. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOmission {
    pub path: String,
    pub reason: OmissionReason,
}

impl ContentOmission {
    pub fn new(path: impl Into<String>, reason: OmissionReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// Result of [`RepositoryContentClient::get_files`]; both lists keep request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBatch {
    pub files: Vec<FileContent>,
    pub omitted: Vec<ContentOmission>,
}

/// API quota as reported by the content host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub reset_epoch_secs: u64,
}

impl RateLimitSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Read-only access to repository trees and file bodies.
///
/// Implementations must be `Send + Sync`. Uses `BoxFuture` for object safety.
pub trait RepositoryContentClient: Send + Sync {
    /// Entries at or below `path` (`""` for the whole tree), host order.
    fn list_tree<'a>(
        &'a self,
        repo: &'a RepositoryRef,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TreeEntry>, EngineError>>;

    /// Fetch file bodies. Per-file problems become omissions, not errors.
    fn get_files<'a>(
        &'a self,
        repo: &'a RepositoryRef,
        paths: &'a [String],
    ) -> BoxFuture<'a, Result<FileBatch, EngineError>>;

    /// Query the current quota without consuming it.
    fn rate_limit(&self) -> BoxFuture<'_, Result<RateLimitSnapshot, EngineError>>;

    /// The quota seen on the most recent API response, if any.
    fn last_rate_limit(&self) -> Option<RateLimitSnapshot>;
}

/// Whether `path` is `root` itself or lies beneath it. `""` matches everything.
pub fn is_within(path: &str, root: &str) -> bool {
    let root = root.trim_matches('/');
    root.is_empty()
        || path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_within() {
        assert!(is_within("main.tf", ""));
        assert!(is_within("examples/basic/main.tf", "examples/basic"));
        assert!(is_within("examples/basic", "examples/basic/"));
        assert!(!is_within("examples/basic-extra/main.tf", "examples/basic"));
        assert!(!is_within("main.tf", "examples"));
    }

    #[test]
    fn test_repository_ref_display() {
        let repo = RepositoryRef {
            host: "github.com".to_string(),
            owner: "terraform-ibm-modules".to_string(),
            repo: "terraform-ibm-vpc".to_string(),
            reference: "v8.4.0".to_string(),
        };
        assert_eq!(
            repo.to_string(),
            "github.com/terraform-ibm-modules/terraform-ibm-vpc@v8.4.0"
        );
        assert_eq!(repo.at("HEAD").reference, "HEAD");
        assert_eq!(repo.slug(), "terraform-ibm-modules/terraform-ibm-vpc");
        assert_eq!(
            repo.location(),
            "github.com/terraform-ibm-modules/terraform-ibm-vpc"
        );
    }

    #[test]
    fn test_omission_serialization() {
        let omission = ContentOmission::new(
            "big.json",
            OmissionReason::TooLarge {
                size_bytes: 10,
                limit_bytes: 5,
            },
        );
        let json = serde_json::to_value(&omission).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "big.json",
                "reason": {"kind": "too_large", "size_bytes": 10, "limit_bytes": 5}
            })
        );
    }
}
