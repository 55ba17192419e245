//! Content shaping: glob filtering and example/submodule classification.

pub mod classify;
pub mod filter;

pub use classify::{Classification, ContentGroup, GroupKind, classify, describe};
pub use filter::{ContentFilter, DEFAULT_EXCLUDES};

use serde::{Deserialize, Serialize};

use crate::reference::ModuleReference;
use crate::repository::{ContentOmission, FileContent, RepositoryRef};

/// Extensions that are never text, skipped without a fetch.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "bmp", "pdf", "zip", "gz", "tgz", "tar", "jar",
    "exe", "dll", "so", "dylib", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "bin",
];

/// Whether a path has a known binary extension.
pub fn has_binary_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// The groups of a module's repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentListing {
    pub module: ModuleReference,
    pub repository: RepositoryRef,
    pub root: ContentGroup,
    pub examples: Vec<ContentGroup>,
    pub submodules: Vec<ContentGroup>,
}

/// Files retrieved for a content request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBundle {
    pub module: ModuleReference,
    pub repository: RepositoryRef,
    /// Requested path, repository-relative.
    pub path: String,
    pub files: Vec<FileContent>,
    pub omitted: Vec<ContentOmission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_extensions() {
        assert!(has_binary_extension("docs/diagram.PNG"));
        assert!(has_binary_extension("release.tar"));
        assert!(!has_binary_extension("main.tf"));
        assert!(!has_binary_extension("Makefile"));
        assert!(!has_binary_extension(".png"));
    }
}
