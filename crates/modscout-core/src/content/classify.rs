//! Partition a repository tree into root, example and submodule groups.
//!
//! ```text
//! main.tf                    -> root
//! examples/<name>/...        -> example <name>
//! modules/<name>/...         -> submodule <name>
//! ```
//!
//! Groups appear in the order their first entry appears in the tree. Paths
//! in [`ContentGroup::files`] are repository-relative.

use serde::{Deserialize, Serialize};

use crate::repository::TreeEntry;

pub const EXAMPLES_DIR: &str = "examples";
pub const MODULES_DIR: &str = "modules";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Root,
    Example,
    Submodule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGroup {
    pub kind: GroupKind,
    pub name: String,
    /// Directory of the group; `""` for the root.
    pub path: String,
    /// First prose line of the group's README.
    pub description: Option<String>,
    pub files: Vec<String>,
}

impl ContentGroup {
    fn new(kind: GroupKind, name: &str, path: String) -> Self {
        Self {
            kind,
            name: name.to_string(),
            path,
            description: None,
            files: Vec::new(),
        }
    }

    /// The README directly inside this group's directory, if any.
    pub fn readme_path(&self) -> Option<&str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|f| parent_dir(f) == self.path)
            .find(|f| is_readme(file_name(f)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub root: ContentGroup,
    pub examples: Vec<ContentGroup>,
    pub submodules: Vec<ContentGroup>,
}

impl Classification {
    pub fn groups(&self) -> impl Iterator<Item = &ContentGroup> {
        std::iter::once(&self.root)
            .chain(self.examples.iter())
            .chain(self.submodules.iter())
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut ContentGroup> {
        std::iter::once(&mut self.root)
            .chain(self.examples.iter_mut())
            .chain(self.submodules.iter_mut())
    }
}

/// Classify a tree. Paths must be relative to the module root.
pub fn classify(tree: &[TreeEntry]) -> Classification {
    let mut classification = Classification {
        root: ContentGroup::new(GroupKind::Root, "root", String::new()),
        examples: Vec::new(),
        submodules: Vec::new(),
    };

    for entry in tree {
        let mut segments = entry.path.split('/');
        let (Some(first), second, rest) = (segments.next(), segments.next(), segments.next()) else {
            continue;
        };

        let (groups, kind) = match first {
            EXAMPLES_DIR => (&mut classification.examples, GroupKind::Example),
            MODULES_DIR => (&mut classification.submodules, GroupKind::Submodule),
            _ => {
                if second.is_none() && entry.is_file() {
                    classification.root.files.push(entry.path.clone());
                }
                continue;
            }
        };

        // `examples/<name>` directory itself, or a file nested below it.
        let Some(name) = second.filter(|n| !n.is_empty()) else {
            continue;
        };
        if rest.is_none() && entry.is_file() {
            // A loose file such as `examples/README.md` belongs to no group.
            continue;
        }

        let index = match groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                groups.push(ContentGroup::new(kind, name, format!("{first}/{name}")));
                groups.len() - 1
            }
        };
        if entry.is_file() {
            groups[index].files.push(entry.path.clone());
        }
    }

    classification
}

/// One-line description from README text: the first non-empty line that is
/// not a heading, badge or image line, HTML, or a setext underline.
pub fn describe(readme: &str) -> Option<String> {
    let lines: Vec<&str> = readme.lines().map(str::trim).collect();

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() || is_markup(line) || is_setext_underline(line) {
            continue;
        }
        if lines.get(i + 1).is_some_and(|next| is_setext_underline(next)) {
            continue;
        }
        return Some(line.to_string());
    }
    None
}

fn is_markup(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("![") || line.starts_with("[![") || line.starts_with('<')
}

fn is_setext_underline(line: &str) -> bool {
    !line.is_empty() && (line.chars().all(|c| c == '=') || line.chars().all(|c| c == '-'))
}

fn is_readme(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "readme" || lower.strip_prefix("readme.").is_some_and(|ext| !ext.contains('.'))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(groups: &[ContentGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.name.as_str()).collect()
    }

    #[test]
    fn test_classify_basic_layout() {
        let tree = vec![
            TreeEntry::file("examples/basic/main.tf", Some(10)),
            TreeEntry::file("examples/complete/main.tf", Some(10)),
            TreeEntry::file("modules/submod/main.tf", Some(10)),
            TreeEntry::file("main.tf", Some(10)),
        ];
        let c = classify(&tree);

        assert_eq!(c.root.files, vec!["main.tf"]);
        assert_eq!(names(&c.examples), vec!["basic", "complete"]);
        assert_eq!(names(&c.submodules), vec!["submod"]);
        assert_eq!(c.examples[0].path, "examples/basic");
        assert_eq!(c.examples[0].files, vec!["examples/basic/main.tf"]);
        assert_eq!(c.submodules[0].kind, GroupKind::Submodule);
    }

    #[test]
    fn test_group_order_follows_first_appearance() {
        let tree = vec![
            TreeEntry::directory("examples"),
            TreeEntry::directory("examples/zeta"),
            TreeEntry::file("examples/alpha/main.tf", None),
            TreeEntry::file("examples/zeta/main.tf", None),
            TreeEntry::file("examples/zeta/nested/extra.tf", None),
        ];
        let c = classify(&tree);
        assert_eq!(names(&c.examples), vec!["zeta", "alpha"]);
        assert_eq!(
            c.examples[0].files,
            vec!["examples/zeta/main.tf", "examples/zeta/nested/extra.tf"]
        );
    }

    #[test]
    fn test_loose_files_and_other_dirs() {
        let tree = vec![
            TreeEntry::file("examples/README.md", None),
            TreeEntry::file("scripts/build.sh", None),
            TreeEntry::directory("scripts"),
            TreeEntry::file("versions.tf", None),
        ];
        let c = classify(&tree);
        assert!(c.examples.is_empty());
        assert!(c.submodules.is_empty());
        assert_eq!(c.root.files, vec!["versions.tf"]);
        assert_eq!(c.groups().count(), 1);
    }

    #[test]
    fn test_readme_path_only_in_own_directory() {
        let tree = vec![
            TreeEntry::file("examples/basic/nested/README.md", None),
            TreeEntry::file("examples/basic/main.tf", None),
            TreeEntry::file("examples/basic/Readme.md", None),
            TreeEntry::file("main.tf", None),
        ];
        let c = classify(&tree);
        assert_eq!(c.examples[0].readme_path(), Some("examples/basic/Readme.md"));
        assert_eq!(c.root.readme_path(), None);
    }

    #[test]
    fn test_describe_skips_markup() {
        let readme = "\
# Terraform IBM VPC

[![Build](https://example.com/badge.svg)](https://example.com)
![diagram](diagram.png)
<!-- BEGIN OVERVIEW HOOK -->

This module provisions a VPC with subnets.

More text.
";
        assert_eq!(
            describe(readme),
            Some("This module provisions a VPC with subnets.".to_string())
        );
    }

    #[test]
    fn test_describe_setext_heading() {
        let readme = "Basic example\n=============\n\nA minimal VPC.\n";
        assert_eq!(describe(readme), Some("A minimal VPC.".to_string()));
    }

    #[test]
    fn test_describe_nothing_useful() {
        assert_eq!(describe(""), None);
        assert_eq!(describe("# Title\n\n<p>html</p>\n"), None);
    }
}
