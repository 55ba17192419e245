//! Map a registry module to the repository ref holding its source.
//!
//! Accepted source forms:
//!
//! - `https://github.com/owner/repo` (optionally `.git`, trailing `/`)
//! - `github.com/owner/repo`
//! - `git::https://github.com/owner/repo.git?ref=v1.2.3`
//! - `git@github.com:owner/repo.git`
//! - any of the above followed by `//subdir`
//!
//! The ref is the resolved version run through the configured
//! [`TagConvention`], unless the source URL names a `?ref=` explicitly.

use modscout_config::RepositoryConfig;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::reference::VersionSpec;
use crate::registry::ModuleDetail;

use super::RepositoryRef;

/// Ref used when a tag cannot be found for a latest request.
pub const DEFAULT_BRANCH_REF: &str = "HEAD";

/// How published versions map to repository tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagConvention {
    /// Tags carry a prefix, e.g. `v8.4.0`.
    Prefixed(String),
    /// Tags are the bare version, e.g. `8.4.0`.
    Bare,
}

impl TagConvention {
    /// An empty prefix means bare tags.
    pub fn from_prefix(prefix: &str) -> Self {
        if prefix.is_empty() {
            TagConvention::Bare
        } else {
            TagConvention::Prefixed(prefix.to_string())
        }
    }

    pub fn tag_for(&self, version: &str) -> String {
        match self {
            TagConvention::Prefixed(prefix) => format!("{prefix}{version}"),
            TagConvention::Bare => version.to_string(),
        }
    }
}

impl Default for TagConvention {
    fn default() -> Self {
        TagConvention::Prefixed("v".to_string())
    }
}

/// Where to read a module's source from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedRepository {
    pub primary: RepositoryRef,
    /// Default-branch ref to try if `primary` does not exist. Only set for
    /// latest requests.
    pub fallback: Option<RepositoryRef>,
    /// Module root inside the repository, from a `//subdir` source suffix.
    pub subdir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedSource {
    host: String,
    owner: String,
    repo: String,
    subdir: Option<String>,
    reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepositoryLocator {
    host: String,
    convention: TagConvention,
}

impl RepositoryLocator {
    pub fn new(host: impl Into<String>, convention: TagConvention) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            convention,
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(&config.host, TagConvention::from_prefix(&config.tag_prefix))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn convention(&self) -> &TagConvention {
        &self.convention
    }

    /// Locate the repository for `detail`, which was fetched for a request
    /// that asked for `requested`.
    pub fn locate(
        &self,
        detail: &ModuleDetail,
        requested: &VersionSpec,
    ) -> Result<LocatedRepository, EngineError> {
        let unresolvable = || EngineError::SourceUnresolvable {
            module: detail.reference.to_string(),
            source_url: detail.source_url.clone(),
        };

        let parsed = parse_source(&detail.source_url).ok_or_else(unresolvable)?;
        if parsed.host != self.host {
            return Err(unresolvable());
        }

        let explicit_ref = parsed.reference.is_some();
        let reference = match (parsed.reference, detail.reference.version()) {
            (Some(r), _) => r,
            (None, Some(version)) => self.convention.tag_for(version),
            (None, None) => DEFAULT_BRANCH_REF.to_string(),
        };

        let primary = RepositoryRef {
            host: parsed.host,
            owner: parsed.owner,
            repo: parsed.repo,
            reference,
        };

        let fallback = match requested {
            VersionSpec::Latest if !explicit_ref && primary.reference != DEFAULT_BRANCH_REF => {
                Some(primary.at(DEFAULT_BRANCH_REF))
            }
            _ => None,
        };

        Ok(LocatedRepository {
            primary,
            fallback,
            subdir: parsed.subdir,
        })
    }
}

fn parse_source(source: &str) -> Option<ParsedSource> {
    let source = source.trim();
    let source = source.strip_prefix("git::").unwrap_or(source);

    let (source, query) = match source.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (source, None),
    };
    let reference = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "ref")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    });

    let (host, path) = if let Some(rest) = source.strip_prefix("git@") {
        rest.split_once(':')?
    } else {
        let rest = ["https://", "http://", "ssh://git@", "ssh://", "git+https://"]
            .iter()
            .find_map(|scheme| source.strip_prefix(scheme))
            .unwrap_or(source);
        rest.split_once('/')?
    };

    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() || !host.contains('.') {
        return None;
    }

    let (repo_path, subdir) = match path.split_once("//") {
        Some((repo_path, subdir)) => {
            let subdir = subdir.trim_matches('/');
            if subdir.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
                return None;
            }
            (repo_path, Some(subdir.to_string()))
        }
        None => (path, None),
    };

    let mut segments = repo_path.trim_end_matches('/').split('/');
    let owner = segments.next()?;
    let repo = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if !valid_slug_segment(owner) || !valid_slug_segment(repo) {
        return None;
    }

    Some(ParsedSource {
        host,
        owner: owner.to_string(),
        repo: repo.to_string(),
        subdir,
        reference,
    })
}

fn valid_slug_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ModuleReference;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn detail(source: &str) -> ModuleDetail {
        ModuleDetail {
            reference: ModuleReference::parse("terraform-ibm-modules/vpc/ibm/8.4.0").unwrap(),
            description: String::new(),
            source_url: source.to_string(),
            published_at: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            providers: BTreeSet::new(),
            dependencies: Vec::new(),
            submodules: Vec::new(),
            examples: Vec::new(),
        }
    }

    fn locator() -> RepositoryLocator {
        RepositoryLocator::new("github.com", TagConvention::default())
    }

    fn pinned() -> VersionSpec {
        VersionSpec::Pinned("8.4.0".to_string())
    }

    #[test]
    fn test_source_forms() {
        let forms = [
            "https://github.com/terraform-ibm-modules/terraform-ibm-vpc",
            "https://github.com/terraform-ibm-modules/terraform-ibm-vpc/",
            "https://github.com/terraform-ibm-modules/terraform-ibm-vpc.git",
            "github.com/terraform-ibm-modules/terraform-ibm-vpc",
            "git::https://github.com/terraform-ibm-modules/terraform-ibm-vpc.git",
            "git@github.com:terraform-ibm-modules/terraform-ibm-vpc.git",
            "https://www.github.com/terraform-ibm-modules/terraform-ibm-vpc",
        ];
        for form in forms {
            let located = locator().locate(&detail(form), &pinned()).unwrap();
            assert_eq!(
                located.primary.to_string(),
                "github.com/terraform-ibm-modules/terraform-ibm-vpc@v8.4.0",
                "source form {form}"
            );
            assert_eq!(located.fallback, None);
            assert_eq!(located.subdir, None);
        }
    }

    #[test]
    fn test_subdir_and_explicit_ref() {
        let located = locator()
            .locate(
                &detail("git::https://github.com/o/r.git//modules/net?ref=release-1"),
                &VersionSpec::Latest,
            )
            .unwrap();
        assert_eq!(located.primary.reference, "release-1");
        assert_eq!(located.subdir.as_deref(), Some("modules/net"));
        assert_eq!(located.fallback, None);
    }

    #[test]
    fn test_fallback_only_for_latest() {
        let source = "https://github.com/o/r";
        let latest = locator().locate(&detail(source), &VersionSpec::Latest).unwrap();
        assert_eq!(latest.primary.reference, "v8.4.0");
        assert_eq!(latest.fallback.unwrap().reference, DEFAULT_BRANCH_REF);

        let pinned = locator().locate(&detail(source), &pinned()).unwrap();
        assert_eq!(pinned.fallback, None);
    }

    #[test]
    fn test_bare_tag_convention() {
        let locator = RepositoryLocator::new("github.com", TagConvention::from_prefix(""));
        let located = locator.locate(&detail("https://github.com/o/r"), &pinned()).unwrap();
        assert_eq!(located.primary.reference, "8.4.0");
    }

    #[test]
    fn test_unresolvable_sources() {
        let bad = [
            "",
            "not a url",
            "https://gitlab.com/o/r",
            "https://github.com/o",
            "https://github.com/o/r/tree/main",
            "https://github.com/../r",
            "s3::https://bucket.s3.amazonaws.com/module.zip",
            "git::https://github.com/o/r.git//../escape",
        ];
        for source in bad {
            let err = locator().locate(&detail(source), &pinned()).unwrap_err();
            assert!(
                matches!(err, EngineError::SourceUnresolvable { .. }),
                "source {source:?} gave {err:?}"
            );
        }
    }
}
