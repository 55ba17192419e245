//! Module references: parsing, normalization, and version resolution.
//!
//! A [`ModuleReference`] names a module family (`namespace/name/target`) and
//! either a pinned version or "latest". References are only ever created by
//! parsing a caller-supplied identifier verbatim or from fields of a registry
//! response; nothing in the engine guesses an identifier from a search term.
//!
//! ```text
//! terraform-ibm-modules/vpc/ibm          -> Latest
//! terraform-ibm-modules/vpc/ibm/8.4.0    -> Pinned("8.4.0")
//! terraform-ibm-modules/vpc/ibm/v8.4.0   -> Pinned("8.4.0")   (normalized)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::registry::RegistryClient;

/// Which version of a module family a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    /// Resolve to the latest published version at request time.
    Latest,
    /// An explicit published version.
    Pinned(String),
}

impl VersionSpec {
    pub fn as_pinned(&self) -> Option<&str> {
        match self {
            VersionSpec::Pinned(v) => Some(v),
            VersionSpec::Latest => None,
        }
    }
}

/// A parsed, validated, immutable module reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ReferenceRepr", into = "ReferenceRepr")]
pub struct ModuleReference {
    namespace: String,
    name: String,
    target: String,
    version: VersionSpec,
}

/// Cache key for a pinned reference.
///
/// Only obtainable from a [`VersionSpec::Pinned`] reference, so a "latest"
/// lookup can never be stored in a cache keyed by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinnedKey {
    module_id: String,
    version: String,
}

impl fmt::Display for PinnedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module_id, self.version)
    }
}

impl ModuleReference {
    /// Parse `namespace/name/target[/version]`.
    ///
    /// Exactly three or four segments are accepted. Whitespace, empty
    /// segments, path traversal sequences and characters outside the
    /// registry's identifier alphabet are rejected; the input is never
    /// coerced into a different identifier.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let invalid = |reason: String| EngineError::InvalidReference {
            input: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("identifier is empty".to_string()));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(invalid("identifier contains whitespace".to_string()));
        }

        let segments: Vec<&str> = input.split('/').collect();
        if !(3..=4).contains(&segments.len()) {
            return Err(invalid(format!(
                "expected namespace/name/target[/version], got {} segment(s)",
                segments.len()
            )));
        }

        let namespace = identifier_segment("namespace", segments[0]).map_err(&invalid)?;
        let name = identifier_segment("name", segments[1]).map_err(&invalid)?;
        let target = identifier_segment("target", segments[2]).map_err(&invalid)?;
        let version = match segments.get(3) {
            Some(raw) => VersionSpec::Pinned(version_segment(raw).map_err(&invalid)?),
            None => VersionSpec::Latest,
        };

        Ok(Self {
            namespace,
            name,
            target,
            version,
        })
    }

    /// Build a reference from registry-provided fields, applying the same
    /// validation as [`parse`](Self::parse).
    pub fn new(
        namespace: &str,
        name: &str,
        target: &str,
        version: Option<&str>,
    ) -> Result<Self, EngineError> {
        let rendered = match version {
            Some(v) => format!("{namespace}/{name}/{target}/{v}"),
            None => format!("{namespace}/{name}/{target}"),
        };
        Self::parse(&rendered)
    }

    /// A pinned copy of this reference at `version`.
    pub fn pinned(&self, version: &str) -> Result<Self, EngineError> {
        let version = version_segment(version).map_err(|reason| EngineError::InvalidReference {
            input: format!("{}/{version}", self.module_id()),
            reason,
        })?;
        Ok(Self {
            version: VersionSpec::Pinned(version),
            ..self.clone()
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target platform (the registry's "provider" segment).
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version_spec(&self) -> &VersionSpec {
        &self.version
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_pinned()
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.version, VersionSpec::Pinned(_))
    }

    /// The version-less family identifier `namespace/name/target`.
    pub fn module_id(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.target)
    }

    /// Cache key, present only for pinned references.
    pub fn pinned_key(&self) -> Option<PinnedKey> {
        self.version.as_pinned().map(|version| PinnedKey {
            module_id: self.module_id(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.target)?;
        if let VersionSpec::Pinned(version) = &self.version {
            write!(f, "/{version}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ModuleReference {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical form of an identifier: `parse(input)?.to_string()`.
pub fn normalize(input: &str) -> Result<String, EngineError> {
    ModuleReference::parse(input).map(|r| r.to_string())
}

/// Pin a reference, asking the registry for the latest version if needed.
///
/// Pinned references are returned unchanged without any network call.
pub async fn resolve(
    reference: &ModuleReference,
    registry: &dyn RegistryClient,
) -> Result<ModuleReference, EngineError> {
    if reference.is_pinned() {
        return Ok(reference.clone());
    }

    let version = registry.latest_version(reference).await?;
    debug!(module = %reference, %version, "Resolved latest version");
    reference.pinned(&version)
}

fn identifier_segment(label: &str, raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err(format!("{label} segment is empty"));
    }
    if raw.contains("..") {
        return Err(format!("{label} segment contains a path traversal sequence"));
    }
    if let Some(c) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("{label} segment contains invalid character {c:?}"));
    }
    if !raw.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(format!("{label} segment must start with a letter or digit"));
    }
    Ok(raw.to_ascii_lowercase())
}

fn version_segment(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("version segment is empty".to_string());
    }
    if raw.contains("..") {
        return Err("version segment contains a path traversal sequence".to_string());
    }
    let trimmed = match raw.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => raw,
    };
    if let Some(c) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')))
    {
        return Err(format!("version segment contains invalid character {c:?}"));
    }
    if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(format!("version {raw:?} must start with a digit"));
    }
    Ok(trimmed.to_string())
}

/// Wire form of a [`ModuleReference`]; `version` is `null` for latest.
#[derive(Serialize, Deserialize)]
struct ReferenceRepr {
    namespace: String,
    name: String,
    target: String,
    version: Option<String>,
}

impl From<ModuleReference> for ReferenceRepr {
    fn from(r: ModuleReference) -> Self {
        let version = r.version.as_pinned().map(str::to_string);
        Self {
            namespace: r.namespace,
            name: r.name,
            target: r.target,
            version,
        }
    }
}

impl TryFrom<ReferenceRepr> for ModuleReference {
    type Error = EngineError;

    fn try_from(repr: ReferenceRepr) -> Result<Self, Self::Error> {
        ModuleReference::new(
            &repr.namespace,
            &repr.name,
            &repr.target,
            repr.version.as_deref(),
        )
    }
}
