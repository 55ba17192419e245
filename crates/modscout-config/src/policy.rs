//! Access policy: namespace allow-list and module deny-list.
//!
//! An [`AccessPolicy`] is built once at startup from the `[policy]` section
//! and is immutable afterwards. The engine evaluates it before any other
//! component touches a module reference, and uses it to drop search results
//! that fall outside the allow-list.
//!
//! Namespaces and module identifiers are compared case-insensitively. Module
//! identifiers on the deny-list are `namespace/name/target`; any version
//! segment on the evaluated identifier is ignored.

use std::collections::BTreeSet;
use std::fmt;

/// Allow-list entry that admits every namespace.
pub const ANY_NAMESPACE: &str = "*";

/// The curated namespace allowed when no policy is configured.
pub const DEFAULT_NAMESPACE: &str = "terraform-ibm-modules";

/// Why a module was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The module's namespace is not on the allow-list.
    NamespaceNotAllowed { namespace: String },
    /// The module family is explicitly excluded.
    ModuleExcluded { module_id: String },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NamespaceNotAllowed { namespace } => {
                write!(f, "namespace '{namespace}' is not in the allowed namespaces")
            }
            DenialReason::ModuleExcluded { module_id } => {
                write!(f, "module '{module_id}' is excluded by policy")
            }
        }
    }
}

/// The result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The module may be used.
    Allowed,
    /// The module must not be used.
    Denied(DenialReason),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }
}

/// Immutable allow/deny policy for registry modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    allowed_namespaces: BTreeSet<String>,
    excluded_modules: BTreeSet<String>,
}

impl AccessPolicy {
    /// Create a policy from an allow-list of namespaces and a deny-list of
    /// `namespace/name/target` identifiers.
    pub fn new<A, E>(allowed_namespaces: A, excluded_modules: E) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            allowed_namespaces: allowed_namespaces
                .into_iter()
                .map(|ns| ns.as_ref().trim().to_ascii_lowercase())
                .filter(|ns| !ns.is_empty())
                .collect(),
            excluded_modules: excluded_modules
                .into_iter()
                .map(|id| family_id(id.as_ref()))
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// A policy that admits every namespace and excludes nothing.
    pub fn allow_all() -> Self {
        Self::new([ANY_NAMESPACE], std::iter::empty::<&str>())
    }

    /// Add a namespace to the allow-list.
    pub fn allow_namespace(mut self, namespace: &str) -> Self {
        self.allowed_namespaces
            .insert(namespace.trim().to_ascii_lowercase());
        self
    }

    /// Add a module family to the deny-list.
    pub fn exclude_module(mut self, module_id: &str) -> Self {
        self.excluded_modules.insert(family_id(module_id));
        self
    }

    /// Evaluate a module against the policy.
    ///
    /// The namespace check runs first, so a module that is both outside the
    /// allow-list and excluded reports the namespace reason.
    pub fn evaluate(&self, namespace: &str, module_id: &str) -> PolicyDecision {
        if !self.allows_namespace(namespace) {
            return PolicyDecision::Denied(DenialReason::NamespaceNotAllowed {
                namespace: namespace.to_string(),
            });
        }

        let family = family_id(module_id);
        if self.excluded_modules.contains(&family) {
            return PolicyDecision::Denied(DenialReason::ModuleExcluded { module_id: family });
        }

        PolicyDecision::Allowed
    }

    /// Convenience wrapper around [`evaluate`](Self::evaluate).
    pub fn is_allowed(&self, namespace: &str, module_id: &str) -> bool {
        self.evaluate(namespace, module_id).is_allowed()
    }

    /// Whether the namespace is on the allow-list.
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.allowed_namespaces.contains(ANY_NAMESPACE)
            || self
                .allowed_namespaces
                .contains(&namespace.trim().to_ascii_lowercase())
    }

    pub fn allowed_namespaces(&self) -> impl Iterator<Item = &str> {
        self.allowed_namespaces.iter().map(String::as_str)
    }

    pub fn excluded_modules(&self) -> impl Iterator<Item = &str> {
        self.excluded_modules.iter().map(String::as_str)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new([DEFAULT_NAMESPACE], std::iter::empty::<&str>())
    }
}

/// Reduce an identifier to its lowercased `namespace/name/target` family.
fn family_id(module_id: &str) -> String {
    module_id
        .trim()
        .split('/')
        .take(3)
        .collect::<Vec<_>>()
        .join("/")
        .to_ascii_lowercase()
}
