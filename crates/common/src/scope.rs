//! # Scopes
//!
//! A scope path names the objects an action applies to:
//!
//! ```text
//! root.user_id[.resource[.resource_id]]
//! ```
//!
//! - **root** is a closed set ([`Root`]): `storage`, `compute`
//! - **user_id** is the owning user; a grant is always scoped to at least
//!   `root.user_id`
//! - **resource** is drawn from the root's closed resource list
//! - **resource_id** is free-form
//!
//! Broader paths include narrower ones: a grant on `storage.u1.files`
//! authorizes a check on `storage.u1.files.docs` for the same action.
//!
//! ## Construction
//!
//! [`Scopes::for_owner`] is the strict constructor used when a token or
//! service account is created. Decoding from the wire is lenient (see
//! [`Scopes::from_raw_lenient`]) so a root or action added later by the issuer
//! never wedges an older consumer.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire form of a scope grant: scope path to list of action names.
pub type RawScopes = BTreeMap<String, Vec<String>>;

/// Top-level namespace of a scope path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Root {
    Storage,
    Compute,
}

impl Root {
    pub const ALL: [Root; 2] = [Root::Storage, Root::Compute];

    pub fn as_str(&self) -> &'static str {
        match self {
            Root::Storage => "storage",
            Root::Compute => "compute",
        }
    }

    /// Resources that may appear in the third segment under this root.
    pub fn resources(&self) -> &'static [&'static str] {
        match self {
            Root::Storage => &["files", "shares"],
            Root::Compute => &["containers", "volumes"],
        }
    }
}

impl FromStr for Root {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Root::ALL
            .into_iter()
            .find(|root| root.as_str() == s)
            .ok_or_else(|| ScopeError::UnknownRoot(s.to_string()))
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action a grant may authorize. There is no inheritance between actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ScopeError::UnknownAction(s.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structurally valid scope path.
///
/// Equality, ordering and hashing follow the underlying string, so a
/// `BTreeMap<ScopePath, _>` can be queried with a plain `&str`.
#[derive(Debug, Clone)]
pub struct ScopePath {
    raw: String,
    root: Root,
}

impl ScopePath {
    pub const MIN_SEGMENTS: usize = 2;
    pub const MAX_SEGMENTS: usize = 4;

    /// Parse a path, checking segment count, root and resource.
    ///
    /// Ownership is not checked here; see [`Scopes::for_owner`].
    pub fn parse(s: &str) -> Result<Self, ScopeError> {
        let segments: Vec<&str> = s.split('.').collect();
        if !(Self::MIN_SEGMENTS..=Self::MAX_SEGMENTS).contains(&segments.len()) {
            return Err(ScopeError::SegmentCount(s.to_string()));
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ScopeError::EmptySegment(s.to_string()));
        }

        let root: Root = segments[0].parse()?;
        if let Some(resource) = segments.get(2) {
            if !root.resources().contains(resource) {
                return Err(ScopeError::UnknownResource {
                    root,
                    resource: resource.to_string(),
                });
            }
        }

        Ok(Self {
            raw: s.to_string(),
            root,
        })
    }

    pub fn root(&self) -> Root {
        self.root
    }

    pub fn user_id(&self) -> &str {
        self.raw.split('.').nth(1).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ScopePath {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ScopePath {}

impl PartialOrd for ScopePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScopePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Hash for ScopePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl Borrow<str> for ScopePath {
    fn borrow(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ScopePath {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A set of granted permissions: scope path to the actions allowed on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scopes(BTreeMap<ScopePath, BTreeSet<Action>>);

impl Scopes {
    /// Build a grant for `owner_id`, rejecting anything a user may not mint
    /// for themselves.
    ///
    /// Every path must parse, every path's user segment must equal
    /// `owner_id`, and every action list must be non-empty and known.
    pub fn for_owner(raw: &RawScopes, owner_id: &str) -> Result<Self, ScopeError> {
        if raw.is_empty() {
            return Err(ScopeError::Empty);
        }

        let mut grants = BTreeMap::new();
        for (path, actions) in raw {
            let path = ScopePath::parse(path)?;
            if path.user_id() != owner_id {
                return Err(ScopeError::ForeignUser {
                    scope: path.to_string(),
                    owner: owner_id.to_string(),
                });
            }
            if actions.is_empty() {
                return Err(ScopeError::NoActions(path.to_string()));
            }
            let actions = actions
                .iter()
                .map(|action| action.parse())
                .collect::<Result<BTreeSet<Action>, _>>()?;
            grants.insert(path, actions);
        }

        Ok(Self(grants))
    }

    /// Decode a grant received from another service.
    ///
    /// Entries whose path no longer parses are dropped, as are unknown
    /// actions; an entry left with no actions is dropped too.
    pub fn from_raw_lenient(raw: RawScopes) -> Self {
        let mut grants = BTreeMap::new();
        for (path, actions) in raw {
            let path = match ScopePath::parse(&path) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(scope = %path, error = %e, "dropping unparseable scope");
                    continue;
                }
            };
            let actions: BTreeSet<Action> = actions
                .iter()
                .filter_map(|action| match action.parse() {
                    Ok(action) => Some(action),
                    Err(_) => {
                        tracing::warn!(scope = %path, action = %action, "dropping unknown action");
                        None
                    }
                })
                .collect();
            if !actions.is_empty() {
                grants.insert(path, actions);
            }
        }
        Self(grants)
    }

    pub fn to_raw(&self) -> RawScopes {
        self.0
            .iter()
            .map(|(path, actions)| {
                (
                    path.to_string(),
                    actions.iter().map(|a| a.as_str().to_string()).collect(),
                )
            })
            .collect()
    }

    /// Does this grant authorize `action` on `scope`?
    ///
    /// Starts at the exact path and strips one trailing segment at a time.
    /// Climbing stops before the bare root: a path without a dot never
    /// matches.
    pub fn has_permission(&self, scope: &str, action: Action) -> bool {
        let mut current = scope;
        loop {
            if !current.contains('.') {
                return false;
            }
            if self
                .0
                .get(current)
                .is_some_and(|actions| actions.contains(&action))
            {
                return true;
            }
            match current.rfind('.') {
                Some(idx) => current = &current[..idx],
                None => return false,
            }
        }
    }

    /// Only the entries under `root`.
    pub fn retain_root(&self, root: Root) -> Scopes {
        Self(
            self.0
                .iter()
                .filter(|(path, _)| path.root() == root)
                .map(|(path, actions)| (path.clone(), actions.clone()))
                .collect(),
        )
    }

    pub fn actions(&self, scope: &str) -> Option<&BTreeSet<Action>> {
        self.0.get(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ScopePath, &BTreeSet<Action>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Scopes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scopes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawScopes::deserialize(deserializer).map(Scopes::from_raw_lenient)
    }
}

/// Free-function form of [`Scopes::has_permission`].
pub fn has_permission(granted: &Scopes, scope: &str, action: Action) -> bool {
    granted.has_permission(scope, action)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope '{0}' must have between 2 and 4 segments")]
    SegmentCount(String),
    #[error("scope '{0}' has an empty segment")]
    EmptySegment(String),
    #[error("unknown scope root '{0}'")]
    UnknownRoot(String),
    #[error("unknown resource '{resource}' for root '{root}'")]
    UnknownResource { root: Root, resource: String },
    #[error("scope '{scope}' does not belong to user '{owner}'")]
    ForeignUser { scope: String, owner: String },
    #[error("scope '{0}' grants no actions")]
    NoActions(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("at least one scope is required")]
    Empty,
}
