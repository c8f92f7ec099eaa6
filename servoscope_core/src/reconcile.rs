//! The keyed reconciliation engine.
//!
//! Maps a sequence of data values onto a persistent collection of visual
//! object handles. Each call reports which handles were created (so the
//! caller can apply one-time setup), the full ordered list bound to the data
//! (for per-frame updates) and which handles were destroyed (so the backend
//! can free their resources).
//!
//! # Identity
//!
//! Collections are addressed by a root scope plus a `kind.tag` selector.
//! Within a collection, handles are keyed either by position (the i-th datum
//! owns the i-th handle, in creation order) or by an explicit key. As long as
//! a position or key persists across calls, it keeps the same handle, which
//! is what lets per-object state such as a stroke colour survive redraws.
//!
//! ```text
//! call 1: data [a, b, c]      -> all [h1, h2, h3]  created [h1, h2, h3]
//! call 2: data [a', b']       -> all [h1, h2]      removed [h3]
//! call 3: data [a", b", c"]   -> all [h1, h2, h4]  created [h4]
//! ```

use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of one visual object.
///
/// Uses UUID v4 so handles from different scopes can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisualHandle(Uuid);

impl VisualHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for VisualHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Root under which collections of handles live (typically one plot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derives a nested scope, e.g. `servo` -> `servo/3`.
    pub fn child(&self, name: impl fmt::Display) -> Self {
        Self(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which sub-collection of a scope a call addresses: `kind` or `kind.tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    kind: String,
    tag: Option<String>,
}

impl Selector {
    /// Parses `kind` or `kind.tag`, trimming surrounding whitespace.
    pub fn parse(pattern: &str) -> Result<Self, ReconcileError> {
        let mismatch = || ReconcileError::SelectorMismatch(pattern.to_string());

        let mut parts = pattern.split('.');
        let kind = parts.next().map(str::trim).unwrap_or_default();
        let tag = parts.next().map(str::trim);

        if parts.next().is_some() || kind.is_empty() || tag.is_some_and(str::is_empty) {
            return Err(mismatch());
        }

        Ok(Self {
            kind: kind.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl FromStr for Selector {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}.{}", self.kind, tag),
            None => f.write_str(&self.kind),
        }
    }
}

/// A handle bound to the datum it represents this frame.
#[derive(Debug)]
pub struct Bound<'d, T> {
    pub handle: VisualHandle,

    /// Position of the datum in the reconciled sequence
    pub index: usize,

    pub datum: &'d T,
}

impl<T> Clone for Bound<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Bound<'_, T> {}

/// Outcome of one reconciliation.
#[derive(Debug)]
pub struct Join<'d, T> {
    /// Handles that did not exist before this call
    pub created: Vec<Bound<'d, T>>,

    /// Exactly one handle per datum, in data order
    pub all: Vec<Bound<'d, T>>,

    /// Handles destroyed by this call
    pub removed: Vec<VisualHandle>,
}

impl<T> Join<'_, T> {
    /// Handles in `all`, without their data.
    pub fn handles(&self) -> Vec<VisualHandle> {
        self.all.iter().map(|b| b.handle).collect()
    }
}

#[derive(Debug)]
enum Collection {
    /// Handles in creation order
    Positional(Vec<VisualHandle>),
    /// Handles in the order of the last keyed call
    Keyed(Vec<(String, VisualHandle)>),
}

impl Collection {
    fn handles(&self) -> Vec<VisualHandle> {
        match self {
            Collection::Positional(handles) => handles.clone(),
            Collection::Keyed(entries) => entries.iter().map(|(_, h)| *h).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Collection::Positional(handles) => handles.is_empty(),
            Collection::Keyed(entries) => entries.is_empty(),
        }
    }
}

/// Owner of every scope's key -> handle mapping.
#[derive(Debug, Default)]
pub struct Reconciler {
    collections: HashMap<(ScopeId, Selector), Collection>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles `data` against the collection by position.
    ///
    /// The i-th datum is bound to the i-th existing handle. Extra data get new
    /// handles (reported in `created`); surplus handles are destroyed from
    /// the end (reported in `removed`).
    pub fn reconcile<'d, T>(
        &mut self,
        scope: &ScopeId,
        selector: &str,
        data: &'d [T],
    ) -> Result<Join<'d, T>, ReconcileError> {
        let selector = Selector::parse(selector)?;
        let conflict = || ReconcileError::KeyModeConflict(format!("{scope} {selector}"));

        let collection = self
            .collections
            .entry((scope.clone(), selector.clone()))
            .or_insert_with(|| Collection::Positional(Vec::new()));

        if let Collection::Keyed(entries) = collection {
            if !entries.is_empty() {
                return Err(conflict());
            }
            *collection = Collection::Positional(Vec::new());
        }
        let Collection::Positional(handles) = collection else {
            return Err(conflict());
        };

        let mut created = Vec::new();
        let removed = if data.len() < handles.len() {
            handles.split_off(data.len())
        } else {
            for (index, datum) in data.iter().enumerate().skip(handles.len()) {
                let handle = VisualHandle::new();
                handles.push(handle);
                created.push(Bound { handle, index, datum });
            }
            Vec::new()
        };

        let all = handles
            .iter()
            .zip(data)
            .enumerate()
            .map(|(index, (&handle, datum))| Bound { handle, index, datum })
            .collect();

        Ok(Join { created, all, removed })
    }

    /// Reconciles `data` against the collection by explicit key.
    ///
    /// A datum whose key was present in the previous call keeps that key's
    /// handle regardless of position; unseen keys get new handles; keys that
    /// disappeared have their handles destroyed. `all` follows data order.
    pub fn reconcile_keyed<'d, T, F>(
        &mut self,
        scope: &ScopeId,
        selector: &str,
        data: &'d [T],
        key_fn: F,
    ) -> Result<Join<'d, T>, ReconcileError>
    where
        F: Fn(&T) -> String,
    {
        let selector = Selector::parse(selector)?;

        let keys: Vec<String> = data.iter().map(&key_fn).collect();
        let mut seen = HashSet::with_capacity(keys.len());
        if let Some(dup) = keys.iter().find(|k| !seen.insert(k.as_str())) {
            return Err(ReconcileError::DuplicateKey {
                selector: selector.to_string(),
                key: dup.clone(),
            });
        }

        let conflict = || ReconcileError::KeyModeConflict(format!("{scope} {selector}"));
        let collection = self
            .collections
            .entry((scope.clone(), selector.clone()))
            .or_insert_with(|| Collection::Keyed(Vec::new()));

        if let Collection::Positional(handles) = collection {
            if !handles.is_empty() {
                return Err(conflict());
            }
            *collection = Collection::Keyed(Vec::new());
        }
        let Collection::Keyed(entries) = collection else {
            return Err(conflict());
        };

        let mut previous: HashMap<&str, VisualHandle> =
            entries.iter().map(|(k, h)| (k.as_str(), *h)).collect();

        let mut created = Vec::new();
        let mut all = Vec::with_capacity(data.len());
        let mut next = Vec::with_capacity(data.len());

        for (index, (datum, key)) in data.iter().zip(&keys).enumerate() {
            let bound = match previous.remove(key.as_str()) {
                Some(handle) => Bound { handle, index, datum },
                None => {
                    let bound = Bound { handle: VisualHandle::new(), index, datum };
                    created.push(bound);
                    bound
                }
            };
            next.push((key.clone(), bound.handle));
            all.push(bound);
        }

        let removed = entries
            .iter()
            .filter(|(k, _)| previous.contains_key(k.as_str()))
            .map(|(_, h)| *h)
            .collect();

        drop(previous);
        *entries = next;

        Ok(Join { created, all, removed })
    }

    /// Current handles of a collection, in binding order.
    pub fn handles(&self, scope: &ScopeId, selector: &str) -> Result<Vec<VisualHandle>, ReconcileError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .collections
            .get(&(scope.clone(), selector))
            .map(Collection::handles)
            .unwrap_or_default())
    }

    /// Destroys every collection under `scope`, returning the retired handles.
    pub fn retire_scope(&mut self, scope: &ScopeId) -> Vec<VisualHandle> {
        let mut retired = Vec::new();
        self.collections.retain(|(s, _), collection| {
            if s == scope {
                retired.extend(collection.handles());
                false
            } else {
                true
            }
        });
        retired
    }

    /// Total number of live handles across all scopes.
    pub fn len(&self) -> usize {
        self.collections.values().map(|c| c.handles().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.values().all(Collection::is_empty)
    }
}
