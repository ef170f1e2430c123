//! Element-set reconciliation.
//!
//! Merges a locally held element set with a previously persisted one. Pure and
//! synchronous: callers fetch and decrypt the remote set first and persist the
//! result afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Tombstones older than this are no longer synced (milliseconds)
pub const DELETED_ELEMENT_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1000;

/// A drawable element as far as reconciliation cares.
///
/// Only identity, revision and ordering fields are interpreted; everything
/// else is carried through untouched in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub version: i64,
    pub version_nonce: i64,
    #[serde(default)]
    pub is_deleted: bool,
    /// Fractional z-index key, compared lexicographically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Last modification time in epoch milliseconds
    #[serde(default)]
    pub updated: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element {
    pub fn new(id: impl Into<String>, version: i64, version_nonce: i64) -> Self {
        Self {
            id: id.into(),
            version,
            version_nonce,
            is_deleted: false,
            index: None,
            updated: 0,
            extra: Map::new(),
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }
}

/// The slice of local editor state that affects reconciliation
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalAppState {
    #[serde(default)]
    pub editing_element_id: Option<String>,
    #[serde(default)]
    pub resizing_element_id: Option<String>,
    #[serde(default)]
    pub new_element_id: Option<String>,
}

impl LocalAppState {
    /// Whether the element is mid-interaction locally and must not be replaced
    pub fn is_in_progress(&self, id: &str) -> bool {
        [
            &self.editing_element_id,
            &self.resizing_element_id,
            &self.new_element_id,
        ]
        .iter()
        .any(|slot| slot.as_deref() == Some(id))
    }
}

/// Sum of element versions; changes whenever any element changes
pub fn scene_version(elements: &[Element]) -> i64 {
    elements.iter().map(|e| e.version).sum()
}

/// Drop tombstones that expired before `now_ms`
pub fn retain_syncable(elements: &mut Vec<Element>, now_ms: i64) {
    elements.retain(|e| !e.is_deleted || now_ms - e.updated <= DELETED_ELEMENT_TIMEOUT_MS);
}

/// Revision order between two copies of the same element. `Greater` means
/// `a` supersedes `b`.
fn compare_revisions(a: &Element, b: &Element) -> Ordering {
    a.version
        .cmp(&b.version)
        // lower nonce wins a version tie
        .then_with(|| b.version_nonce.cmp(&a.version_nonce))
        .then_with(|| a.is_deleted.cmp(&b.is_deleted))
        .then_with(|| a.updated.cmp(&b.updated))
}

fn should_discard_remote(app_state: &LocalAppState, local: &Element, remote: &Element) -> bool {
    app_state.is_in_progress(&local.id) || compare_revisions(local, remote) == Ordering::Greater
}

fn compare_positions(a: &Element, b: &Element) -> Ordering {
    match (&a.index, &b.index) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Merge `local` with `remote`.
///
/// Each identity appears once in the result. The copy with the higher
/// revision wins, except that elements `app_state` marks as in progress keep
/// their local copy. Output is ordered by fractional index, then id, so two
/// peers merging the same inputs produce the same sequence.
pub fn reconcile(local: &[Element], remote: &[Element], app_state: &LocalAppState) -> Vec<Element> {
    let mut local_by_id: HashMap<&str, &Element> = HashMap::with_capacity(local.len());
    for element in local {
        local_by_id.entry(element.id.as_str()).or_insert(element);
    }

    let mut added: HashSet<&str> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged: Vec<Element> = Vec::with_capacity(local.len() + remote.len());

    for remote_element in remote {
        if !added.insert(remote_element.id.as_str()) {
            continue;
        }
        let winner = match local_by_id.get(remote_element.id.as_str()) {
            Some(local_element) if should_discard_remote(app_state, local_element, remote_element) => {
                *local_element
            },
            _ => remote_element,
        };
        merged.push(winner.clone());
    }

    for local_element in local {
        if added.insert(local_element.id.as_str()) {
            merged.push(local_element.clone());
        }
    }

    merged.sort_by(compare_positions);
    merged
}
