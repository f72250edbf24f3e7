//! Immutable record collections.

use std::collections::BTreeMap;

use super::entry::{BibEntry, CitationKey};
use super::error::CoreError;

/// The full set of records as they existed at one commit.
///
/// Snapshots are value objects: built once, then only read. Merge steps that
/// "modify" a snapshot return a new one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<CitationKey, BibEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from entries, rejecting duplicate citation keys.
    pub fn from_entries(entries: impl IntoIterator<Item = BibEntry>) -> Result<Self, CoreError> {
        let mut map = BTreeMap::new();
        for entry in entries {
            let key = entry.citation_key().clone();
            if map.insert(key.clone(), entry).is_some() {
                return Err(CoreError::DuplicateKey(key));
            }
        }
        Ok(Self { entries: map })
    }

    pub(crate) fn from_map(entries: BTreeMap<CitationKey, BibEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &CitationKey) -> Option<&BibEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CitationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CitationKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BibEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn to_map(&self) -> BTreeMap<CitationKey, BibEntry> {
        self.entries.clone()
    }
}
