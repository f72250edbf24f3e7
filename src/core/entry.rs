//! Bibliographic records.
//!
//! CitationKey: identity of a record within a snapshot
//! FieldName: name of one field (the entry type travels as a reserved field)
//! BibEntry: citation key + field map, immutable once built

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a record within a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationKey(String);

impl CitationKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CitationKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Name of one field of a record.
///
/// Field names are compared verbatim; callers normalize case upstream.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldName(String);

impl FieldName {
    /// Reserved field carrying the record's entry type (article, book, ...).
    ///
    /// Storing the type as a field means type changes flow through the same
    /// three-way classification as every other field: a one-sided change
    /// auto-merges, a two-sided disagreement is a conflict.
    pub const ENTRY_TYPE: &'static str = "entrytype";

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn entry_type() -> Self {
        Self(Self::ENTRY_TYPE.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One bibliographic entry.
///
/// Absence of a field is distinct from an empty value. Entries are built via
/// the constructor/builder and never mutated afterwards; edits during merge
/// produce new entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BibEntry {
    citation_key: CitationKey,
    fields: BTreeMap<FieldName, String>,
}

impl BibEntry {
    pub fn new(citation_key: impl Into<CitationKey>) -> Self {
        Self {
            citation_key: citation_key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<FieldName>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style entry type.
    pub fn with_entry_type(self, entry_type: impl Into<String>) -> Self {
        self.with_field(FieldName::entry_type(), entry_type)
    }

    pub(crate) fn from_parts(
        citation_key: CitationKey,
        fields: BTreeMap<FieldName, String>,
    ) -> Self {
        Self {
            citation_key,
            fields,
        }
    }

    pub fn citation_key(&self) -> &CitationKey {
        &self.citation_key
    }

    pub fn field(&self, name: &FieldName) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn entry_type(&self) -> Option<&str> {
        self.field(&FieldName::entry_type())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&FieldName, &str)> {
        self.fields.iter().map(|(name, value)| (name, value.as_str()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &FieldName> {
        self.fields.keys()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn fields_map(&self) -> &BTreeMap<FieldName, String> {
        &self.fields
    }
}
