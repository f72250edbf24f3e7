//! Snapshot wire codec (JSONL).
//!
//! One record per line, records sorted by citation key, fields in name
//! order. Serialization is deterministic, so serialize∘parse is the identity
//! on canonical bytes; the fast-forward byte-identity check in bookkeeping
//! relies on that.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::WireError;
use crate::core::{BibEntry, CitationKey, FieldName, Snapshot};

#[derive(Serialize, Deserialize)]
struct WireEntry {
    key: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, String>,
}

/// Serialize a snapshot to canonical JSONL bytes.
pub fn serialize_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    for entry in snapshot.iter() {
        let wire = WireEntry {
            key: entry.citation_key().as_str().to_owned(),
            fields: entry
                .fields()
                .map(|(name, value)| (name.as_str().to_owned(), value.to_owned()))
                .collect(),
        };
        out.extend_from_slice(&serde_json::to_vec(&wire)?);
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse JSONL bytes back into a snapshot.
///
/// Blank lines are skipped; duplicate citation keys are rejected.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, WireError> {
    let text = std::str::from_utf8(bytes)?;
    let mut entries: BTreeMap<CitationKey, BibEntry> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let wire: WireEntry = serde_json::from_str(line)?;
        let key = CitationKey::new(wire.key);
        let fields = wire
            .fields
            .into_iter()
            .map(|(name, value)| (FieldName::new(name), value))
            .collect();
        let entry = BibEntry::from_parts(key.clone(), fields);
        if entries.insert(key.clone(), entry).is_some() {
            return Err(WireError::DuplicateKey(key));
        }
    }
    Ok(Snapshot::from_map(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_entries() {
        let snapshot = Snapshot::from_entries([
            BibEntry::new("knuth84")
                .with_entry_type("article")
                .with_field("author", "Knuth")
                .with_field("title", "Literate Programming"),
            BibEntry::new("lamport94").with_entry_type("book"),
        ])
        .unwrap();

        let bytes = serialize_snapshot(&snapshot).unwrap();
        assert_eq!(parse_snapshot(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn serialization_is_canonical() {
        let bytes = serialize_snapshot(
            &Snapshot::from_entries([
                BibEntry::new("b").with_field("title", "B"),
                BibEntry::new("a").with_field("title", "A"),
            ])
            .unwrap(),
        )
        .unwrap();

        let reparsed = parse_snapshot(&bytes).unwrap();
        assert_eq!(serialize_snapshot(&reparsed).unwrap(), bytes);

        let text = String::from_utf8(bytes).unwrap();
        let keys: Vec<_> = text
            .lines()
            .map(|l| l.split('"').nth(3).unwrap().to_owned())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn empty_snapshot_is_empty_bytes() {
        let bytes = serialize_snapshot(&Snapshot::new()).unwrap();
        assert!(bytes.is_empty());
        assert!(parse_snapshot(&bytes).unwrap().is_empty());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let bytes = b"{\"key\":\"a\"}\n{\"key\":\"a\"}\n";
        assert!(matches!(
            parse_snapshot(bytes),
            Err(WireError::DuplicateKey(key)) if key.as_str() == "a"
        ));
    }

    #[test]
    fn malformed_line_is_a_json_error() {
        assert!(matches!(
            parse_snapshot(b"not json\n"),
            Err(WireError::Json(_))
        ));
    }
}
