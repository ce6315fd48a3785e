//! Lookup of identifiers in a documentation index.
//!
//! The index is a JSON object mapping identifiers to their documentation, such as the one
//! published at `https://tweaked.cc/index.json`:
//!
//! ```json
//! { "fs.open": { "name": "fs.open", "summary": "Open a file.", "url": "module/fs.html#v:open" } }
//! ```
//!
//! Identifiers are looked up case-insensitively, and misspelled identifiers are resolved to
//! the closest match if it is a clear winner, see [`ApproximateResolver`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::caching::{CacheEntry, CacheError};

mod resolve;
pub mod similarity;

pub use resolve::*;

/// A documented identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The identifier in its original casing.
    pub name: String,
    /// A one-line description.
    pub summary: Option<String>,
    /// All other fields of the entry, passed through as-is.
    pub fields: Map<String, Value>,
}

impl Record {
    /// Returns a string field of the entry, like `url` or `source`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Links to the rendered documentation of `record`, which lives at its `url` below `link_base`.
pub fn doc_link(link_base: &Url, record: &Record) -> Option<String> {
    record.field("url").map(|url| format!("{link_base}{url}"))
}

/// Links to the source code defining `record`.
pub fn source_link(record: &Record) -> Option<String> {
    record.field("source").map(str::to_owned)
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    summary: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// The decoded documentation index, keyed by case-folded identifier.
///
/// Records keep the order in which the origin listed them.
#[derive(Clone, Debug, Default)]
pub struct DocIndex {
    records: Vec<(String, Record)>,
    by_key: HashMap<String, usize>,
}

impl DocIndex {
    /// Decodes an index from its JSON representation.
    ///
    /// Fails with [`CacheError::Malformed`] if the body is not a JSON object of objects.
    pub fn from_json(body: &[u8]) -> CacheEntry<Self> {
        let raw: Map<String, Value> = serde_json::from_slice(body)?;

        let mut index = Self::default();
        for (name, entry) in raw {
            let entry: RawRecord = serde_json::from_value(entry)
                .map_err(|e| CacheError::Malformed(format!("entry `{name}`: {e}")))?;
            index.insert(Record {
                name,
                summary: entry.summary,
                fields: entry.fields,
            });
        }

        tracing::debug!(records = index.records.len(), "Decoded documentation index");
        Ok(index)
    }

    /// Adds a record. A record whose name folds to an existing key replaces that record in place.
    pub fn insert(&mut self, record: Record) {
        let key = record.name.to_lowercase();
        match self.by_key.get(&key) {
            Some(&idx) => self.records[idx].1 = record,
            None => {
                self.by_key.insert(key.clone(), self.records.len());
                self.records.push((key, record));
            }
        }
    }

    /// Looks up a record by its case-folded key.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.by_key.get(key).map(|&idx| &self.records[idx].1)
    }

    /// Iterates over all case-folded keys and their records, in the origin's order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records
            .iter()
            .map(|(key, record)| (key.as_str(), record))
    }
}
