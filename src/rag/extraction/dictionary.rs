//! Entity dictionary loaded once at startup.
//!
//! Two source formats are accepted:
//!
//! - JSON: an array of chunk records, each carrying `entities: [{ "text", "label" }]`
//! - CSV: rows of `chunk_id,entity_text,label`
//!
//! Entries are de-duplicated on exact (text, label). Spellings that differ only in case are
//! kept apart, since the graph holds one node per spelling.

use crate::error::RagError;
use crate::rag::domain::EntityLabel;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// A known (text, label) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictionaryEntry {
    pub text: String,
    pub label: EntityLabel,
}

/// Read-only set of known entities.
#[derive(Debug, Clone, Default)]
pub struct EntityDictionary {
    entries: Vec<DictionaryEntry>,
}

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    entities: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    text: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    #[allow(dead_code)]
    chunk_id: Option<String>,
    entity_text: String,
    label: String,
}

impl EntityDictionary {
    /// Build a dictionary from already-typed entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = DictionaryEntry>,
    {
        let mut seen: HashSet<(String, EntityLabel)> = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|e| !e.text.trim().is_empty())
            .filter(|e| seen.insert((e.text.clone(), e.label)))
            .collect();
        Self { entries }
    }

    /// Load the dictionary from disk. A missing, unreadable or empty source is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            RagError::DictionaryUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

        let pairs = if is_csv {
            Self::parse_csv(&raw)
        } else {
            Self::parse_json(&raw)
        }
        .map_err(|message| RagError::DictionaryFormat {
            path: path.to_path_buf(),
            message,
        })?;

        let dictionary = Self::from_raw_pairs(pairs);
        if dictionary.is_empty() {
            return Err(RagError::DictionaryEmpty(path.to_path_buf()));
        }

        info!(
            name: "rag.dictionary.loaded",
            path = %path.display(),
            entries = dictionary.len(),
            "Entity dictionary loaded"
        );
        Ok(dictionary)
    }

    fn parse_json(raw: &str) -> Result<Vec<(String, String)>, String> {
        let records: Vec<ChunkRecord> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        Ok(records
            .into_iter()
            .flat_map(|r| r.entities)
            .map(|e| (e.text, e.label))
            .collect())
    }

    fn parse_csv(raw: &str) -> Result<Vec<(String, String)>, String> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());
        let mut pairs = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            let row = row.map_err(|e| e.to_string())?;
            pairs.push((row.entity_text, row.label));
        }
        Ok(pairs)
    }

    fn from_raw_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut skipped = 0usize;
        let entries: Vec<DictionaryEntry> = pairs
            .into_iter()
            .filter_map(|(text, label)| match label.parse::<EntityLabel>() {
                Ok(label) => Some(DictionaryEntry { text, label }),
                Err(err) => {
                    skipped += 1;
                    tracing::debug!(text = %text, error = %err, "Skipping dictionary entry");
                    None
                }
            })
            .collect();

        if skipped > 0 {
            warn!(skipped, "Dictionary entries with unknown labels were skipped");
        }

        Self::from_entries(entries)
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_keeps_every_spelling() {
        let file = write_temp(
            ".json",
            r#"[
                {"chunk_id": 1, "entities": [
                    {"text": "Fei river", "label": "LOC"},
                    {"text": "Sun Tzu", "label": "PERSON"}
                ]},
                {"chunk_id": 2, "entities": [
                    {"text": "Fei River", "label": "LOC"},
                    {"text": "Fei river", "label": "LOC"},
                    {"text": "Fei river", "label": "GPE"}
                ]},
                {"chunk_id": 3}
            ]"#,
        );

        let dict = EntityDictionary::load(file.path()).unwrap();
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.entries()[0].text, "Fei river");
        assert_eq!(dict.entries()[2].text, "Fei River");
        assert_eq!(dict.entries()[3].label, EntityLabel::Gpe);
    }

    #[test]
    fn test_load_csv_skips_unknown_labels() {
        let file = write_temp(
            ".csv",
            "chunk_id,entity_text,label\n\
             10,Wu,GPE\n\
             11,\"Sun Tzu, the general\",PERSON\n\
             12,something,CARDINAL\n",
        );

        let dict = EntityDictionary::load(file.path()).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.entries()[1].text, "Sun Tzu, the general");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = EntityDictionary::load("/definitely/not/here/entities.json").unwrap_err();
        assert!(matches!(err, RagError::DictionaryUnavailable { .. }));
    }

    #[test]
    fn test_empty_dictionary_is_fatal() {
        let file = write_temp(".json", "[]");
        let err = EntityDictionary::load(file.path()).unwrap_err();
        assert!(matches!(err, RagError::DictionaryEmpty(_)));
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let file = write_temp(".json", "{ not json");
        let err = EntityDictionary::load(file.path()).unwrap_err();
        assert!(matches!(err, RagError::DictionaryFormat { .. }));
    }
}
