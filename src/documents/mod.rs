// Corpus loading
// Documents arrive as JSON-Lines records with the columns of the source
// export: file_name, content, meta_data, last_updated


use std::fs;
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{RagError, Result};

/// A named content unit loaded from the corpus, immutable after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Human-readable name, used as the citation key and chunk parent reference.
    pub filename: String,
    pub text: String,
    /// Source attributes in source order (e.g. source URL, author).
    pub metadata: IndexMap<String, String>,
    /// ISO date; defaults to the ingestion date when the source omits it.
    pub last_updated: String,
}

impl Document {
    #[inline]
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            text: text.into(),
            metadata: IndexMap::new(),
            last_updated: ingestion_date(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    file_name: Option<String>,
    content: Option<Value>,
    #[serde(default)]
    meta_data: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Load a JSON-Lines corpus file into documents.
///
/// Records with missing or non-string `content` are skipped with a warning
/// rather than failing the load; a malformed line likewise only loses that
/// line.
#[inline]
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path).map_err(|e| {
        RagError::Documents(format!("Failed to read corpus file {}: {}", path.display(), e))
    })?;

    let mut documents = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: RawRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed corpus record on line {}: {}", line_no + 1, e);
                continue;
            }
        };

        let filename = record
            .file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        let text = match record.content {
            Some(Value::String(text)) => text,
            _ => {
                warn!(
                    "Skipping document due to missing or invalid content: {}",
                    filename
                );
                continue;
            }
        };

        let metadata = record
            .meta_data
            .as_deref()
            .map(parse_attributes)
            .unwrap_or_default();

        let last_updated = record
            .last_updated
            .filter(|date| !date.trim().is_empty())
            .unwrap_or_else(ingestion_date);

        documents.push(Document {
            id: Uuid::new_v4().to_string(),
            filename,
            text,
            metadata,
            last_updated,
        });
    }

    debug!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Parse a flat attribute string into an ordered key/value map.
///
/// Format: attributes separated by `;`, each attribute `key: value` split on
/// the first colon. `\;` escapes a literal semicolon inside a value, so
/// values may freely contain commas, colons, and URLs. Fields without a
/// colon are ignored.
#[inline]
pub fn parse_attributes(raw: &str) -> IndexMap<String, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(';') => current.push(';'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ';' => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);

    let mut attributes = IndexMap::new();
    for field in &fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        attributes.insert(key.to_string(), value.trim().to_string());
    }

    attributes
}

fn ingestion_date() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
