use super::{FeatureSink, RecordSource, ensure_parent_dir};
use crate::error::{FeatureError, Result, ResultExt};
use crate::types::{FeatureTable, RawRecord, RawValue, RecordSet};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

/// Key a document store adds to every document.
const STORE_ID_KEY: &str = "_id";

/// Document-store export: either a JSON array of objects or one object per
/// line.
///
/// The store's own `_id` key is dropped on read. Nested values (arrays,
/// objects) are kept as their JSON text; they fail encoding if they land in
/// a contract column.
#[derive(Debug, Clone)]
pub struct JsonDocumentSource {
    path: PathBuf,
}

impl JsonDocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse documents already in memory.
    pub fn parse(content: &str) -> Result<RecordSet> {
        let trimmed = content.trim_start();
        let documents: Vec<Map<String, Value>> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(idx, line)| {
                    serde_json::from_str::<Map<String, Value>>(line).map_err(|e| {
                        FeatureError::Json(e).with_context(format!("document on line {}", idx + 1))
                    })
                })
                .collect::<Result<_>>()?
        };

        Ok(documents.into_iter().map(document_to_record).collect::<Vec<_>>().into())
    }
}

fn document_to_record(document: Map<String, Value>) -> RawRecord {
    document
        .into_iter()
        .filter(|(key, _)| key != STORE_ID_KEY)
        .map(|(key, value)| (key, raw_value(value)))
        .collect()
}

fn raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => RawValue::Int(i),
            None => n.as_f64().map(RawValue::Float).unwrap_or(RawValue::Null),
        },
        Value::String(s) => RawValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}

impl RecordSource for JsonDocumentSource {
    fn describe(&self) -> String {
        format!("documents:{}", self.path.display())
    }

    fn read(&mut self) -> Result<RecordSet> {
        let content = std::fs::read_to_string(&self.path)
            .context(format!("Failed to read {}", self.path.display()))?;
        let set = Self::parse(&content).context(format!("Failed to parse {}", self.path.display()))?;

        info!(
            "Loaded {} documents ({} distinct keys) from {}",
            set.len(),
            set.column_names().len(),
            self.path.display()
        );
        Ok(set)
    }
}

/// Writes one JSON document per feature row, keys in contract order.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

struct RowDocument<'a> {
    names: &'a [String],
    values: &'a [f64],
    target: Option<(&'a str, f64)>,
}

impl Serialize for RowDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.names.len() + usize::from(self.target.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, value) in self.names.iter().zip(self.values) {
            map.serialize_entry(name, value)?;
        }
        if let Some((name, value)) = self.target {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl FeatureSink for JsonLinesSink {
    fn describe(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }

    fn write(&mut self, table: &FeatureTable) -> Result<PathBuf> {
        ensure_parent_dir(&self.path)?;
        let file = File::create(&self.path)
            .context(format!("Failed to create {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);

        let target_name = table.target_name();
        for (idx, row) in table.rows().iter().enumerate() {
            let target = match (target_name, table.targets()) {
                (Some(name), Some(labels)) => Some((name, labels[idx])),
                _ => None,
            };
            let document = RowDocument {
                names: table.feature_names(),
                values: row,
                target,
            };
            serde_json::to_writer(&mut writer, &document)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        debug!("Wrote {} documents", table.n_rows());
        info!("Feature table saved: {}", self.path.display());
        Ok(self.path.clone())
    }
}
