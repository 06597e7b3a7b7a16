use super::RecordSource;
use crate::error::Result;
use crate::types::RecordSet;

/// Records already in memory, e.g. rows fetched by a caller-owned database
/// client.
#[derive(Debug, Clone)]
pub struct MemorySource {
    label: String,
    records: RecordSet,
}

impl MemorySource {
    pub fn new(label: impl Into<String>, records: impl Into<RecordSet>) -> Self {
        Self {
            label: label.into(),
            records: records.into(),
        }
    }
}

impl RecordSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn read(&mut self) -> Result<RecordSet> {
        Ok(self.records.clone())
    }
}
