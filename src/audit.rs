//! Flattened export of queued records for the audit-log view.

use serde::Serialize;

use crate::record::EventRecord;
use crate::error::ExportError;

/// One record flattened to scalar columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    pub id: u64,
    pub kind: String,
    pub timestamp: String,
    pub actor_id: String,
    pub session_id: String,
    pub device_id: String,
    pub connectivity: String,
    pub reversible: bool,
    pub payload: String,
    pub metadata: String,
}

impl AuditRow {
    pub fn from_record(record: &EventRecord) -> Result<Self, ExportError> {
        let metadata = record.metadata();
        Ok(AuditRow {
            id: record.id().as_u64(),
            kind: record.kind().to_string(),
            timestamp: record.timestamp().to_rfc3339(),
            actor_id: record.actor_id().to_string(),
            session_id: record.session_id().to_string(),
            device_id: metadata.device_id.clone().unwrap_or_default(),
            connectivity: if metadata.connectivity.is_online() {
                "online".to_string()
            } else {
                "offline".to_string()
            },
            reversible: record.is_reversible(),
            payload: serde_json::to_string(record.payload())?,
            metadata: serde_json::to_string(&metadata.extra)?,
        })
    }
}

fn rows(records: &[EventRecord]) -> Result<Vec<AuditRow>, ExportError> {
    records.iter().map(AuditRow::from_record).collect()
}

/// Pretty-printed JSON array of flattened rows.
pub fn export_json(records: &[EventRecord]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&rows(records)?)?)
}

/// CSV with a header row.
pub fn export_csv(records: &[EventRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows(records)? {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ExportError::Buffer(err.to_string()))
}
