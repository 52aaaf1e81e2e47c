//! Audit trail for access to protected health information
//!
//! The engine emits one event per sensitive operation through an injected
//! `AuditSink`. Sink failures are logged and never fail the operation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::error::Result;

/// Audit event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Health data read for generation or chat
    PhiAccess,
    /// Recommendation state changed by feedback
    PhiUpdate,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::PhiAccess => "PHI_ACCESS",
            AuditEventType::PhiUpdate => "PHI_UPDATE",
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub user_id: Option<i64>,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub action: String,
    pub details: Value,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, user_id: i64, resource_type: &str, action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            user_id: Some(user_id),
            resource_type: resource_type.to_string(),
            resource_id: None,
            action: action.to_string(),
            details: Value::Object(Default::default()),
            success: true,
        }
    }

    pub fn with_resource_id(mut self, id: i64) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Writes audit events as structured `tracing` events on target `audit`
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        tracing::info!(
            target: "audit",
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            user_id = ?event.user_id,
            resource_type = %event.resource_type,
            resource_id = ?event.resource_id,
            action = %event.action,
            success = event.success,
            details = %event.details,
            "audit event"
        );
    }
}

/// Appends one JSON object per line to a file
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Open (or create) the log file, creating its parent directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn emit(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to serialize audit event {}: {}", event.id, e);
                return;
            }
        };

        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            tracing::error!(
                "Failed to write audit event {} to {}: {}",
                event.id,
                self.path.display(),
                e
            );
        }
    }
}

/// Discards events when auditing is disabled
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: &AuditEvent) {}
}

/// Build the sink selected by configuration
pub fn from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        tracing::info!("Audit logging disabled");
        return Ok(Arc::new(NoopAuditSink));
    }

    match &config.log_path {
        Some(path) => {
            let sink = JsonLinesAuditSink::open(path)?;
            tracing::info!("Audit log: {}", path.display());
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(TracingAuditSink)),
    }
}

/// Collects events in memory for assertions
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

#[cfg(test)]
impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}
