//! Decision audit records and sinks.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use warden_types::Attributes;

use crate::context::EvaluationRequest;
use crate::evaluator::{Decision, DecisionResult};

/// Everything needed to reconstruct why a decision was made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub subject_id: String,
    pub resource_id: String,
    pub action: String,
    pub result: DecisionResult,
    /// `policy_id` or `policy_id#sid` of every matched candidate.
    pub matched: Vec<String>,
    pub reason: String,
    pub duration_micros: u64,
    pub evaluated_at: DateTime<Utc>,
    /// Environment as enriched, or as supplied when enrichment did not finish.
    pub environment: Attributes,
}

impl AuditRecord {
    pub fn new(request: &EvaluationRequest, decision: &Decision, environment: Attributes) -> Self {
        Self {
            request_id: request.request_id.clone(),
            subject_id: request.subject_id.clone(),
            resource_id: request.resource_id.clone(),
            action: request.action.clone(),
            result: decision.result,
            matched: decision.matched.iter().map(ToString::to_string).collect(),
            reason: decision.reason.clone(),
            duration_micros: u64::try_from(decision.elapsed.as_micros()).unwrap_or(u64::MAX),
            evaluated_at: decision.evaluated_at,
            environment,
        }
    }
}

/// Receives one record per decision, including fail-safe denies.
///
/// Called synchronously on the evaluating task; implementations should hand
/// off anything slow.
pub trait AuditSink: Send + Sync + Debug {
    fn record(&self, record: &AuditRecord);
}

/// Emits records as structured `tracing` events on target `warden::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        info!(
            target: "warden::audit",
            request_id = %record.request_id,
            subject_id = %record.subject_id,
            resource_id = %record.resource_id,
            action = %record.action,
            result = %record.result,
            matched = ?record.matched,
            reason = %record.reason,
            duration_micros = record.duration_micros,
            environment = ?record.environment,
            "Access decision"
        );
    }
}

/// Keeps records in memory (for tests and tooling).
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
