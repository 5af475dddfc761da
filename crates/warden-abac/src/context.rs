//! Evaluation requests and the enriched, evaluation-scoped context.
//!
//! The context owns everything a condition may look at. Entity records are
//! shared `Arc` snapshots from storage; attributes derived during enrichment
//! live in a private overlay ([`SubjectView`]) and are never written back.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_types::{
    Action, AttributeSource, Attributes, Resource, Subject, get_attribute_value, normalize_name,
};

// ============================================================================
// Request
// ============================================================================

/// A caller's question: may `subject_id` perform `action` on `resource_id`?
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Correlation id carried into the decision and audit record.
    #[serde(default)]
    pub request_id: String,
    pub subject_id: String,
    pub resource_id: String,
    pub action: String,
    /// Caller-supplied environment (e.g. `timestamp`, `source_ip`).
    #[serde(default)]
    pub environment: Attributes,
    /// Explicit evaluation time. Defaults to the current time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EvaluationRequest {
    pub fn new(
        subject_id: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            resource_id: resource_id.into(),
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_environment(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

// ============================================================================
// Path lookup
// ============================================================================

/// Resolves a full dot-path (`namespace.field...`) to a value.
///
/// Conditions and placeholder substitution are written against this trait so
/// they can run over a full [`EvaluationContext`] or a bare attribute map.
pub trait PathLookup {
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl PathLookup for Attributes {
    fn lookup(&self, path: &str) -> Option<Value> {
        get_attribute_value(self, path)
    }
}

impl PathLookup for Value {
    fn lookup(&self, path: &str) -> Option<Value> {
        get_attribute_value(self, path)
    }
}

// ============================================================================
// Subject overlay
// ============================================================================

/// A subject snapshot plus the attributes derived for this evaluation.
///
/// Derived keys shadow stored ones. The shared record is never mutated.
#[derive(Debug, Clone)]
pub struct SubjectView {
    subject: Arc<Subject>,
    derived: Attributes,
}

impl SubjectView {
    pub fn new(subject: Arc<Subject>) -> Self {
        Self {
            subject,
            derived: Attributes::new(),
        }
    }

    pub fn with_derived(mut self, derived: Attributes) -> Self {
        self.derived = derived;
        self
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn derived(&self) -> &Attributes {
        &self.derived
    }

    /// Stored attributes merged with the overlay.
    pub fn merged_attributes(&self) -> Attributes {
        let mut merged = self.subject.attributes.clone();
        merged.extend(self.derived.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl AttributeSource for SubjectView {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        match normalize_name(name).as_str() {
            "attributes" | "attrs" => Some(Cow::Owned(Value::Object(self.merged_attributes()))),
            _ => self
                .derived
                .attribute(name)
                .or_else(|| self.subject.attribute(name)),
        }
    }
}

// ============================================================================
// Request metadata
// ============================================================================

/// The `request` namespace: identifiers exactly as the caller sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub request_id: String,
    pub subject_id: String,
    pub resource_id: String,
    pub action: String,
}

impl From<&EvaluationRequest> for RequestInfo {
    fn from(request: &EvaluationRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            subject_id: request.subject_id.clone(),
            resource_id: request.resource_id.clone(),
            action: request.action.clone(),
        }
    }
}

impl AttributeSource for RequestInfo {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        let value = match normalize_name(name).as_str() {
            "requestid" | "id" => &self.request_id,
            "userid" | "subjectid" | "principalid" => &self.subject_id,
            "resourceid" | "resource" => &self.resource_id,
            "action" | "actionname" => &self.action,
            _ => return None,
        };
        Some(Cow::Owned(Value::String(value.clone())))
    }
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// Everything known about one evaluation, built once and discarded after the
/// decision.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub request: RequestInfo,
    pub subject: SubjectView,
    pub resource: Arc<Resource>,
    pub action: Arc<Action>,
    pub environment: Attributes,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationContext {
    /// Builds a context directly from records, without storage or derivation.
    pub fn new(
        request: RequestInfo,
        subject: Arc<Subject>,
        resource: Arc<Resource>,
        action: Arc<Action>,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            subject: SubjectView::new(subject),
            resource,
            action,
            environment: Attributes::new(),
            evaluated_at,
        }
    }

    pub fn with_environment(mut self, environment: Attributes) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_derived_subject_attributes(mut self, derived: Attributes) -> Self {
        self.subject = self.subject.with_derived(derived);
        self
    }

    /// Strings a resource pattern is matched against: the requested id, the
    /// record's business identifier and its path, non-empty and de-duplicated.
    pub fn resource_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(3);
        for key in [
            self.request.resource_id.as_str(),
            self.resource.resource_id.as_str(),
            self.resource.path.as_str(),
        ] {
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

impl PathLookup for EvaluationContext {
    /// Dispatches on the first segment:
    ///
    /// | namespace | source |
    /// |---|---|
    /// | `subject`, `user`, `principal` | subject record + derived overlay |
    /// | `resource` | resource record |
    /// | `action` | action record |
    /// | `environment`, `env` | environment map |
    /// | `request` | identifiers as requested |
    ///
    /// Paths without a known namespace are looked up in the environment.
    fn lookup(&self, path: &str) -> Option<Value> {
        let (namespace, rest) = match path.split_once('.') {
            Some((namespace, rest)) => (namespace, rest),
            None => return get_attribute_value(&self.environment, path),
        };

        match normalize_name(namespace).as_str() {
            "subject" | "user" | "principal" => get_attribute_value(&self.subject, rest),
            "resource" => get_attribute_value(self.resource.as_ref(), rest),
            "action" => get_attribute_value(self.action.as_ref(), rest),
            "environment" | "env" => get_attribute_value(&self.environment, rest),
            "request" => get_attribute_value(&self.request, rest),
            _ => get_attribute_value(&self.environment, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn context() -> EvaluationContext {
        let subject = Arc::new(
            Subject::new("user-123")
                .with_attribute("department", "engineering")
                .with_attribute("clearance_level", 2),
        );
        let resource = Arc::new(
            Resource::new("res-1")
                .with_resource_id("doc-1")
                .with_path("/api/v1/users")
                .with_attribute("document_type", "financial_report"),
        );
        let action = Arc::new(Action::new("act-read", "read"));
        let request = RequestInfo {
            request_id: "req-1".to_string(),
            subject_id: "user-123".to_string(),
            resource_id: "res-1".to_string(),
            action: "read".to_string(),
        };
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();

        let mut env = Attributes::new();
        env.insert("is_business_hours".to_string(), json!(true));
        EvaluationContext::new(request, subject, resource, action, at).with_environment(env)
    }

    #[test]
    fn resolves_namespaces() {
        let ctx = context();
        assert_eq!(ctx.lookup("user.department"), Some(json!("engineering")));
        assert_eq!(ctx.lookup("subject.attributes.clearance_level"), Some(json!(2)));
        assert_eq!(
            ctx.lookup("resource.document_type"),
            Some(json!("financial_report"))
        );
        assert_eq!(ctx.lookup("action.name"), Some(json!("read")));
        assert_eq!(ctx.lookup("environment.is_business_hours"), Some(json!(true)));
        assert_eq!(ctx.lookup("request.UserId"), Some(json!("user-123")));
    }

    #[test]
    fn bare_keys_fall_back_to_environment() {
        let ctx = context();
        assert_eq!(ctx.lookup("is_business_hours"), Some(json!(true)));
        assert_eq!(ctx.lookup("nowhere.at.all"), None);
    }

    #[test]
    fn derived_overlay_shadows_and_does_not_mutate() {
        let subject = Arc::new(Subject::new("sub-1").with_attribute("current_hour", 3));
        let mut derived = Attributes::new();
        derived.insert("current_hour".to_string(), json!(10));
        derived.insert("years_of_service".to_string(), json!(5));

        let view = SubjectView::new(Arc::clone(&subject)).with_derived(derived);

        assert_eq!(get_attribute_value(&view, "current_hour"), Some(json!(10)));
        assert_eq!(
            get_attribute_value(&view, "attributes.years_of_service"),
            Some(json!(5))
        );
        assert_eq!(subject.attributes.get("current_hour"), Some(&json!(3)));
        assert!(subject.attributes.get("years_of_service").is_none());
    }

    #[test]
    fn resource_keys_are_deduplicated() {
        let ctx = context();
        assert_eq!(ctx.resource_keys(), vec!["res-1", "doc-1", "/api/v1/users"]);

        let mut same = context();
        same.resource = Arc::new(Resource::new("res-1").with_resource_id("res-1"));
        assert_eq!(same.resource_keys(), vec!["res-1"]);
    }
}
