//! Storage contract and an in-memory implementation.
//!
//! The engine reads subjects, resources, actions and policies through
//! [`PolicyStore`]. Records are handed out as `Arc` snapshots so that a
//! caching backend can share them between concurrent evaluations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use warden_types::{Action, EntityKind, Resource, Subject};

use crate::policy::{Policy, PolicyDocument, PolicyError};

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// Backend failure. The message is logged, never shown to callers.
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    InvalidPolicy(#[from] PolicyError),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to entities and policies.
///
/// Implementations must be safe to share across tasks; every future they
/// return must be `Send`. Dropping a returned future cancels the lookup.
pub trait PolicyStore: Send + Sync {
    fn subject(&self, id: &str) -> impl Future<Output = StoreResult<Arc<Subject>>> + Send;

    fn resource(&self, id: &str) -> impl Future<Output = StoreResult<Arc<Resource>>> + Send;

    /// Looks an action up by name.
    fn action(&self, name: &str) -> impl Future<Output = StoreResult<Arc<Action>>> + Send;

    /// All policies, enabled or not, in storage order.
    fn policies(&self) -> impl Future<Output = StoreResult<Arc<[Policy]>>> + Send;
}

impl<S: PolicyStore + ?Sized> PolicyStore for Arc<S> {
    fn subject(&self, id: &str) -> impl Future<Output = StoreResult<Arc<Subject>>> + Send {
        (**self).subject(id)
    }

    fn resource(&self, id: &str) -> impl Future<Output = StoreResult<Arc<Resource>>> + Send {
        (**self).resource(id)
    }

    fn action(&self, name: &str) -> impl Future<Output = StoreResult<Arc<Action>>> + Send {
        (**self).action(name)
    }

    fn policies(&self) -> impl Future<Output = StoreResult<Arc<[Policy]>>> + Send {
        (**self).policies()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// A JSON dataset loadable into a [`MemoryStore`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub policies: Vec<PolicyDocument>,
}

/// A [`PolicyStore`] over hash maps. Actions are keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    subjects: HashMap<String, Arc<Subject>>,
    resources: HashMap<String, Arc<Resource>>,
    actions: HashMap<String, Arc<Action>>,
    policies: Arc<[Policy]>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.insert(subject.id.clone(), Arc::new(subject));
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.insert(resource.id.clone(), Arc::new(resource));
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.insert(action.name.clone(), Arc::new(action));
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        let mut policies = self.policies.to_vec();
        policies.push(policy);
        self.policies = policies.into();
        self
    }

    /// Builds a store from a dataset. Policies are parsed here, so an unknown
    /// operator fails the load.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] for the first invalid policy document.
    pub fn from_dataset(dataset: Dataset) -> Result<Self, PolicyError> {
        let policies = dataset
            .policies
            .into_iter()
            .map(Policy::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let store = Self {
            policies: policies.into(),
            ..Self::default()
        };
        let store = dataset
            .subjects
            .into_iter()
            .fold(store, Self::with_subject);
        let store = dataset
            .resources
            .into_iter()
            .fold(store, Self::with_resource);
        Ok(dataset.actions.into_iter().fold(store, Self::with_action))
    }

    /// Parses a JSON dataset `{subjects, resources, actions, policies}`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Json`] for invalid JSON, or the policy parse
    /// error for an invalid policy.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Self::from_dataset(serde_json::from_str(json)?)
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }
}

impl PolicyStore for MemoryStore {
    async fn subject(&self, id: &str) -> StoreResult<Arc<Subject>> {
        self.subjects
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Subject, id))
    }

    async fn resource(&self, id: &str) -> StoreResult<Arc<Resource>> {
        self.resources
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Resource, id))
    }

    async fn action(&self, name: &str) -> StoreResult<Arc<Action>> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Action, name))
    }

    async fn policies(&self) -> StoreResult<Arc<[Policy]>> {
        Ok(Arc::clone(&self.policies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "subjects": [{"id": "sub-001", "attributes": {"department": "engineering"}}],
        "resources": [{"id": "res-001", "path": "/api/v1/users"}],
        "actions": [{"id": "act-read", "name": "read"}],
        "policies": [{"id": "p1", "Effect": "Allow", "ResourcePatterns": ["/api/v1/*"]}]
    }"#;

    #[tokio::test]
    async fn loads_dataset() {
        let store = MemoryStore::from_json(DATASET).unwrap();
        assert_eq!(store.policy_count(), 1);

        let subject = store.subject("sub-001").await.unwrap();
        assert_eq!(subject.attributes["department"], "engineering");
        assert_eq!(store.action("read").await.unwrap().id, "act-read");
        assert_eq!(store.policies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_entities_are_not_found() {
        let store = MemoryStore::from_json(DATASET).unwrap();
        let err = store.resource("res-404").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound { kind: EntityKind::Resource, ref id } if id == "res-404"
        ));
        assert!(store.action("act-read").await.is_err());
    }

    #[tokio::test]
    async fn shared_store_delegates() {
        let store = Arc::new(MemoryStore::new().with_subject(Subject::new("s")));
        let first = store.subject("s").await.unwrap();
        let second = store.subject("s").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_operator_fails_load() {
        let json = r#"{"policies": [{"id": "p", "Statement": [{
            "Effect": "Allow", "Action": "*", "Resource": "*",
            "Condition": {"FuzzyEquals": {"subject.x": 1}}
        }]}]}"#;
        assert!(matches!(
            MemoryStore::from_json(json),
            Err(PolicyError::UnknownOperator(_))
        ));
    }
}
