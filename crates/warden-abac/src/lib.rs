//! # warden-abac: Attribute-Based Access Control decision engine
//!
//! Decides whether a subject may perform an action on a resource, given the
//! attributes of all three and of the surrounding environment.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  EvaluationRequest                           │
//! │  (subject id, resource id, action, env)      │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Attribute Resolver (PIP)                    │
//! │  ├─ Fetch subject / resource / action        │
//! │  ├─ Derive time and network attributes       │
//! │  └─ Derive tenure into a private overlay     │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Policy Decision Point (PDP)                 │
//! │  ├─ Filter policies by action / resource     │
//! │  ├─ Evaluate condition trees                 │
//! │  └─ Deny-override                            │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Decision                                    │
//! │  - permit / deny / not_applicable            │
//! │  - Matched policy and statement ids          │
//! │  - Reason and elapsed time                   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use warden_abac::{
//!     Effect, EngineConfig, EvaluationRequest, MemoryStore, Operator, Pdp, Policy,
//!     Rule, RuleBasedPolicy, TargetType,
//! };
//! use warden_types::{Action, Resource, Subject};
//!
//! # async fn demo() -> warden_abac::Result<()> {
//! let store = MemoryStore::new()
//!     .with_subject(Subject::new("sub-001").with_attribute("department", "engineering"))
//!     .with_resource(Resource::new("res-001").with_path("/api/v1/users"))
//!     .with_action(Action::new("act-read", "read"))
//!     .with_policy(Policy::new(
//!         "engineering-api",
//!         RuleBasedPolicy::new(Effect::Allow)
//!             .with_resource_pattern("/api/v1/*")
//!             .with_rule(Rule::new(
//!                 TargetType::Subject,
//!                 "department",
//!                 Operator::Equals,
//!                 "engineering",
//!             )),
//!     ));
//!
//! let pdp = Pdp::new(store, EngineConfig::default())?;
//! let decision = pdp
//!     .evaluate(&EvaluationRequest::new("sub-001", "res-001", "read"))
//!     .await?;
//! assert!(decision.is_permit());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod network;
pub mod policy;
pub mod resolver;
pub mod store;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use condition::{Condition, Operator, UnknownOperator, evaluate, evaluate_simple};
pub use config::{BusinessHours, ConfigError, EngineConfig};
pub use context::{EvaluationContext, EvaluationRequest, PathLookup, RequestInfo, SubjectView};
pub use error::{AbacError, Result};
pub use evaluator::{Decision, DecisionResult, Pdp, Phase, PolicyMatch};
pub use matcher::{
    PatternKind, match_action, match_pattern, match_resource, match_resource_patterns,
    substitute_variables,
};
pub use network::{InternalNetworks, ip_subnet, is_internal_ip};
pub use policy::{
    Effect, Policy, PolicyBody, PolicyDocument, PolicyError, Rule, RuleBasedPolicy, Statement,
    StatementPolicy, TargetType,
};
pub use resolver::{
    AttributeResolver, derive_subject_attributes, match_resource_pattern, resolve_hierarchy,
    years_of_service,
};
pub use store::{Dataset, MemoryStore, PolicyStore, StoreError, StoreResult};
