//! Policy decision point.
//!
//! Each evaluation is a single pass through
//! `Start → Enriching → Filtering → Evaluating → Decided`:
//!
//! 1. **Enriching**: the request is resolved into an [`EvaluationContext`].
//! 2. **Filtering**: enabled policies whose action and resource patterns match
//!    are lowered into one candidate list. Rule-based policies come first in
//!    ascending priority, then statements in storage and declaration order.
//! 3. **Evaluating**: candidates are checked in order. The first satisfied
//!    deny ends the evaluation (deny-override); otherwise every satisfied
//!    allow is collected.
//!
//! The result is `deny` if any satisfied candidate denies, `permit` if at
//! least one allows, and `not_applicable` otherwise.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_types::Attributes;

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::condition::Condition;
use crate::config::EngineConfig;
use crate::context::{EvaluationContext, EvaluationRequest};
use crate::error::{AbacError, Result};
use crate::matcher::{match_action, match_resource, match_resource_patterns};
use crate::policy::{Effect, Policy, PolicyBody, Rule};
use crate::resolver::AttributeResolver;
use crate::store::PolicyStore;

const NO_MATCH_REASON: &str = "no applicable policy matched the request";

// ============================================================================
// Decision
// ============================================================================

/// The outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionResult {
    Permit,
    Deny,
    /// No policy matched. Distinct from an explicit deny.
    NotApplicable,
}

impl fmt::Display for DecisionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Permit => "permit",
            Self::Deny => "deny",
            Self::NotApplicable => "not_applicable",
        })
    }
}

/// A satisfied policy or statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyMatch {
    pub policy_id: String,
    pub statement_id: Option<String>,
    pub effect: Effect,
}

impl PolicyMatch {
    pub fn new(policy_id: impl Into<String>, statement_id: Option<String>, effect: Effect) -> Self {
        Self {
            policy_id: policy_id.into(),
            statement_id,
            effect,
        }
    }
}

impl fmt::Display for PolicyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.statement_id {
            Some(sid) => write!(f, "{}#{sid}", self.policy_id),
            None => f.write_str(&self.policy_id),
        }
    }
}

/// The result of evaluating an access request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub request_id: String,
    pub result: DecisionResult,
    /// Satisfied candidates in evaluation order. For a deny, the last entry
    /// is the deny that decided it.
    pub matched: Vec<PolicyMatch>,
    /// Always non-empty.
    pub reason: String,
    pub elapsed: Duration,
    pub evaluated_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        self.result == DecisionResult::Permit
    }

    pub fn is_deny(&self) -> bool {
        self.result == DecisionResult::Deny
    }

    pub fn matched_ids(&self) -> Vec<String> {
        self.matched.iter().map(ToString::to_string).collect()
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Evaluation phase, reported in timeout and cancellation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Start = 0,
    Enriching = 1,
    Filtering = 2,
    Evaluating = 3,
    Decided = 4,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Enriching => "enriching",
            Self::Filtering => "filtering",
            Self::Evaluating => "evaluating",
            Self::Decided => "decided",
        })
    }
}

/// Shared between the evaluation future and the timeout race.
#[derive(Debug, Default)]
struct PhaseTracker(AtomicU8);

impl PhaseTracker {
    fn enter(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    fn current(&self) -> Phase {
        match self.0.load(Ordering::Acquire) {
            1 => Phase::Enriching,
            2 => Phase::Filtering,
            3 => Phase::Evaluating,
            4 => Phase::Decided,
            _ => Phase::Start,
        }
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// A policy or statement that survived filtering, in evaluation order.
#[derive(Debug)]
struct Candidate<'a> {
    policy_id: &'a str,
    statement_id: Option<&'a str>,
    effect: Effect,
    check: Check<'a>,
}

#[derive(Debug)]
enum Check<'a> {
    Always,
    Condition(&'a Condition),
    /// Every rule must hold.
    Rules(&'a [Rule]),
}

impl Candidate<'_> {
    fn satisfied(&self, ctx: &EvaluationContext) -> bool {
        match self.check {
            Check::Always => true,
            Check::Condition(condition) => condition.evaluate(ctx),
            Check::Rules(rules) => rules.iter().all(|rule| rule.holds(ctx)),
        }
    }

    fn to_match(&self) -> PolicyMatch {
        PolicyMatch::new(
            self.policy_id,
            self.statement_id.map(ToString::to_string),
            self.effect,
        )
    }
}

fn filter_candidates<'a>(policies: &'a [Policy], ctx: &EvaluationContext) -> Vec<Candidate<'a>> {
    let action = ctx.request.action.as_str();
    let keys = ctx.resource_keys();

    let mut rule_based: Vec<_> = policies
        .iter()
        .filter(|policy| policy.enabled)
        .filter_map(|policy| match &policy.body {
            PolicyBody::Rules(body) => Some((policy, body)),
            PolicyBody::Statements(_) => None,
        })
        .filter(|(_, body)| body.actions.is_empty() || match_action(&body.actions, action))
        .filter(|(_, body)| match_resource_patterns(&body.resource_patterns, ctx))
        .collect();
    rule_based.sort_by_key(|(_, body)| body.priority);

    let mut candidates: Vec<Candidate<'a>> = rule_based
        .into_iter()
        .map(|(policy, body)| Candidate {
            policy_id: &policy.id,
            statement_id: None,
            effect: body.effect,
            check: Check::Rules(&body.rules),
        })
        .collect();

    for policy in policies.iter().filter(|policy| policy.enabled) {
        let PolicyBody::Statements(body) = &policy.body else {
            continue;
        };
        for statement in &body.statements {
            let in_scope = match_action(&statement.actions, action)
                && keys
                    .iter()
                    .any(|key| match_resource(&statement.resources, key, ctx))
                && !keys
                    .iter()
                    .any(|key| match_resource(&statement.not_resources, key, ctx));
            if in_scope {
                candidates.push(Candidate {
                    policy_id: &policy.id,
                    statement_id: statement.sid.as_deref(),
                    effect: statement.effect,
                    check: statement
                        .condition
                        .as_ref()
                        .map_or(Check::Always, Check::Condition),
                });
            }
        }
    }

    candidates
}

/// Result, matched list and reason.
type Verdict = (DecisionResult, Vec<PolicyMatch>, String);

fn decide(candidates: &[Candidate<'_>], ctx: &EvaluationContext) -> Verdict {
    let mut matched = Vec::new();
    for candidate in candidates {
        if !candidate.satisfied(ctx) {
            continue;
        }
        let hit = candidate.to_match();
        match candidate.effect {
            Effect::Deny => {
                let reason = format!("denied by {hit}");
                matched.push(hit);
                return (DecisionResult::Deny, matched, reason);
            }
            Effect::Allow => matched.push(hit),
        }
    }

    if matched.is_empty() {
        (DecisionResult::NotApplicable, matched, NO_MATCH_REASON.to_string())
    } else {
        let ids: Vec<String> = matched.iter().map(ToString::to_string).collect();
        let reason = format!("permitted by {}", ids.join(", "));
        (DecisionResult::Permit, matched, reason)
    }
}

// ============================================================================
// Decision point
// ============================================================================

/// What a completed evaluation hands to [`Pdp::finish`].
struct Outcome {
    verdict: Verdict,
    evaluated_at: DateTime<Utc>,
    environment: Attributes,
}

/// The policy decision point.
///
/// Stateless per request; share one instance across tasks.
///
/// # Example
///
/// ```
/// use warden_abac::{EngineConfig, EvaluationRequest, MemoryStore, Pdp};
///
/// # async fn demo() -> Result<(), warden_abac::AbacError> {
/// let pdp = Pdp::new(MemoryStore::new(), EngineConfig::strict())?.without_audit();
/// let err = pdp
///     .evaluate(&EvaluationRequest::new("", "res-1", "read"))
///     .await
///     .unwrap_err();
/// assert_eq!(err.to_string(), "invalid request: subject_id is required");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pdp<S> {
    store: S,
    config: EngineConfig,
    resolver: AttributeResolver,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<S: PolicyStore> Pdp<S> {
    /// Creates a decision point. Audit records go to [`TracingAuditSink`]
    /// unless `config.audit` is off.
    ///
    /// # Errors
    ///
    /// Returns [`AbacError::Config`] if the configuration is invalid.
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let resolver = AttributeResolver::new(&config)?;
        let audit: Option<Arc<dyn AuditSink>> = if config.audit {
            Some(Arc::new(TracingAuditSink))
        } else {
            None
        };
        Ok(Self {
            store,
            config,
            resolver,
            audit,
        })
    }

    /// Replaces the audit sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Disables audit records (for testing).
    pub fn without_audit(mut self) -> Self {
        self.audit = None;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Builds the evaluation context for `request` without deciding.
    ///
    /// # Errors
    ///
    /// Same as [`AttributeResolver::enrich`].
    pub async fn enrich_context(&self, request: &EvaluationRequest) -> Result<EvaluationContext> {
        self.resolver.enrich(&self.store, request).await
    }

    /// Evaluates `request` without a deadline.
    ///
    /// # Errors
    ///
    /// `Validation`, `NotFound`, `UnknownOperator` and `InvalidPolicy` always
    /// propagate. `Storage` propagates only when fail-safe is off; otherwise
    /// it becomes a deny decision.
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<Decision> {
        let started = std::time::Instant::now();
        let phase = PhaseTracker::default();
        let outcome = self.run(request, &phase).await;
        self.finish(request, outcome, started)
    }

    /// Evaluates `request`, giving up at `deadline` or when `cancel` fires.
    ///
    /// On expiry or cancellation the in-flight evaluation (including any
    /// pending store call) is dropped. With fail-safe on the caller receives a
    /// deny naming the phase that was interrupted; otherwise
    /// [`AbacError::EvaluationTimeout`] or [`AbacError::Cancelled`].
    ///
    /// # Errors
    ///
    /// As [`Pdp::evaluate`], plus the timeout and cancellation errors above.
    pub async fn enforce_with_timeout(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        request: &EvaluationRequest,
    ) -> Result<Decision> {
        let started = std::time::Instant::now();
        let phase = PhaseTracker::default();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AbacError::Cancelled { phase: phase.current() }),
            () = tokio::time::sleep_until(deadline) => {
                Err(AbacError::EvaluationTimeout { phase: phase.current() })
            }
            outcome = self.run(request, &phase) => outcome,
        };

        self.finish(request, outcome, started)
    }

    /// [`Pdp::enforce_with_timeout`] with a relative timeout and no external
    /// cancellation.
    ///
    /// # Errors
    ///
    /// As [`Pdp::enforce_with_timeout`].
    pub async fn evaluate_within(
        &self,
        timeout: Duration,
        request: &EvaluationRequest,
    ) -> Result<Decision> {
        let cancel = CancellationToken::new();
        self.enforce_with_timeout(Instant::now() + timeout, &cancel, request)
            .await
    }

    async fn run(&self, request: &EvaluationRequest, phase: &PhaseTracker) -> Result<Outcome> {
        phase.enter(Phase::Enriching);
        debug!(request_id = %request.request_id, phase = %Phase::Enriching, "Evaluation phase");
        let ctx = self.resolver.enrich(&self.store, request).await?;

        phase.enter(Phase::Filtering);
        let policies = self.store.policies().await?;
        let candidates = filter_candidates(&policies, &ctx);
        debug!(
            request_id = %request.request_id,
            phase = %Phase::Filtering,
            policies = policies.len(),
            candidates = candidates.len(),
            "Evaluation phase"
        );

        phase.enter(Phase::Evaluating);
        let verdict = decide(&candidates, &ctx);

        phase.enter(Phase::Decided);
        debug!(request_id = %request.request_id, phase = %Phase::Decided, "Evaluation phase");
        Ok(Outcome {
            verdict,
            evaluated_at: ctx.evaluated_at,
            environment: ctx.environment,
        })
    }

    /// Turns an outcome into a decision, applying fail-safe conversion, and
    /// emits the audit record.
    fn finish(
        &self,
        request: &EvaluationRequest,
        outcome: Result<Outcome>,
        started: std::time::Instant,
    ) -> Result<Decision> {
        let elapsed = started.elapsed();

        let (decision, environment) = match outcome {
            Ok(Outcome {
                verdict: (result, matched, reason),
                evaluated_at,
                environment,
            }) => {
                let decision = Decision {
                    request_id: request.request_id.clone(),
                    result,
                    matched,
                    reason,
                    elapsed,
                    evaluated_at,
                };
                log_decision(request, &decision);
                (decision, environment)
            }
            Err(err) if self.config.fail_safe && err.is_fail_safe_eligible() => {
                error!(
                    request_id = %request.request_id,
                    subject_id = %request.subject_id,
                    error = %err,
                    "Evaluation failed, denying access"
                );
                let decision = Decision {
                    request_id: request.request_id.clone(),
                    result: DecisionResult::Deny,
                    matched: Vec::new(),
                    reason: err.fail_safe_reason(),
                    elapsed,
                    evaluated_at: request.timestamp.unwrap_or_else(Utc::now),
                };
                (decision, request.environment.clone())
            }
            Err(err) => {
                warn!(
                    request_id = %request.request_id,
                    error = %err,
                    "Evaluation failed"
                );
                return Err(err);
            }
        };

        if let Some(sink) = &self.audit {
            sink.record(&AuditRecord::new(request, &decision, environment));
        }
        Ok(decision)
    }
}

fn log_decision(request: &EvaluationRequest, decision: &Decision) {
    let matched = decision.matched_ids();
    if decision.is_deny() {
        warn!(
            request_id = %request.request_id,
            subject_id = %request.subject_id,
            resource_id = %request.resource_id,
            action = %request.action,
            matched = ?matched,
            "Access denied"
        );
    } else {
        info!(
            request_id = %request.request_id,
            subject_id = %request.subject_id,
            resource_id = %request.resource_id,
            action = %request.action,
            result = %decision.result,
            matched = ?matched,
            "Access decided"
        );
    }
}
