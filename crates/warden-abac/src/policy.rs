//! Policy definitions and document parsing.
//!
//! A policy has one of two bodies:
//!
//! - **Rule-based**: an effect, a priority, a list of attribute rules that
//!   must all hold, and optional action / resource pattern scopes.
//! - **Statement-based**: a list of statements, each with its own effect,
//!   action and resource patterns, resource exclusions and condition tree.
//!
//! Policies are parsed from JSON documents ([`PolicyDocument`]) into the typed
//! model. Parsing resolves every operator, effect and target name, so a parsed
//! policy can always be evaluated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use warden_types::normalize_name;

use crate::condition::{self, Condition, Operator, UnknownOperator};
use crate::context::PathLookup;

// ============================================================================
// Errors
// ============================================================================

/// Error type for policy parsing.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    UnknownOperator(#[from] UnknownOperator),

    #[error("unknown effect '{0}'")]
    UnknownEffect(String),

    #[error("unknown target type '{0}'")]
    UnknownTarget(String),

    #[error("{0}")]
    Malformed(String),

    #[error("invalid policy document: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Effect
// ============================================================================

/// The effect of a matching policy or statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Effect {
    /// Grant access.
    Allow,
    /// Deny access. Outranks any allow.
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        })
    }
}

impl FromStr for Effect {
    type Err = PolicyError;

    /// Case-insensitive; `permit` is accepted for `allow`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" | "permit" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(PolicyError::UnknownEffect(s.to_string())),
        }
    }
}

impl TryFrom<String> for Effect {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Effect> for String {
    fn from(effect: Effect) -> Self {
        effect.to_string()
    }
}

// ============================================================================
// Rule-based policies
// ============================================================================

/// The context namespace a rule's attribute path is resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Subject,
    Resource,
    Action,
    Environment,
}

impl TargetType {
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Resource => "resource",
            Self::Action => "action",
            Self::Environment => "environment",
        }
    }
}

impl FromStr for TargetType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s.trim()).as_str() {
            "subject" | "user" | "principal" => Ok(Self::Subject),
            "resource" => Ok(Self::Resource),
            "action" => Ok(Self::Action),
            "environment" | "env" | "context" => Ok(Self::Environment),
            _ => Err(PolicyError::UnknownTarget(s.to_string())),
        }
    }
}

/// A single attribute comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub target: TargetType,
    /// Path within the target, e.g. `department` or `attributes.org.unit`.
    pub attribute_path: String,
    pub operator: Operator,
    pub expected: Value,
    /// Inverts the comparison.
    pub negate: bool,
}

impl Rule {
    pub fn new(
        target: TargetType,
        attribute_path: impl Into<String>,
        operator: Operator,
        expected: impl Into<Value>,
    ) -> Self {
        Self {
            target,
            attribute_path: attribute_path.into(),
            operator,
            expected: expected.into(),
            negate: false,
        }
    }

    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Full context path (`namespace.attribute_path`).
    pub fn path(&self) -> String {
        format!("{}.{}", self.target.namespace(), self.attribute_path)
    }

    /// Returns `true` if the rule holds in `ctx`.
    pub fn holds<C: PathLookup + ?Sized>(&self, ctx: &C) -> bool {
        condition::compare(ctx, &self.path(), self.operator, &self.expected) != self.negate
    }
}

/// Rule-based policy body.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleBasedPolicy {
    pub effect: Effect,
    /// Lower values are evaluated first.
    pub priority: i32,
    pub rules: Vec<Rule>,
    /// Action patterns. Empty applies to every action.
    pub actions: Vec<String>,
    /// Resource patterns. Empty applies to every resource.
    pub resource_patterns: Vec<String>,
}

impl RuleBasedPolicy {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            priority: 0,
            rules: Vec::new(),
            actions: Vec::new(),
            resource_patterns: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_action(mut self, pattern: impl Into<String>) -> Self {
        self.actions.push(pattern.into());
        self
    }

    pub fn with_resource_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.resource_patterns.push(pattern.into());
        self
    }
}

// ============================================================================
// Statement-based policies
// ============================================================================

/// One clause of a statement-based policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    /// Resources excluded even when `resources` matches.
    pub not_resources: Vec<String>,
    /// Absent means always satisfied.
    pub condition: Option<Condition>,
}

impl Statement {
    pub fn new(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            actions: Vec::new(),
            resources: Vec::new(),
            not_resources: Vec::new(),
            condition: None,
        }
    }

    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Effect::Deny)
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_action(mut self, pattern: impl Into<String>) -> Self {
        self.actions.push(pattern.into());
        self
    }

    pub fn with_resource(mut self, pattern: impl Into<String>) -> Self {
        self.resources.push(pattern.into());
        self
    }

    pub fn with_not_resource(mut self, pattern: impl Into<String>) -> Self {
        self.not_resources.push(pattern.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Statement-based policy body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementPolicy {
    pub version: String,
    pub statements: Vec<Statement>,
}

impl StatementPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyBody {
    Rules(RuleBasedPolicy),
    Statements(StatementPolicy),
}

impl From<RuleBasedPolicy> for PolicyBody {
    fn from(body: RuleBasedPolicy) -> Self {
        Self::Rules(body)
    }
}

impl From<StatementPolicy> for PolicyBody {
    fn from(body: StatementPolicy) -> Self {
        Self::Statements(body)
    }
}

/// A named, switchable access-control policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub id: String,
    pub name: String,
    /// Disabled policies are skipped during filtering.
    pub enabled: bool,
    pub body: PolicyBody,
}

impl Policy {
    pub fn new(id: impl Into<String>, body: impl Into<PolicyBody>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            body: body.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Parses a single JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the JSON is invalid or the document does not
    /// describe a valid policy.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        serde_json::from_str::<PolicyDocument>(json)?.try_into()
    }

    /// Parses a JSON array of policy documents.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid document.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, PolicyError> {
        serde_json::from_str::<Vec<PolicyDocument>>(json)?
            .into_iter()
            .map(Self::try_from)
            .collect()
    }
}

// ============================================================================
// Documents
// ============================================================================

/// A policy as stored: either statement form or the legacy rule form.
///
/// Field names follow the stored PascalCase spelling; snake_case and
/// camelCase aliases are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default, alias = "ID", alias = "Id")]
    pub id: String,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default = "enabled_by_default", alias = "Enabled")]
    pub enabled: bool,

    #[serde(default, rename = "Version", alias = "version")]
    pub version: Option<String>,
    #[serde(
        default,
        rename = "Statement",
        alias = "statement",
        alias = "Statements",
        alias = "statements",
        skip_serializing_if = "Option::is_none"
    )]
    pub statements: Option<Vec<StatementDocument>>,

    #[serde(default, rename = "Effect", alias = "effect", skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, rename = "Priority", alias = "priority")]
    pub priority: i32,
    #[serde(default, rename = "Rules", alias = "rules")]
    pub rules: Vec<RuleDocument>,
    #[serde(
        default,
        rename = "Actions",
        alias = "actions",
        deserialize_with = "one_or_many"
    )]
    pub actions: Vec<String>,
    #[serde(
        default,
        rename = "ResourcePatterns",
        alias = "resource_patterns",
        alias = "resourcePatterns",
        deserialize_with = "one_or_many"
    )]
    pub resource_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementDocument {
    #[serde(default, rename = "Sid", alias = "sid", skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect", alias = "effect")]
    pub effect: String,
    #[serde(default, rename = "Action", alias = "action", alias = "actions", deserialize_with = "one_or_many")]
    pub actions: Vec<String>,
    #[serde(
        default,
        rename = "Resource",
        alias = "resource",
        alias = "resources",
        deserialize_with = "one_or_many"
    )]
    pub resources: Vec<String>,
    #[serde(
        default,
        rename = "NotResource",
        alias = "not_resource",
        alias = "notResource",
        deserialize_with = "one_or_many"
    )]
    pub not_resources: Vec<String>,
    #[serde(default, rename = "Condition", alias = "condition", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(rename = "TargetType", alias = "target_type", alias = "targetType", alias = "target")]
    pub target_type: String,
    #[serde(rename = "AttributePath", alias = "attribute_path", alias = "attributePath")]
    pub attribute_path: String,
    #[serde(rename = "Operator", alias = "operator")]
    pub operator: String,
    #[serde(default, rename = "ExpectedValue", alias = "expected_value", alias = "expectedValue")]
    pub expected_value: Value,
    #[serde(default, rename = "IsNegative", alias = "is_negative", alias = "isNegative")]
    pub is_negative: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Accepts a string, an array of strings or null.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(one)) => vec![one],
        Some(OneOrMany::Many(many)) => many,
    })
}

impl TryFrom<PolicyDocument> for Policy {
    type Error = PolicyError;

    fn try_from(doc: PolicyDocument) -> Result<Self, Self::Error> {
        let id = doc.id.trim().to_string();
        if id.is_empty() {
            return Err(PolicyError::Malformed("policy id is required".to_string()));
        }

        let body = match (doc.statements, doc.effect) {
            (Some(_), Some(_)) => {
                return Err(PolicyError::Malformed(format!(
                    "policy '{id}' declares both Statement and Effect"
                )));
            }
            (Some(statements), None) => PolicyBody::Statements(StatementPolicy {
                version: doc.version.unwrap_or_default(),
                statements: statements
                    .into_iter()
                    .enumerate()
                    .map(|(index, statement)| parse_statement(&id, index, statement))
                    .collect::<Result<_, _>>()?,
            }),
            (None, Some(effect)) => PolicyBody::Rules(RuleBasedPolicy {
                effect: effect.parse()?,
                priority: doc.priority,
                rules: doc
                    .rules
                    .into_iter()
                    .map(parse_rule)
                    .collect::<Result<_, _>>()?,
                actions: doc.actions,
                resource_patterns: doc.resource_patterns,
            }),
            (None, None) => {
                return Err(PolicyError::Malformed(format!(
                    "policy '{id}' has neither Statement nor Effect"
                )));
            }
        };

        Ok(Self {
            name: if doc.name.is_empty() { id.clone() } else { doc.name },
            id,
            enabled: doc.enabled,
            body,
        })
    }
}

fn parse_statement(
    policy_id: &str,
    index: usize,
    doc: StatementDocument,
) -> Result<Statement, PolicyError> {
    let label = doc
        .sid
        .clone()
        .unwrap_or_else(|| format!("#{index}"));
    if doc.actions.is_empty() {
        return Err(PolicyError::Malformed(format!(
            "statement {label} of policy '{policy_id}' has no Action"
        )));
    }
    if doc.resources.is_empty() {
        return Err(PolicyError::Malformed(format!(
            "statement {label} of policy '{policy_id}' has no Resource"
        )));
    }

    Ok(Statement {
        sid: doc.sid,
        effect: doc.effect.parse()?,
        actions: doc.actions,
        resources: doc.resources,
        not_resources: doc.not_resources,
        condition: doc
            .condition
            .as_ref()
            .map(Condition::from_document)
            .transpose()?,
    })
}

fn parse_rule(doc: RuleDocument) -> Result<Rule, PolicyError> {
    Ok(Rule {
        target: doc.target_type.parse()?,
        attribute_path: doc.attribute_path,
        operator: doc.operator.parse()?,
        expected: doc.expected_value,
        negate: doc.is_negative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_statement_policy() {
        let policy = Policy::from_json(
            r#"{
                "id": "doc-owner",
                "name": "Document owners",
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": "OwnerAccess",
                    "Effect": "Allow",
                    "Action": "document-service:file:*",
                    "Resource": ["api:documents:owner:${request:UserId}/*"],
                    "NotResource": "api:documents:owner:*/secret",
                    "Condition": {"StringEquals": {"subject.department": "engineering"}}
                }]
            }"#,
        )
        .unwrap();

        assert!(policy.enabled);
        let PolicyBody::Statements(body) = &policy.body else {
            panic!("expected statement body");
        };
        assert_eq!(body.version, "2012-10-17");
        let statement = &body.statements[0];
        assert_eq!(statement.sid.as_deref(), Some("OwnerAccess"));
        assert_eq!(statement.effect, Effect::Allow);
        assert_eq!(statement.actions, vec!["document-service:file:*"]);
        assert_eq!(statement.not_resources.len(), 1);
        assert_eq!(
            statement.condition,
            Some(Condition::compare(
                "subject.department",
                Operator::Equals,
                "engineering"
            ))
        );
    }

    #[test]
    fn parses_legacy_rule_policy() {
        let policy = Policy::from_json(
            r#"{
                "ID": "probation-deny",
                "Name": "Probation",
                "Enabled": true,
                "Effect": "deny",
                "Priority": 10,
                "Rules": [{
                    "TargetType": "user",
                    "AttributePath": "on_probation",
                    "Operator": "Bool",
                    "ExpectedValue": true,
                    "IsNegative": false
                }],
                "Actions": ["write"],
                "ResourcePatterns": "*"
            }"#,
        )
        .unwrap();

        let PolicyBody::Rules(body) = &policy.body else {
            panic!("expected rule body");
        };
        assert_eq!(body.effect, Effect::Deny);
        assert_eq!(body.priority, 10);
        assert_eq!(body.rules[0].target, TargetType::Subject);
        assert_eq!(body.rules[0].path(), "subject.on_probation");
        assert_eq!(body.resource_patterns, vec!["*"]);
    }

    #[test]
    fn effect_names() {
        assert_eq!("Permit".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!("DENY".parse::<Effect>().unwrap(), Effect::Deny);
        assert!(matches!(
            "maybe".parse::<Effect>(),
            Err(PolicyError::UnknownEffect(ref e)) if e == "maybe"
        ));
    }

    #[test]
    fn unknown_operator_fails_parse() {
        let err = Policy::from_json(
            r#"{"id": "p", "Effect": "Allow", "Rules": [
                {"TargetType": "subject", "AttributePath": "x", "Operator": "FuzzyEquals"}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownOperator(ref u) if u.name() == "FuzzyEquals"));
    }

    #[test]
    fn rejects_malformed_documents() {
        let cases = [
            r#"{"Effect": "Allow"}"#,
            r#"{"id": "p"}"#,
            r#"{"id": "p", "Effect": "Allow", "Statement": []}"#,
            r#"{"id": "p", "Statement": [{"Effect": "Allow", "Resource": "*"}]}"#,
            r#"{"id": "p", "Statement": [{"Effect": "Allow", "Action": "*"}]}"#,
        ];
        for case in cases {
            assert!(
                matches!(Policy::from_json(case), Err(PolicyError::Malformed(_))),
                "{case}"
            );
        }
        assert!(matches!(
            Policy::from_json(r#"{"id": "p", "Effect": "Allow", "Rules": [{"TargetType": "planet", "AttributePath": "x", "Operator": "eq"}]}"#),
            Err(PolicyError::UnknownTarget(_))
        ));
        assert!(matches!(Policy::from_json("{"), Err(PolicyError::Json(_))));
    }

    #[test]
    fn negated_rule_inverts() {
        let ctx = json!({"subject": {"department": "hr"}});
        let rule = Rule::new(TargetType::Subject, "department", Operator::Equals, "finance");
        assert!(!rule.holds(&ctx));
        assert!(rule.negated().holds(&ctx));
    }

    #[test]
    fn disabled_flag_round_trips() {
        let policy = Policy::from_json(r#"{"id": "p", "enabled": false, "Effect": "Allow"}"#).unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.name, "p");
    }
}
