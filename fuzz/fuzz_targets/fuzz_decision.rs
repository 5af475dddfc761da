#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use warden_abac::{
    Condition, DecisionResult, Effect, EngineConfig, EvaluationRequest, MemoryStore, Operator,
    Pdp, Policy, Rule, RuleBasedPolicy, Statement, StatementPolicy, TargetType,
};
use warden_types::{Action, Resource, Subject};

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzEffect {
    Allow,
    Deny,
}

impl From<FuzzEffect> for Effect {
    fn from(f: FuzzEffect) -> Self {
        match f {
            FuzzEffect::Allow => Effect::Allow,
            FuzzEffect::Deny => Effect::Deny,
        }
    }
}

/// Comparisons over the attributes the fixture subject carries.
#[derive(Debug, Clone, Arbitrary)]
enum FuzzCondition {
    DepartmentEquals(String),
    LevelAtLeast(i8),
    TagContains(String),
    InternalIp,
    And2(Box<FuzzCondition>, Box<FuzzCondition>),
    Or2(Box<FuzzCondition>, Box<FuzzCondition>),
    Not(Box<FuzzCondition>),
}

impl FuzzCondition {
    /// Combinators past depth 3 collapse to a leaf.
    fn to_condition(&self, depth: u8) -> Condition {
        if depth > 3 {
            return Condition::compare("environment.is_internal_ip", Operator::Bool, true);
        }
        match self {
            Self::DepartmentEquals(d) => {
                Condition::compare("subject.department", Operator::Equals, d.as_str())
            }
            Self::LevelAtLeast(n) => {
                Condition::compare("subject.level", Operator::GreaterThanEquals, i64::from(*n))
            }
            Self::TagContains(t) => {
                Condition::compare("subject.tags", Operator::ArrayContains, t.as_str())
            }
            Self::InternalIp => {
                Condition::compare("environment.source_ip", Operator::IsInternalIp, true)
            }
            Self::And2(a, b) => {
                Condition::all([a.to_condition(depth + 1), b.to_condition(depth + 1)])
            }
            Self::Or2(a, b) => {
                Condition::any([a.to_condition(depth + 1), b.to_condition(depth + 1)])
            }
            Self::Not(c) => Condition::negate(c.to_condition(depth + 1)),
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzPolicy {
    Rules {
        effect: FuzzEffect,
        priority: i32,
        department: String,
        actions: Vec<String>,
        resource_patterns: Vec<String>,
    },
    Statement {
        effect: FuzzEffect,
        action: String,
        resource: String,
        condition: Option<FuzzCondition>,
    },
}

impl FuzzPolicy {
    fn to_policy(&self, index: usize) -> Policy {
        let id = format!("p{index}");
        match self {
            Self::Rules {
                effect,
                priority,
                department,
                actions,
                resource_patterns,
            } => {
                let mut body = RuleBasedPolicy::new((*effect).into())
                    .with_priority(*priority)
                    .with_rule(Rule::new(
                        TargetType::Subject,
                        "department",
                        Operator::Equals,
                        department.as_str(),
                    ));
                for action in actions.iter().take(4) {
                    body = body.with_action(action.as_str());
                }
                for pattern in resource_patterns.iter().take(4) {
                    body = body.with_resource_pattern(pattern.as_str());
                }
                Policy::new(id, body)
            }
            Self::Statement {
                effect,
                action,
                resource,
                condition,
            } => {
                let mut statement = Statement::new((*effect).into())
                    .with_action(action.as_str())
                    .with_resource(resource.as_str());
                if let Some(condition) = condition {
                    statement = statement.with_condition(condition.to_condition(0));
                }
                Policy::new(id, StatementPolicy::new().with_statement(statement))
            }
        }
    }
}

#[derive(Debug, Arbitrary)]
struct Input {
    policies: Vec<FuzzPolicy>,
    department: String,
    level: i8,
    action: String,
    resource_path: String,
    source_ip: String,
}

fuzz_target!(|input: Input| {
    if input.action.trim().is_empty() || input.policies.len() > 16 {
        return;
    }

    let mut store = MemoryStore::new()
        .with_subject(
            Subject::new("sub")
                .with_attribute("department", input.department.as_str())
                .with_attribute("level", i64::from(input.level))
                .with_attribute("tags", vec!["a", "b"]),
        )
        .with_resource(Resource::new("res").with_path(input.resource_path.as_str()))
        .with_action(Action::new("act", input.action.as_str()));
    for (index, policy) in input.policies.iter().enumerate() {
        store = store.with_policy(policy.to_policy(index));
    }

    let pdp = Pdp::new(store, EngineConfig::strict())
        .expect("default engine config is valid")
        .without_audit();
    let request = EvaluationRequest::new("sub", "res", input.action.as_str())
        .with_environment("source_ip", input.source_ip.as_str());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("current-thread runtime");
    let decision = runtime
        .block_on(pdp.evaluate(&request))
        .expect("an in-memory store never fails");

    assert!(!decision.reason.is_empty(), "every decision carries a reason");
    match decision.result {
        DecisionResult::Deny => {
            let last = decision.matched.last().expect("a deny names its policy");
            assert_eq!(last.effect, Effect::Deny);
        }
        DecisionResult::Permit => {
            assert!(!decision.matched.is_empty());
            assert!(decision.matched.iter().all(|m| m.effect == Effect::Allow));
        }
        DecisionResult::NotApplicable => assert!(decision.matched.is_empty()),
    }
});
