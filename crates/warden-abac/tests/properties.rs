//! Property tests for condition logic, pattern matching and derivation.

use proptest::prelude::*;
use serde_json::{Value, json};
use warden_abac::{
    Condition, Operator, PatternKind, is_internal_ip, match_action, match_pattern,
    resolve_hierarchy,
};

fn context(level: i64, department: &str) -> Value {
    json!({"subject": {"level": level, "department": department}})
}

fn leaf() -> impl Strategy<Value = Condition> {
    prop_oneof![
        (0i64..5).prop_map(|n| Condition::compare("subject.level", Operator::GreaterThanEquals, n)),
        (0i64..5).prop_map(|n| Condition::compare("subject.level", Operator::Equals, n)),
        prop::sample::select(vec!["eng", "ops", "hr"])
            .prop_map(|d| Condition::compare("subject.department", Operator::Equals, d)),
        Just(Condition::compare("subject.missing", Operator::Equals, 1)),
    ]
}

fn condition() -> impl Strategy<Value = Condition> {
    leaf().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Condition::all),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Condition::any),
            inner.prop_map(Condition::negate),
        ]
    })
}

fn context_strategy() -> impl Strategy<Value = Value> {
    (0i64..5, prop::sample::select(vec!["eng", "ops", "hr"]))
        .prop_map(|(level, department)| context(level, department))
}

#[test]
fn empty_combinators() {
    let ctx = context(1, "eng");
    assert!(Condition::all([]).evaluate(&ctx));
    assert!(!Condition::any([]).evaluate(&ctx));
}

proptest! {
    #[test]
    fn double_negation_is_identity(cond in condition(), ctx in context_strategy()) {
        let twice = Condition::negate(Condition::negate(cond.clone()));
        prop_assert_eq!(twice.evaluate(&ctx), cond.evaluate(&ctx));
    }

    #[test]
    fn de_morgan(a in condition(), b in condition(), ctx in context_strategy()) {
        let lhs = Condition::negate(Condition::all([a.clone(), b.clone()]));
        let rhs = Condition::any([Condition::negate(a), Condition::negate(b)]);
        prop_assert_eq!(lhs.evaluate(&ctx), rhs.evaluate(&ctx));
    }

    #[test]
    fn evaluation_is_deterministic(cond in condition(), ctx in context_strategy()) {
        prop_assert_eq!(cond.evaluate(&ctx), cond.evaluate(&ctx));
    }

    #[test]
    fn and_is_all_or_is_any(children in prop::collection::vec(condition(), 0..5), ctx in context_strategy()) {
        let results: Vec<bool> = children.iter().map(|c| c.evaluate(&ctx)).collect();
        prop_assert_eq!(
            Condition::all(children.clone()).evaluate(&ctx),
            results.iter().all(|r| *r)
        );
        prop_assert_eq!(
            Condition::any(children).evaluate(&ctx),
            results.iter().any(|r| *r)
        );
    }

    #[test]
    fn star_matches_any_action(action in "[a-z][a-z0-9:-]{0,20}") {
        prop_assert!(match_action(&["*"], &action));
        prop_assert!(match_action(&[action.as_str()], &action));
    }

    #[test]
    fn service_wildcard_matches_its_resources(
        service in "[a-z]{1,8}",
        resource in "[a-z]{1,8}",
        verb in "[a-z]{1,8}",
    ) {
        let action = format!("{service}:{resource}:{verb}");
        let service_any = format!("{service}:*");
        let service_any_verb = format!("{service}:*:{verb}");
        let other_service_any = format!("{service}x:*");
        prop_assert!(match_pattern(&service_any, &action, PatternKind::Action));
        prop_assert!(match_pattern(&service_any_verb, &action, PatternKind::Action));
        prop_assert!(!match_pattern(&other_service_any, &action, PatternKind::Action));
    }

    #[test]
    fn hierarchy_has_two_entries_per_segment(segments in prop::collection::vec("[a-z0-9]{1,6}", 1..6)) {
        let path = format!("/{}", segments.join("/"));
        let levels = resolve_hierarchy(&path);

        prop_assert_eq!(levels.len(), segments.len() * 2);
        prop_assert!(levels.contains(&path));
        for level in &levels {
            let prefix = level.trim_end_matches("/*");
            prop_assert!(path.starts_with(prefix));
        }
    }

    #[test]
    fn ten_slash_eight_is_internal(b in 0u8.., c in 0u8.., d in 0u8..) {
        let ip = format!("10.{b}.{c}.{d}");
        prop_assert!(is_internal_ip(&ip));
    }

    #[test]
    fn documentation_range_is_external(d in 0u8..) {
        let ip = format!("203.0.113.{d}");
        prop_assert!(!is_internal_ip(&ip));
    }
}

#[test]
fn hierarchy_of_users_path() {
    assert_eq!(
        resolve_hierarchy("/api/v1/users/123"),
        vec![
            "/api",
            "/api/*",
            "/api/v1",
            "/api/v1/*",
            "/api/v1/users",
            "/api/v1/users/*",
            "/api/v1/users/123",
            "/api/v1/users/123/*",
        ]
    );
}
