#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use warden_abac::{PatternKind, match_pattern, match_resource_pattern, resolve_hierarchy};

#[derive(Debug, Arbitrary)]
struct Input {
    pattern: String,
    value: String,
    resource: bool,
}

fuzz_target!(|input: Input| {
    let kind = if input.resource {
        PatternKind::Resource
    } else {
        PatternKind::Action
    };

    let matched = match_pattern(&input.pattern, &input.value, kind);
    if input.value.is_empty() {
        assert!(!matched, "empty values never match");
    } else {
        if input.pattern == input.value {
            assert!(matched, "a value matches itself");
        }
        assert!(match_pattern("*", &input.value, kind));
    }

    let _ = match_resource_pattern(&input.pattern, &input.value);

    let levels = resolve_hierarchy(&input.value);
    assert_eq!(levels.len() % 2, 0);
});
