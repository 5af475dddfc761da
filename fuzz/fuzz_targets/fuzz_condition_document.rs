#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};
use warden_abac::Condition;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    // Unknown operators and malformed shapes are errors, never panics
    let Ok(condition) = Condition::from_document(&doc) else {
        return;
    };

    let ctx = json!({
        "subject": {"department": "finance", "clearance_level": 2, "tags": ["a", "b"]},
        "resource": {"type": "report", "path": "/api/v1/reports/7"},
        "environment": {
            "source_ip": "10.0.1.50",
            "timestamp": "2025-01-13T10:00:00Z",
            "time_of_day": "10:00",
            "day_of_week": "Monday"
        },
        "request": {"UserId": "user-123"}
    });

    let first = condition.evaluate(&ctx);
    assert_eq!(first, condition.evaluate(&ctx), "evaluation must be deterministic");
    assert_eq!(
        !first,
        Condition::negate(condition).evaluate(&ctx),
        "negation must flip the result"
    );
});
