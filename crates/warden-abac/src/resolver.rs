//! Attribute resolution (PIP).
//!
//! Turns the identifiers in an [`EvaluationRequest`] into an
//! [`EvaluationContext`]: entity records are fetched from the store and the
//! environment and subject are enriched with derived attributes.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use serde_json::Value;
use tracing::{debug, warn};
use warden_types::{Attributes, Subject};

use crate::config::{BusinessHours, ConfigError, EngineConfig};
use crate::context::{EvaluationContext, EvaluationRequest, RequestInfo};
use crate::error::{AbacError, Result};
use crate::network::{InternalNetworks, ip_subnet};
use crate::store::PolicyStore;

/// Naive timestamp layouts, read as UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

const DAYS_PER_YEAR: f64 = 365.25;
const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Resolver
// ============================================================================

/// Builds evaluation contexts.
#[derive(Debug, Clone)]
pub struct AttributeResolver {
    business_hours: BusinessHours,
    networks: InternalNetworks,
}

impl Default for AttributeResolver {
    fn default() -> Self {
        Self {
            business_hours: BusinessHours::default(),
            networks: InternalNetworks::rfc1918(),
        }
    }
}

impl AttributeResolver {
    pub fn new(config: &EngineConfig) -> std::result::Result<Self, ConfigError> {
        config.business_hours.validate()?;
        Ok(Self {
            business_hours: config.business_hours.clone(),
            networks: InternalNetworks::parse(config.internal_networks.as_slice())?,
        })
    }

    /// Validates the request, fetches its entities and derives attributes.
    ///
    /// # Errors
    ///
    /// - [`AbacError::Validation`] if an identifier is empty or whitespace
    /// - [`AbacError::NotFound`] if an entity does not exist
    /// - [`AbacError::Storage`] for any other store failure
    pub async fn enrich<S: PolicyStore + ?Sized>(
        &self,
        store: &S,
        request: &EvaluationRequest,
    ) -> Result<EvaluationContext> {
        validate_request(request)?;

        let subject = store.subject(&request.subject_id).await?;
        let resource = store.resource(&request.resource_id).await?;
        let action = store.action(&request.action).await?;

        let mut environment = request.environment.clone();
        if let Some(ts) = request.timestamp {
            environment
                .entry("timestamp")
                .or_insert_with(|| Value::String(ts.to_rfc3339()));
        }
        let environment = self.enrich_environment(&environment);

        let at = evaluation_time(request);
        let derived = derive_subject_attributes(&subject, at);
        debug!(
            subject_id = %subject.id,
            resource_id = %resource.id,
            action = %action.name,
            derived = derived.len(),
            "Context enriched"
        );

        Ok(EvaluationContext::new(
            RequestInfo::from(request),
            subject,
            resource,
            action,
            at.with_timezone(&Utc),
        )
        .with_environment(environment)
        .with_derived_subject_attributes(derived))
    }

    /// Returns a copy of `environment` with time and network keys derived
    /// from `timestamp` and `source_ip`.
    ///
    /// Derived keys replace caller-supplied keys of the same name.
    pub fn enrich_environment(&self, environment: &Attributes) -> Attributes {
        let mut enriched = environment.clone();

        if let Some(raw) = environment.get("timestamp").and_then(Value::as_str) {
            match parse_timestamp(raw) {
                Some(ts) => {
                    enriched.insert(
                        "time_of_day".to_string(),
                        Value::String(ts.format("%H:%M").to_string()),
                    );
                    enriched.insert(
                        "day_of_week".to_string(),
                        Value::String(day_name(ts.weekday()).to_string()),
                    );
                    enriched.insert("hour".to_string(), Value::from(ts.hour()));
                    enriched.insert(
                        "is_business_hours".to_string(),
                        Value::Bool(self.business_hours.contains(ts.weekday(), ts.hour())),
                    );
                }
                None => warn!(timestamp = %raw, "Unparsable environment timestamp"),
            }
        }

        if let Some(ip) = environment.get("source_ip").and_then(Value::as_str) {
            enriched.insert(
                "is_internal_ip".to_string(),
                Value::Bool(self.networks.contains(ip)),
            );
            enriched.insert("ip_subnet".to_string(), Value::String(ip_subnet(ip)));
        }

        enriched
    }
}

fn validate_request(request: &EvaluationRequest) -> Result<()> {
    for (field, value) in [
        ("subject_id", &request.subject_id),
        ("resource_id", &request.resource_id),
        ("action", &request.action),
    ] {
        if value.trim().is_empty() {
            return Err(AbacError::validation(field, "is required"));
        }
    }
    Ok(())
}

/// The explicit request timestamp, else a parsable environment `timestamp`,
/// else now.
fn evaluation_time(request: &EvaluationRequest) -> DateTime<FixedOffset> {
    if let Some(ts) = request.timestamp {
        return ts.fixed_offset();
    }
    request
        .environment
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(|| Utc::now().fixed_offset())
}

// ============================================================================
// Subject derivation
// ============================================================================

/// Attributes computed for `subject` at `at`: `years_of_service` (when a
/// `hire_date` is present), `current_hour` and `current_day`.
pub fn derive_subject_attributes(subject: &Subject, at: DateTime<FixedOffset>) -> Attributes {
    let mut derived = Attributes::new();

    if let Some(hire_date) = subject.attributes.get("hire_date").and_then(Value::as_str) {
        match years_of_service(hire_date, at.with_timezone(&Utc)) {
            Some(years) => {
                derived.insert("years_of_service".to_string(), Value::from(years));
            }
            None => warn!(subject_id = %subject.id, hire_date = %hire_date, "Unparsable hire_date"),
        }
    }

    derived.insert("current_hour".to_string(), Value::from(at.hour()));
    derived.insert(
        "current_day".to_string(),
        Value::String(day_name(at.weekday()).to_string()),
    );
    derived
}

/// Whole years between `hire_date` (`YYYY-MM-DD`, midnight UTC) and `at`,
/// counting 365.25 days per year. Never negative, and never less than the
/// number of anniversaries passed.
pub fn years_of_service(hire_date: &str, at: DateTime<Utc>) -> Option<i64> {
    let hired_on = parse_date(hire_date)?;
    let hired = hired_on.and_hms_opt(0, 0, 0)?.and_utc();
    #[allow(clippy::cast_precision_loss)]
    let days = (at - hired).num_seconds() as f64 / SECONDS_PER_DAY;
    #[allow(clippy::cast_possible_truncation)]
    let years = (days / DAYS_PER_YEAR).floor() as i64;
    // A span with a single Feb 29 falls just short of 5 * 365.25 days.
    let anniversaries = at.date_naive().years_since(hired_on).map_or(0, i64::from);
    Some(years.max(anniversaries).max(0))
}

// ============================================================================
// Paths and patterns
// ============================================================================

/// Expands a slash-delimited path into its ancestor chain, each level
/// followed by its `/*` wildcard.
///
/// ```
/// use warden_abac::resolve_hierarchy;
///
/// assert_eq!(
///     resolve_hierarchy("/api/v1"),
///     vec!["/api", "/api/*", "/api/v1", "/api/v1/*"],
/// );
/// ```
pub fn resolve_hierarchy(path: &str) -> Vec<String> {
    let mut levels = Vec::new();
    let mut prefix = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        prefix.push('/');
        prefix.push_str(segment);
        levels.push(prefix.clone());
        levels.push(format!("{prefix}/*"));
    }
    levels
}

/// Loose wildcard predicate used for resource patterns.
///
/// `*` matches everything and equal strings match. Otherwise the candidate
/// must start with the text before the first `*` and end with the text after
/// the last one, and every piece in between must occur somewhere in it.
/// Interior pieces are not checked for order.
pub fn match_resource_pattern(pattern: &str, resource: &str) -> bool {
    if pattern == "*" || pattern == resource {
        return true;
    }
    if !pattern.contains('*') {
        return false;
    }

    let pieces: Vec<&str> = pattern.split('*').collect();
    let (Some((first, rest)), Some(last)) = (pieces.split_first(), pieces.last()) else {
        return false;
    };
    let interior = &rest[..rest.len().saturating_sub(1)];

    resource.len() >= first.len() + last.len()
        && resource.starts_with(first)
        && resource.ends_with(last)
        && interior.iter().all(|piece| resource.contains(piece))
}

// ============================================================================
// Parsing helpers
// ============================================================================

/// Parses RFC 3339, or a naive `YYYY-MM-DD[T ]HH:MM:SS` read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        NAIVE_TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use test_case::test_case;

    fn env(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test_case("2025-01-06T10:00:00Z", true ; "monday ten")]
    #[test_case("2025-01-04T10:00:00Z", false ; "saturday ten")]
    #[test_case("2025-01-06T19:00:00Z", false ; "monday nineteen")]
    #[test_case("2025-01-06T08:00:00", true ; "naive start of window")]
    #[test_case("2025-01-06 18:00:00", false ; "naive end of window")]
    fn derives_business_hours(timestamp: &str, expected: bool) {
        let resolver = AttributeResolver::default();
        let enriched = resolver.enrich_environment(&env(&[("timestamp", json!(timestamp))]));
        assert_eq!(enriched["is_business_hours"], json!(expected));
    }

    #[test]
    fn derives_time_keys_in_timestamp_offset() {
        let resolver = AttributeResolver::default();
        let enriched =
            resolver.enrich_environment(&env(&[("timestamp", json!("2025-01-06T09:15:00+05:30"))]));
        assert_eq!(enriched["time_of_day"], json!("09:15"));
        assert_eq!(enriched["day_of_week"], json!("monday"));
        assert_eq!(enriched["hour"], json!(9));
        assert_eq!(enriched["is_business_hours"], json!(true));
    }

    #[test]
    fn derives_network_keys() {
        let resolver = AttributeResolver::default();
        let enriched = resolver.enrich_environment(&env(&[("source_ip", json!("10.0.1.50"))]));
        assert_eq!(enriched["is_internal_ip"], json!(true));
        assert_eq!(enriched["ip_subnet"], json!("10.0.1.0/24"));

        let enriched = resolver.enrich_environment(&env(&[("source_ip", json!("203.0.113.1"))]));
        assert_eq!(enriched["is_internal_ip"], json!(false));
    }

    #[test]
    fn enrichment_leaves_input_untouched() {
        let resolver = AttributeResolver::default();
        let input = env(&[
            ("timestamp", json!("not a time")),
            ("source_ip", json!("127.0.0.1")),
        ]);
        let enriched = resolver.enrich_environment(&input);
        assert_eq!(input.len(), 2);
        assert!(!enriched.contains_key("is_business_hours"));
        assert_eq!(enriched["is_internal_ip"], json!(true));
    }

    #[test]
    fn custom_business_hours() {
        let config = EngineConfig {
            business_hours: BusinessHours {
                weekdays: vec![Weekday::Sat],
                start_hour: 9,
                end_hour: 12,
            },
            ..EngineConfig::default()
        };
        let resolver = AttributeResolver::new(&config).unwrap();
        let enriched = resolver.enrich_environment(&env(&[("timestamp", json!("2025-01-04T10:00:00Z"))]));
        assert_eq!(enriched["is_business_hours"], json!(true));
    }

    #[test]
    fn tenure_spanning_leap_days() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(years_of_service("2020-01-15", at), Some(5));
        assert_eq!(years_of_service("2020-01-20", at), Some(4));
        assert_eq!(years_of_service("2026-01-01", at), Some(0));
        assert_eq!(years_of_service("15/01/2020", at), None);
    }

    #[test_case(2021, 0 ; "midnight on the anniversary")]
    #[test_case(2021, 5 ; "morning on the anniversary")]
    #[test_case(2019, 0 ; "span with one leap day")]
    fn tenure_counts_anniversaries(hire_year: i32, hour: u32) {
        let at = Utc
            .with_ymd_and_hms(hire_year + 5, 1, 15, hour, 0, 0)
            .unwrap();
        let hire_date = format!("{hire_year}-01-15");
        assert_eq!(years_of_service(&hire_date, at), Some(5));

        let day_before = at - chrono::Duration::days(1);
        assert_eq!(years_of_service(&hire_date, day_before), Some(4));
    }

    #[test]
    fn derives_subject_attributes() {
        let subject = Subject::new("sub-1").with_attribute("hire_date", "2020-01-15");
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap().fixed_offset();
        let derived = derive_subject_attributes(&subject, at);
        assert_eq!(derived["years_of_service"], json!(5));
        assert_eq!(derived["current_hour"], json!(10));
        assert_eq!(derived["current_day"], json!("wednesday"));
    }

    #[test]
    fn expands_hierarchy() {
        let levels = resolve_hierarchy("/api/v1/users/123");
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[0], "/api");
        assert_eq!(levels[7], "/api/v1/users/123/*");
        assert_eq!(resolve_hierarchy("//api//v1/"), resolve_hierarchy("/api/v1"));
        assert!(resolve_hierarchy("/").is_empty());
    }

    #[test_case("*", "anything", true ; "star")]
    #[test_case("/api/v1", "/api/v1", true ; "equal")]
    #[test_case("/api/v1", "/api/v2", false ; "different")]
    #[test_case("/api/*", "/api/v1/users", true ; "prefix")]
    #[test_case("*.pdf", "report.pdf", true ; "suffix")]
    #[test_case("a*a", "a", false ; "prefix and suffix overlap")]
    #[test_case("a*b*c", "acb", false ; "suffix missing")]
    #[test_case("a*b*c", "a-b-c", true ; "ordered interior")]
    #[test_case("x*c*b*y", "x-b-c-y", true ; "interior order not enforced")]
    fn resource_pattern_predicate(pattern: &str, resource: &str, expected: bool) {
        assert_eq!(match_resource_pattern(pattern, resource), expected);
    }

    #[test]
    fn parses_timestamps() {
        assert!(parse_timestamp("2025-01-06T10:00:00Z").is_some());
        assert!(parse_timestamp("2025-01-06T10:00:00.250").is_some());
        assert!(parse_timestamp("2025-01-06").is_none());
        assert_eq!(parse_date("2025-01-06"), NaiveDate::from_ymd_opt(2025, 1, 6));
    }
}
