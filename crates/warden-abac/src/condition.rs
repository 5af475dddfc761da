//! Condition trees and comparison operators.
//!
//! A [`Condition`] is either a single comparison of a context attribute
//! against an expected value, or an `And`/`Or`/`Not` composition of further
//! conditions. Operators are a closed enum: an unknown operator name is
//! rejected when the policy document is parsed, never during evaluation.
//!
//! Evaluation fails closed. An attribute that does not resolve, a value that
//! cannot be coerced, an invalid regex or an unparsable network all make the
//! comparison `false`.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{trace, warn};
use warden_types::normalize_name;

use crate::config::BusinessHours;
use crate::context::PathLookup;
use crate::matcher::substitute_variables;
use crate::network::{cidr_contains, is_internal_ip};
use crate::policy::PolicyError;
use crate::resolver::{parse_date, parse_timestamp};

// ============================================================================
// Unknown operator
// ============================================================================

/// An operator name that matches no known operator or alias.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operator '{name}'")]
pub struct UnknownOperator {
    name: String,
}

impl UnknownOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The operator name exactly as it appeared in the policy.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Operator
// ============================================================================

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    /// Case-insensitive glob with `*` and `?`.
    Like,
    /// Substring of a string, or element of an array.
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    NumericEquals,
    NumericNotEquals,
    /// Inclusive `[low, high]` bound.
    Between,
    Bool,
    InCidr,
    IsInternalIp,
    TimeAfter,
    TimeBefore,
    /// Inclusive `[start, end]` date range.
    DateBetween,
    DayOfWeek,
    IsBusinessHours,
    ArrayContains,
    ArraySize,
}

/// Accepted spellings, compared after [`normalize_name`].
const OPERATOR_ALIASES: &[(&str, Operator)] = &[
    ("equals", Operator::Equals),
    ("equal", Operator::Equals),
    ("eq", Operator::Equals),
    ("stringequals", Operator::Equals),
    ("stringequalsignorecase", Operator::Like),
    ("==", Operator::Equals),
    ("=", Operator::Equals),
    ("notequals", Operator::NotEquals),
    ("notequal", Operator::NotEquals),
    ("ne", Operator::NotEquals),
    ("neq", Operator::NotEquals),
    ("stringnotequals", Operator::NotEquals),
    ("!=", Operator::NotEquals),
    ("<>", Operator::NotEquals),
    ("like", Operator::Like),
    ("stringlike", Operator::Like),
    ("glob", Operator::Like),
    ("contains", Operator::Contains),
    ("stringcontains", Operator::Contains),
    ("includes", Operator::Contains),
    ("startswith", Operator::StartsWith),
    ("stringstartswith", Operator::StartsWith),
    ("prefix", Operator::StartsWith),
    ("endswith", Operator::EndsWith),
    ("stringendswith", Operator::EndsWith),
    ("suffix", Operator::EndsWith),
    ("regex", Operator::Regex),
    ("regexp", Operator::Regex),
    ("matches", Operator::Regex),
    ("stringregex", Operator::Regex),
    ("lessthan", Operator::LessThan),
    ("lt", Operator::LessThan),
    ("numericlessthan", Operator::LessThan),
    ("<", Operator::LessThan),
    ("lessthanequals", Operator::LessThanEquals),
    ("lessthanorequal", Operator::LessThanEquals),
    ("lessthanorequals", Operator::LessThanEquals),
    ("lte", Operator::LessThanEquals),
    ("le", Operator::LessThanEquals),
    ("numericlessthanequals", Operator::LessThanEquals),
    ("<=", Operator::LessThanEquals),
    ("greaterthan", Operator::GreaterThan),
    ("gt", Operator::GreaterThan),
    ("numericgreaterthan", Operator::GreaterThan),
    (">", Operator::GreaterThan),
    ("greaterthanequals", Operator::GreaterThanEquals),
    ("greaterthanorequal", Operator::GreaterThanEquals),
    ("greaterthanorequals", Operator::GreaterThanEquals),
    ("gte", Operator::GreaterThanEquals),
    ("ge", Operator::GreaterThanEquals),
    ("numericgreaterthanequals", Operator::GreaterThanEquals),
    (">=", Operator::GreaterThanEquals),
    ("numericequals", Operator::NumericEquals),
    ("numeq", Operator::NumericEquals),
    ("numericnotequals", Operator::NumericNotEquals),
    ("numne", Operator::NumericNotEquals),
    ("between", Operator::Between),
    ("numericbetween", Operator::Between),
    ("inrange", Operator::Between),
    ("bool", Operator::Bool),
    ("boolean", Operator::Bool),
    ("boolequals", Operator::Bool),
    ("booleanequals", Operator::Bool),
    ("incidr", Operator::InCidr),
    ("cidr", Operator::InCidr),
    ("ipaddress", Operator::InCidr),
    ("ipinrange", Operator::InCidr),
    ("isinternalip", Operator::IsInternalIp),
    ("internalip", Operator::IsInternalIp),
    ("timeafter", Operator::TimeAfter),
    ("after", Operator::TimeAfter),
    ("timebefore", Operator::TimeBefore),
    ("before", Operator::TimeBefore),
    ("datebetween", Operator::DateBetween),
    ("daterange", Operator::DateBetween),
    ("dayofweek", Operator::DayOfWeek),
    ("weekday", Operator::DayOfWeek),
    ("isbusinesshours", Operator::IsBusinessHours),
    ("businesshours", Operator::IsBusinessHours),
    ("arraycontains", Operator::ArrayContains),
    ("hasvalue", Operator::ArrayContains),
    ("arraysize", Operator::ArraySize),
    ("size", Operator::ArraySize),
    ("length", Operator::ArraySize),
];

impl Operator {
    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Like => "like",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::LessThan => "less_than",
            Self::LessThanEquals => "less_than_equals",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanEquals => "greater_than_equals",
            Self::NumericEquals => "numeric_equals",
            Self::NumericNotEquals => "numeric_not_equals",
            Self::Between => "between",
            Self::Bool => "bool",
            Self::InCidr => "in_cidr",
            Self::IsInternalIp => "is_internal_ip",
            Self::TimeAfter => "time_after",
            Self::TimeBefore => "time_before",
            Self::DateBetween => "date_between",
            Self::DayOfWeek => "day_of_week",
            Self::IsBusinessHours => "is_business_hours",
            Self::ArrayContains => "array_contains",
            Self::ArraySize => "array_size",
        }
    }

    /// Compares `actual` against `expected`.
    ///
    /// A null `actual` is always `false`. For string and network operators an
    /// array `expected` matches if any element matches; `not_equals` requires
    /// that none do.
    pub fn apply(self, actual: &Value, expected: &Value) -> bool {
        if actual.is_null() {
            return false;
        }

        match self {
            Self::Equals => {
                if actual.is_array() && expected.is_array() {
                    return actual == expected;
                }
                any_expected(expected, |e| loosely_equal(actual, e))
            }
            Self::NotEquals => {
                if actual.is_array() && expected.is_array() {
                    return actual != expected;
                }
                !expected.is_null() && !any_expected(expected, |e| loosely_equal(actual, e))
            }
            Self::Like => string_op(actual, expected, |a, e| wildcard_match(e, a)),
            Self::Contains => match actual {
                Value::Array(items) => array_contains(items, expected),
                _ => string_op(actual, expected, |a, e| a.contains(e)),
            },
            Self::StartsWith => string_op(actual, expected, |a, e| a.starts_with(e)),
            Self::EndsWith => string_op(actual, expected, |a, e| a.ends_with(e)),
            Self::Regex => string_op(actual, expected, regex_match),
            Self::LessThan => numeric_op(actual, expected, |a, e| a < e),
            Self::LessThanEquals => numeric_op(actual, expected, |a, e| a <= e),
            Self::GreaterThan => numeric_op(actual, expected, |a, e| a > e),
            Self::GreaterThanEquals => numeric_op(actual, expected, |a, e| a >= e),
            Self::NumericEquals => numeric_op(actual, expected, approx_eq),
            Self::NumericNotEquals => numeric_op(actual, expected, |a, e| !approx_eq(a, e)),
            Self::Between => between(actual, expected),
            Self::Bool => match (as_bool(actual), as_bool(expected)) {
                (Some(a), Some(e)) => a == e,
                _ => false,
            },
            Self::InCidr => string_op(actual, expected, |ip, cidr| {
                cidr_contains(cidr, ip).unwrap_or_else(|| {
                    warn!(cidr = %cidr, ip = %ip, "Unparsable network in condition");
                    false
                })
            }),
            Self::IsInternalIp => flag_op(actual, expected, |ip| Some(is_internal_ip(ip))),
            Self::TimeAfter => time_op(actual, expected, |a, e| a >= e),
            Self::TimeBefore => time_op(actual, expected, |a, e| a < e),
            Self::DateBetween => date_between(actual, expected),
            Self::DayOfWeek => day_of_week(actual, expected),
            Self::IsBusinessHours => flag_op(actual, expected, |raw| {
                let ts = parse_timestamp(raw)?;
                Some(BusinessHours::default().contains(ts.weekday(), ts.hour()))
            }),
            Self::ArrayContains => match actual {
                Value::Array(items) => array_contains(items, expected),
                _ => false,
            },
            Self::ArraySize => match (actual, as_number(expected)) {
                #[allow(clippy::cast_precision_loss)]
                (Value::Array(items), Some(size)) => approx_eq(items.len() as f64, size),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_name(s.trim());
        OPERATOR_ALIASES
            .iter()
            .find(|(alias, _)| *alias == wanted)
            .map(|(_, op)| *op)
            .ok_or_else(|| UnknownOperator::new(s))
    }
}

impl TryFrom<String> for Operator {
    type Error = UnknownOperator;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.name().to_string()
    }
}

/// Applies an operator given by name.
///
/// # Errors
///
/// Returns [`UnknownOperator`] when `operator` is not a known name or alias.
pub fn evaluate_simple(
    operator: &str,
    actual: &Value,
    expected: &Value,
) -> Result<bool, UnknownOperator> {
    Ok(operator.parse::<Operator>()?.apply(actual, expected))
}

// ============================================================================
// Condition
// ============================================================================

/// A boolean condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Compares the attribute at `attribute` (a context dot-path) with
    /// `value`. String values may embed `${namespace:Field}` placeholders.
    Compare {
        attribute: String,
        operator: Operator,
        value: Value,
    },
    /// True when every child is true. Empty is true.
    And(Vec<Condition>),
    /// True when any child is true. Empty is false.
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn all(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::And(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    pub fn negate(child: Condition) -> Self {
        Self::Not(Box::new(child))
    }

    /// Evaluates this condition against `ctx`.
    pub fn evaluate<C: PathLookup + ?Sized>(&self, ctx: &C) -> bool {
        evaluate(self, ctx)
    }

    /// Parses an operator-map condition document.
    ///
    /// ```json
    /// {
    ///   "StringEquals": {"subject.department": "finance"},
    ///   "NumericGreaterThanEquals": {"subject.clearance_level": 2},
    ///   "Not": {"Bool": {"subject.on_probation": true}}
    /// }
    /// ```
    ///
    /// Each top-level key is an operator whose value maps attribute paths to
    /// expected values, or one of `And`/`Or` (array of documents) and `Not`
    /// (one document). Multiple keys, and multiple attributes under one
    /// operator, are combined with `And`. The explicit form
    /// `{"operator": ..., "attribute": ..., "value": ...}` is also accepted.
    ///
    /// # Errors
    ///
    /// [`PolicyError::UnknownOperator`] for an unrecognised operator key,
    /// [`PolicyError::Malformed`] for any other structural problem.
    pub fn from_document(doc: &Value) -> Result<Self, PolicyError> {
        let map = doc
            .as_object()
            .ok_or_else(|| PolicyError::Malformed("condition must be an object".to_string()))?;

        if let Some(explicit) = explicit_comparison(map)? {
            return Ok(explicit);
        }

        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            parts.push(match normalize_name(key).as_str() {
                "and" | "allof" => Self::And(children(key, value)?),
                "or" | "anyof" => Self::Or(children(key, value)?),
                "not" => match value {
                    Value::Array(_) => Self::negate(Self::And(children(key, value)?)),
                    other => Self::negate(Self::from_document(other)?),
                },
                _ => operator_block(key, value)?,
            });
        }
        Ok(collapse(parts))
    }
}

fn children(key: &str, value: &Value) -> Result<Vec<Condition>, PolicyError> {
    let items = value
        .as_array()
        .ok_or_else(|| PolicyError::Malformed(format!("'{key}' expects an array of conditions")))?;
    items.iter().map(Condition::from_document).collect()
}

fn operator_block(key: &str, value: &Value) -> Result<Condition, PolicyError> {
    let operator: Operator = key.parse()?;
    let comparisons = value.as_object().ok_or_else(|| {
        PolicyError::Malformed(format!("operator '{key}' expects an attribute → value map"))
    })?;
    Ok(collapse(
        comparisons
            .iter()
            .map(|(attribute, expected)| Condition::compare(attribute.as_str(), operator, expected.clone()))
            .collect(),
    ))
}

fn explicit_comparison(map: &serde_json::Map<String, Value>) -> Result<Option<Condition>, PolicyError> {
    let field = |name: &str| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    };
    let (Some(operator), Some(attribute)) = (field("operator"), field("attribute")) else {
        return Ok(None);
    };
    let (Some(operator), Some(attribute)) = (operator.as_str(), attribute.as_str()) else {
        return Err(PolicyError::Malformed(
            "explicit comparison needs string 'operator' and 'attribute'".to_string(),
        ));
    };
    let value = field("value").cloned().unwrap_or(Value::Null);
    Ok(Some(Condition::compare(attribute, operator.parse()?, value)))
}

fn collapse(mut parts: Vec<Condition>) -> Condition {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Condition::And(parts)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluates `condition` against `ctx`.
pub fn evaluate<C: PathLookup + ?Sized>(condition: &Condition, ctx: &C) -> bool {
    match condition {
        Condition::Compare {
            attribute,
            operator,
            value,
        } => compare(ctx, attribute, *operator, value),
        Condition::And(children) => children.iter().all(|c| evaluate(c, ctx)),
        Condition::Or(children) => children.iter().any(|c| evaluate(c, ctx)),
        Condition::Not(inner) => !evaluate(inner, ctx),
    }
}

/// Resolves `attribute`, substitutes placeholders in `expected` and applies
/// `operator`. An unresolved attribute is `false`.
pub(crate) fn compare<C: PathLookup + ?Sized>(
    ctx: &C,
    attribute: &str,
    operator: Operator,
    expected: &Value,
) -> bool {
    let Some(actual) = ctx.lookup(attribute) else {
        trace!(attribute = %attribute, operator = %operator, "Attribute not present");
        return false;
    };
    let expected = substitute_in_value(expected, ctx);
    operator.apply(&actual, &expected)
}

fn substitute_in_value<'a, C: PathLookup + ?Sized>(value: &'a Value, ctx: &C) -> Cow<'a, Value> {
    match value {
        Value::String(s) if s.contains("${") => {
            Cow::Owned(Value::String(substitute_variables(s, ctx)))
        }
        Value::Array(items) if items.iter().any(|i| matches!(i, Value::String(s) if s.contains("${"))) => {
            Cow::Owned(Value::Array(
                items
                    .iter()
                    .map(|item| substitute_in_value(item, ctx).into_owned())
                    .collect(),
            ))
        }
        other => Cow::Borrowed(other),
    }
}

// ============================================================================
// Coercion helpers
// ============================================================================

/// Renders a value for string comparison and placeholder substitution.
///
/// Strings are returned raw, null becomes empty, containers become JSON.
pub(crate) fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

fn scalar_str(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(_) | Value::Bool(_) | Value::Number(_) => Some(stringify(value)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(e)) => approx_eq(a, e),
            _ => false,
        },
        (Value::Bool(a), _) => as_bool(expected) == Some(*a),
        (_, Value::Bool(e)) => as_bool(actual) == Some(*e),
        _ => actual == expected,
    }
}

fn any_expected(expected: &Value, mut f: impl FnMut(&Value) -> bool) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(f),
        other => f(other),
    }
}

fn string_op(actual: &Value, expected: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
    let Some(actual) = scalar_str(actual) else {
        return false;
    };
    any_expected(expected, |e| scalar_str(e).is_some_and(|e| f(&actual, &e)))
}

fn numeric_op(actual: &Value, expected: &Value, f: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    }
}

fn between(actual: &Value, expected: &Value) -> bool {
    let Some(value) = as_number(actual) else {
        return false;
    };
    match expected.as_array().map(Vec::as_slice) {
        Some([low, high]) => match (as_number(low), as_number(high)) {
            (Some(low), Some(high)) => low <= value && value <= high,
            _ => false,
        },
        _ => false,
    }
}

/// Every expected element (or the single expected value) must be present.
fn array_contains(items: &[Value], expected: &Value) -> bool {
    let present = |wanted: &Value| items.iter().any(|item| loosely_equal(item, wanted));
    match expected {
        Value::Array(wanted) => !wanted.is_empty() && wanted.iter().all(present),
        Value::Null => false,
        wanted => present(wanted),
    }
}

/// Boolean flags that may be stored precomputed or derived from a raw value.
/// A null `expected` means `true`.
fn flag_op(actual: &Value, expected: &Value, derive: impl Fn(&str) -> Option<bool>) -> bool {
    let wanted = if expected.is_null() {
        Some(true)
    } else {
        as_bool(expected)
    };
    let Some(wanted) = wanted else {
        return false;
    };
    let flag = match actual {
        Value::Bool(b) => Some(*b),
        Value::String(s) => as_bool(actual).or_else(|| derive(s)),
        _ => None,
    };
    flag == Some(wanted)
}

fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let value: Vec<char> = value.to_lowercase().chars().collect();

    let (mut p, mut v) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while v < value.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, v));
                p += 1;
            }
            Some(&c) if c == '?' || c == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    v = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn regex_match(actual: &str, pattern: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(actual),
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "Invalid regex in condition");
            false
        }
    }
}

// ============================================================================
// Temporal helpers
// ============================================================================

fn time_of_day(value: &Value) -> Option<NaiveTime> {
    let raw = value.as_str()?.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.time()))
}

fn time_op(actual: &Value, expected: &Value, f: impl Fn(NaiveTime, NaiveTime) -> bool) -> bool {
    match (time_of_day(actual), time_of_day(expected)) {
        (Some(a), Some(e)) => f(a, e),
        (Some(_), None) => {
            warn!(expected = %expected, "Unparsable time in condition");
            false
        }
        _ => false,
    }
}

/// A date-range bound: date-only bounds compare by calendar day.
enum DateBound {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl DateBound {
    fn parse(value: &Value) -> Option<Self> {
        let raw = value.as_str()?;
        parse_date(raw)
            .map(Self::Day)
            .or_else(|| parse_timestamp(raw).map(|ts| Self::Instant(ts.with_timezone(&Utc))))
    }

    fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Day(day) => day.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()),
            Self::Instant(instant) => Some(*instant),
        }
    }
}

fn date_between(actual: &Value, expected: &Value) -> bool {
    let Some(at) = DateBound::parse(actual).and_then(|b| b.instant()) else {
        return false;
    };
    let Some([start, end]) = expected.as_array().map(Vec::as_slice) else {
        return false;
    };
    let (Some(start), Some(end)) = (DateBound::parse(start), DateBound::parse(end)) else {
        warn!(expected = %expected, "Unparsable date range in condition");
        return false;
    };

    let after_start = match start {
        DateBound::Day(day) => at.date_naive() >= day,
        DateBound::Instant(instant) => at >= instant,
    };
    let before_end = match end {
        DateBound::Day(day) => at.date_naive() <= day,
        DateBound::Instant(instant) => at <= instant,
    };
    after_start && before_end
}

fn weekday_of(value: &Value) -> Option<Weekday> {
    let raw = value.as_str()?.trim();
    raw.parse::<Weekday>()
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.weekday()))
}

fn day_of_week(actual: &Value, expected: &Value) -> bool {
    let Some(day) = weekday_of(actual) else {
        return false;
    };
    let matches = |candidate: &str| {
        candidate
            .split(',')
            .any(|name| name.trim().parse::<Weekday>().is_ok_and(|d| d == day))
    };
    match expected {
        Value::Array(items) => items.iter().filter_map(Value::as_str).any(matches),
        Value::String(s) => matches(s),
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;
    use warden_types::Attributes;

    fn ctx() -> Attributes {
        json!({
            "subject": {
                "id": "user-123",
                "department": "finance",
                "clearance_level": 2,
                "on_probation": false,
                "roles": ["analyst", "auditor"],
                "email": "ana@example.com"
            },
            "environment": {
                "source_ip": "10.0.1.50",
                "time_of_day": "10:30",
                "day_of_week": "monday",
                "is_business_hours": true,
                "timestamp": "2025-01-06T10:30:00Z"
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test_case("equals", json!("finance"), json!("finance"), true ; "equals")]
    #[test_case("StringEquals", json!("finance"), json!(["hr", "finance"]), true ; "equals any of")]
    #[test_case("!=", json!("finance"), json!("hr"), true ; "not equals")]
    #[test_case("not_equals", json!("finance"), json!(["hr", "finance"]), false ; "not equals none of")]
    #[test_case("like", json!("Report-2025.PDF"), json!("report-*.pdf"), true ; "like case insensitive")]
    #[test_case("like", json!("ab"), json!("a?"), true ; "like single char")]
    #[test_case("like", json!("abc"), json!("a?"), false ; "like too long")]
    #[test_case("contains", json!("ana@example.com"), json!("@example"), true ; "substring")]
    #[test_case("contains", json!(["a", "b"]), json!("b"), true ; "array element")]
    #[test_case("contains", json!(["a", "b"]), json!(["a", "b"]), true ; "array all of")]
    #[test_case("contains", json!(["a"]), json!(["a", "c"]), false ; "array missing one")]
    #[test_case("StringStartsWith", json!("/api/v1"), json!("/api"), true ; "starts with")]
    #[test_case("ends_with", json!("report.pdf"), json!(".pdf"), true ; "ends with")]
    #[test_case("regex", json!("user-123"), json!("^user-\\d+$"), true ; "regex")]
    #[test_case("regex", json!("user-123"), json!("(unclosed"), false ; "invalid regex")]
    #[test_case("<", json!(1), json!(2), true ; "less than")]
    #[test_case("lte", json!(2), json!(2), true ; "less or equal")]
    #[test_case("NumericGreaterThanEquals", json!(2), json!(2), true ; "iam gte")]
    #[test_case("gt", json!("3"), json!(2), true ; "numeric string")]
    #[test_case("gt", json!("three"), json!(2), false ; "non numeric")]
    #[test_case("numeric_equals", json!(0.1 + 0.2), json!(0.3), true ; "epsilon")]
    #[test_case("numeric_not_equals", json!(1), json!(2), true ; "numeric not equals")]
    #[test_case("between", json!(5), json!([1, 5]), true ; "between inclusive")]
    #[test_case("between", json!(6), json!([1, 5]), false ; "between outside")]
    #[test_case("between", json!(3), json!([1]), false ; "between malformed bound")]
    #[test_case("bool", json!(true), json!("true"), true ; "bool from string")]
    #[test_case("bool", json!("FALSE"), json!(false), true ; "bool string actual")]
    #[test_case("IpAddress", json!("10.0.1.50"), json!("10.0.0.0/8"), true ; "cidr")]
    #[test_case("in_cidr", json!("10.0.1.50"), json!(["192.168.0.0/16", "10.0.0.0/8"]), true ; "cidr any of")]
    #[test_case("in_cidr", json!("10.0.1.50"), json!("not-a-cidr"), false ; "cidr unparsable")]
    #[test_case("is_internal_ip", json!("203.0.113.1"), json!(true), false ; "external ip")]
    #[test_case("is_internal_ip", json!("192.168.1.1"), Value::Null, true ; "internal ip default true")]
    #[test_case("time_after", json!("10:30"), json!("09:00"), true ; "time after")]
    #[test_case("time_after", json!("09:00"), json!("09:00"), true ; "time after inclusive")]
    #[test_case("time_before", json!("17:59:59"), json!("18:00"), true ; "time before")]
    #[test_case("time_before", json!("18:00"), json!("18:00"), false ; "time before exclusive")]
    #[test_case("date_between", json!("2025-01-15"), json!(["2025-01-01", "2025-01-31"]), true ; "date in range")]
    #[test_case("date_between", json!("2025-01-31T23:00:00Z"), json!(["2025-01-01", "2025-01-31"]), true ; "end date inclusive")]
    #[test_case("date_between", json!("2025-02-01"), json!(["2025-01-01", "2025-01-31"]), false ; "date after range")]
    #[test_case("day_of_week", json!("monday"), json!(["Mon", "Tue"]), true ; "weekday set")]
    #[test_case("day_of_week", json!("saturday"), json!("monday,tuesday"), false ; "weekday csv")]
    #[test_case("is_business_hours", json!(true), json!(true), true ; "precomputed flag")]
    #[test_case("is_business_hours", json!("2025-01-04T10:00:00Z"), json!(true), false ; "saturday timestamp")]
    #[test_case("array_contains", json!(["admin"]), json!("admin"), true ; "array contains")]
    #[test_case("array_contains", json!("admin"), json!("admin"), false ; "array contains on string")]
    #[test_case("size", json!([1, 2, 3]), json!(3), true ; "array size")]
    fn evaluates_simple(op: &str, actual: Value, expected: Value, want: bool) {
        assert_eq!(evaluate_simple(op, &actual, &expected).unwrap(), want);
    }

    #[test]
    fn null_actual_is_false_for_every_operator() {
        for (_, op) in OPERATOR_ALIASES {
            assert!(!op.apply(&Value::Null, &json!("x")), "{op}");
            assert!(!op.apply(&Value::Null, &Value::Null), "{op}");
        }
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let err = evaluate_simple("FuzzyEquals", &json!(1), &json!(1)).unwrap_err();
        assert_eq!(err.name(), "FuzzyEquals");
        assert_eq!(err.to_string(), "unknown operator 'FuzzyEquals'");
    }

    #[test_case("Equals" ; "pascal")]
    #[test_case("EQUALS" ; "upper")]
    #[test_case("string_equals" ; "snake")]
    #[test_case("string-equals" ; "kebab")]
    #[test_case(" eq " ; "padded")]
    fn operator_names_are_normalized(name: &str) {
        assert_eq!(name.parse::<Operator>().unwrap(), Operator::Equals);
    }

    #[test]
    fn canonical_names_round_trip() {
        for (_, op) in OPERATOR_ALIASES {
            assert_eq!(op.name().parse::<Operator>().unwrap(), *op);
        }
        let op: Operator = serde_json::from_value(json!("NumericLessThan")).unwrap();
        assert_eq!(serde_json::to_value(op).unwrap(), json!("less_than"));
    }

    #[test]
    fn composite_identities() {
        let ctx = ctx();
        let t = Condition::compare("subject.department", Operator::Equals, "finance");
        let f = Condition::compare("subject.department", Operator::Equals, "hr");

        assert!(Condition::And(vec![]).evaluate(&ctx));
        assert!(!Condition::Or(vec![]).evaluate(&ctx));
        assert!(Condition::negate(Condition::negate(t.clone())).evaluate(&ctx));
        assert!(!Condition::negate(Condition::negate(f.clone())).evaluate(&ctx));
        assert!(!Condition::all([t.clone(), f.clone()]).evaluate(&ctx));
        assert!(Condition::any([f, t]).evaluate(&ctx));
    }

    #[test]
    fn missing_attribute_fails_closed() {
        let ctx = ctx();
        let cond = Condition::compare("subject.nope", Operator::NotEquals, "x");
        assert!(!cond.evaluate(&ctx));
        assert!(Condition::negate(cond).evaluate(&ctx));
    }

    #[test]
    fn expected_values_are_substituted() {
        let ctx = ctx();
        let cond = Condition::compare("subject.email", Operator::StartsWith, "${subject:id}");
        assert!(!cond.evaluate(&ctx));

        let cond = Condition::compare(
            "subject.department",
            Operator::Equals,
            json!(["${subject:department}"]),
        );
        assert!(cond.evaluate(&ctx));
    }

    #[test]
    fn parses_operator_map_document() {
        let doc = json!({
            "StringEquals": {"subject.department": "finance"},
            "NumericGreaterThanEquals": {"subject.clearance_level": 2},
            "Not": {"Bool": {"subject.on_probation": true}}
        });
        let cond = Condition::from_document(&doc).unwrap();
        assert!(matches!(&cond, Condition::And(parts) if parts.len() == 3));
        assert!(cond.evaluate(&ctx()));
    }

    #[test]
    fn parses_nested_and_or() {
        let doc = json!({
            "Or": [
                {"StringEquals": {"subject.department": "hr"}},
                {"And": [
                    {"IpAddress": {"environment.source_ip": "10.0.0.0/8"}},
                    {"Bool": {"environment.is_business_hours": true}}
                ]}
            ]
        });
        let cond = Condition::from_document(&doc).unwrap();
        assert!(cond.evaluate(&ctx()));
    }

    #[test]
    fn parses_explicit_comparison() {
        let doc = json!({"operator": "gte", "attribute": "subject.clearance_level", "value": 3});
        let cond = Condition::from_document(&doc).unwrap();
        assert_eq!(
            cond,
            Condition::compare("subject.clearance_level", Operator::GreaterThanEquals, 3)
        );
        assert!(!cond.evaluate(&ctx()));
    }

    #[test]
    fn document_with_unknown_operator_is_rejected() {
        let doc = json!({"Or": [{"FuzzyEquals": {"subject.department": "hr"}}]});
        let err = Condition::from_document(&doc).unwrap_err();
        assert!(matches!(err, PolicyError::UnknownOperator(ref u) if u.name() == "FuzzyEquals"));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            Condition::from_document(&json!("equals")),
            Err(PolicyError::Malformed(_))
        ));
        assert!(matches!(
            Condition::from_document(&json!({"And": {"equals": {}}})),
            Err(PolicyError::Malformed(_))
        ));
        assert!(matches!(
            Condition::from_document(&json!({"equals": "finance"})),
            Err(PolicyError::Malformed(_))
        ));
    }

    #[test]
    fn empty_document_is_always_true() {
        let cond = Condition::from_document(&json!({})).unwrap();
        assert_eq!(cond, Condition::And(vec![]));
        assert!(cond.evaluate(&ctx()));
    }
}
