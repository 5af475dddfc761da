//! Attribute access over heterogeneous records.
//!
//! Everything the engine inspects (entity records, JSON maps, the evaluation
//! context) implements [`AttributeSource`]. Dot-path lookup resolves the first
//! segment through the source and walks the remaining segments through nested
//! JSON values, so the engine never needs to know the concrete shape.

use std::borrow::Cow;

use serde_json::{Map, Value};

/// A nested key → value attribute set. Keys are unique per level.
pub type Attributes = Map<String, Value>;

/// Capability to resolve a single named attribute.
///
/// Implementations decide their own resolution strategy: generic maps look up
/// keys exactly, typed records match field names case-insensitively and honour
/// aliases.
pub trait AttributeSource {
    /// Resolves one path segment. Returns `None` when the name is unknown.
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>>;
}

impl AttributeSource for Attributes {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.get(name).map(Cow::Borrowed)
    }
}

impl AttributeSource for Value {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        child(self, name).map(Cow::Borrowed)
    }
}

impl<T: AttributeSource + ?Sized> AttributeSource for &T {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        (**self).attribute(name)
    }
}

/// Resolves a dot-separated attribute path against `source`.
///
/// Returns `None` as soon as a segment is missing or the path is empty.
/// Never errors: an absent optional attribute is simply missing.
///
/// # Examples
///
/// ```
/// use warden_types::{Attributes, get_attribute_value};
/// use serde_json::json;
///
/// let attrs: Attributes = json!({"org": {"unit": "platform"}})
///     .as_object()
///     .cloned()
///     .unwrap();
/// assert_eq!(get_attribute_value(&attrs, "org.unit"), Some(json!("platform")));
/// assert_eq!(get_attribute_value(&attrs, "org.missing"), None);
/// ```
pub fn get_attribute_value<S: AttributeSource + ?Sized>(source: &S, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next().filter(|s| !s.is_empty())?;
    let root = source.attribute(first)?;

    let mut current: &Value = root.as_ref();
    for segment in segments {
        current = child(current, segment)?;
    }
    Some(current.clone())
}

/// Normalizes a field name for case-insensitive matching.
///
/// Lower-cases and drops `_` and `-`, so `ExternalID`, `external_id` and
/// `externalId` all compare equal.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Looks up `name` in an attribute map, exact key first, then by normalized
/// name.
pub(crate) fn lookup_loose<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a Value> {
    if let Some(value) = attrs.get(name) {
        return Some(value);
    }
    let wanted = normalize_name(name);
    attrs
        .iter()
        .find(|(key, _)| normalize_name(key) == wanted)
        .map(|(_, value)| value)
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
