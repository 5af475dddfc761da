//! Entity records loaded from storage.
//!
//! Records are read-only snapshots for the duration of an evaluation. The
//! engine never writes derived attributes back into them; see the evaluation
//! context overlay in `warden-abac`.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::{AttributeSource, Attributes, lookup_loose, normalize_name};

// ============================================================================
// Subject
// ============================================================================

/// The requesting principal (user or service).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(alias = "ID", alias = "Id")]
    pub id: String,
    /// Identifier in the upstream identity provider.
    #[serde(default, alias = "ExternalID", alias = "externalId")]
    pub external_id: String,
    /// Principal type, e.g. "user" or "service".
    #[serde(default, alias = "type", alias = "SubjectType", alias = "subjectType")]
    pub subject_type: String,
    #[serde(default, alias = "Attributes")]
    pub attributes: Attributes,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject_type: "user".to_string(),
            ..Self::default()
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = external_id.into();
        self
    }

    pub fn with_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = subject_type.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl AttributeSource for Subject {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        match normalize_name(name).as_str() {
            "id" | "subjectid" => Some(string_value(&self.id)),
            "externalid" => Some(string_value(&self.external_id)),
            "type" | "subjecttype" => Some(string_value(&self.subject_type)),
            "attributes" | "attrs" => Some(Cow::Owned(Value::Object(self.attributes.clone()))),
            _ => lookup_loose(&self.attributes, name).map(Cow::Borrowed),
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

/// A protected entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(alias = "ID", alias = "Id")]
    pub id: String,
    #[serde(default, alias = "type", alias = "ResourceType", alias = "resourceType")]
    pub resource_type: String,
    /// Business identifier, e.g. `api:documents:owner:user-123/report.pdf`.
    #[serde(default, alias = "ResourceID", alias = "resourceId")]
    pub resource_id: String,
    /// Slash-delimited hierarchical path, e.g. `/api/v1/users`.
    #[serde(default, alias = "Path")]
    pub path: String,
    #[serde(default, alias = "ParentID", alias = "parentId")]
    pub parent_id: Option<String>,
    #[serde(default, alias = "Attributes")]
    pub attributes: Attributes,
}

impl Resource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl AttributeSource for Resource {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        match normalize_name(name).as_str() {
            "id" => Some(string_value(&self.id)),
            "type" | "resourcetype" => Some(string_value(&self.resource_type)),
            "resourceid" | "businessid" => Some(string_value(&self.resource_id)),
            "path" => Some(string_value(&self.path)),
            "parentid" | "parent" => self.parent_id.as_deref().map(string_value),
            "attributes" | "attrs" => Some(Cow::Owned(Value::Object(self.attributes.clone()))),
            _ => lookup_loose(&self.attributes, name).map(Cow::Borrowed),
        }
    }
}

// ============================================================================
// Action
// ============================================================================

/// A named operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(alias = "ID", alias = "Id")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Category")]
    pub category: String,
}

impl Action {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

impl AttributeSource for Action {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        match normalize_name(name).as_str() {
            "id" => Some(string_value(&self.id)),
            "name" | "action" => Some(string_value(&self.name)),
            "category" => Some(string_value(&self.category)),
            _ => None,
        }
    }
}

fn string_value(s: &str) -> Cow<'static, Value> {
    Cow::Owned(Value::String(s.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
