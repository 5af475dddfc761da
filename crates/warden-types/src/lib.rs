//! # warden-types: Core types for `Warden`
//!
//! This crate contains the records the decision engine reads from storage and
//! the attribute-access capability the engine uses to look inside them:
//! - Entities ([`Subject`], [`Resource`], [`Action`], [`EntityKind`])
//! - Attribute values ([`Attributes`], [`Value`])
//! - Attribute access ([`AttributeSource`], [`get_attribute_value`])
//!
//! Entity records are plain serde structs. Field names are snake_case, and the
//! PascalCase / camelCase spellings a storage layer tends to emit are accepted
//! as aliases both when deserializing and when resolving attribute paths.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub mod attributes;
pub mod entity;

pub use attributes::{AttributeSource, Attributes, get_attribute_value, normalize_name};
pub use entity::{Action, Resource, Subject};
pub use serde_json::Value;

// ============================================================================
// Entity Kind
// ============================================================================

/// The kind of record the engine looks up in storage.
///
/// Used in not-found errors so that callers know which identifier was bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Subject,
    Resource,
    Action,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subject => write!(f, "subject"),
            Self::Resource => write!(f, "resource"),
            Self::Action => write!(f, "action"),
        }
    }
}
