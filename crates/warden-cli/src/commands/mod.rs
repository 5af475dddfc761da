//! CLI command implementations.

pub mod config;
pub mod evaluate;
pub mod hierarchy;
pub mod validate;
pub mod version;
