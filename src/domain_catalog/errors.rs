//! # Domain Model Error Types
//!
//! Errors raised while resolving entity descriptors or loading a domain
//! model definition.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: unknown entity or attribute asked of the descriptor service
//! - **Configuration Errors**: file I/O and parsing issues during model loading
//! - **Mapping Errors**: structurally invalid attribute definitions

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainModelError {
    #[error("No entity descriptor found for `{entity_name}`")]
    UnknownEntity { entity_name: String },

    #[error("Entity `{entity_name}` has no attribute named `{attribute}`")]
    UnknownAttribute {
        entity_name: String,
        attribute: String,
    },

    #[error("Invalid mapping for `{entity_name}.{attribute}`: {message}")]
    InvalidMapping {
        entity_name: String,
        attribute: String,
        message: String,
    },

    #[error("Failed to read domain model file: {error}")]
    ConfigReadError { error: String },

    #[error("Failed to parse domain model: {error}")]
    ConfigParseError { error: String },

    #[error("Invalid domain model: {message}")]
    InvalidConfig { message: String },
}

impl DomainModelError {
    pub fn unknown_entity(entity_name: impl Into<String>) -> Self {
        DomainModelError::UnknownEntity {
            entity_name: entity_name.into(),
        }
    }

    pub fn invalid_mapping(
        entity_name: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DomainModelError::InvalidMapping {
            entity_name: entity_name.into(),
            attribute: attribute.into(),
            message: message.into(),
        }
    }
}
