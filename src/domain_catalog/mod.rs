//! Domain model catalog.
//!
//! Descriptor service consumed by the converter: entity tables, attribute
//! columns, join conditions and structured (aggregate) columns.

pub mod config;
pub mod domain_model;
pub mod errors;
pub mod function_registry;
pub mod value_mapping;

pub use domain_model::{
    AggregateColumnDescriptor, AttributeDescriptor, AttributeKind, ColumnMapping, DomainModel,
    EntityDescriptor, MetadataResolver, SecondaryTable,
};
pub use errors::DomainModelError;
pub use value_mapping::{JdbcMapping, JdbcType, ValueMapping};
