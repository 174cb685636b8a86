//! sqm-lowering - SQM to SQL AST lowering
//!
//! This crate turns a semantic query tree (SQM) over a domain model into a
//! dialect-neutral SQL AST:
//! - Domain model descriptors (entities, embeddables, associations, aggregate columns)
//! - SQM tree construction and parameter cross-referencing
//! - Table-group creation with lazy implicit joins
//! - Parameter typing and multi-valued IN expansion
//! - SELECT, UPDATE, DELETE and INSERT lowering

/// Debug print macro that only compiles in debug builds.
/// In release builds, this expands to nothing, so there's zero runtime cost.
#[macro_export]
macro_rules! debug_print {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        eprintln!($($arg)*);
    };
}

pub mod config;
pub mod domain_catalog;
pub mod sql_ast;
pub mod sqm;
pub mod sqm_converter;

pub use sqm_converter::{compile, translate, LoweringError, QueryCompilationError, SqmTranslation};
