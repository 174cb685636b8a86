//! # Lowering Error Types
//!
//! - **Conversion**: the SQM shape has no SQL AST representation (e.g. no
//!   value mapping can be determined for a parameter)
//! - **NotYetImplemented**: recognised construct that this pass does not
//!   lower yet
//! - **Internal**: contract violation by the caller or the converter itself
//! - **DomainModel**: the descriptor service could not resolve a type
//!
//! None of these are recovered inside the converter; the in-flight
//! translation is abandoned and no partial AST is returned.

use thiserror::Error;

use crate::domain_catalog::errors::DomainModelError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoweringError {
    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Not yet implemented: {0}")]
    NotYetImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    DomainModel(#[from] DomainModelError),
}

impl LoweringError {
    pub fn conversion(message: impl Into<String>) -> Self {
        LoweringError::Conversion(message.into())
    }

    pub fn not_yet_implemented(message: impl Into<String>) -> Self {
        LoweringError::NotYetImplemented(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LoweringError::Internal(message.into())
    }

    pub fn is_not_yet_implemented(&self) -> bool {
        matches!(self, LoweringError::NotYetImplemented(_))
    }
}

/// Single failure signal handed to whoever asked for the compilation.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Query compilation failed: {cause}")]
pub struct QueryCompilationError {
    #[from]
    pub cause: LoweringError,
}
