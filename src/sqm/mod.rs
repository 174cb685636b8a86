//! Structured Query Model: the typed input tree of the lowering pass.

pub mod builder;
pub mod navigable_path;
pub mod parameters;
pub mod query_options;
pub mod tree;
pub mod walker;

pub use navigable_path::NavigablePath;
pub use parameters::{
    BindValue, BindingsDocument, DomainParameterXref, ParameterKey, QueryParameterBinding, QueryParameterBindings, SqmParameter,
    SqmParameterId,
};
pub use query_options::{LockMode, LockOptions, QueryOptions};
pub use tree::*;
