//! Dialect-neutral SQL AST produced by the lowering pass.
//!
//! Rendering to SQL text is left to a downstream renderer; the tree only
//! records structure, column ownership and bind placeholders.

pub mod expression;
pub mod predicate;
pub mod statement;
pub mod table_group;

pub use expression::{ColumnReference, Expression, JdbcParameter, QueryLiteral};
pub use predicate::Predicate;
pub use statement::{
    Assignment, Clause, CteColumn, CteStatement, DeleteStatement, DomainResult, InsertSource, InsertStatement,
    QuerySpec, SelectClause, SelectStatement, SortSpecification, SqlSelection, Statement, UpdateStatement,
};
pub use table_group::{FromClause, SqlAstJoinType, TableGroup, TableGroupJoin, TableReference, TableReferenceJoin};
