//! SQM → SQL AST lowering.
//!
//! [`SqmToSqlAstConverter`] walks one [`SqmStatement`] top-down and builds
//! the SQL AST together with the JDBC parameters created for every SQM
//! parameter occurrence. All context lives on the converter and is scoped
//! to a single `translate` call:
//!
//! - processing states: one frame per query spec under construction
//! - clauses: which SQL clause is being lowered
//! - shallowness: whether entity references select identifiers only
//! - inferred types: the value mapping a sibling expression implies
//!
//! Every push is paired with a pop through the `with_*` helpers, so the
//! stacks are balanced whether lowering succeeds or fails.

pub mod aggregate_assignment;
pub mod errors;
mod expression;
mod from_clause;
pub mod from_clause_index;
mod predicate;
pub mod processing_state;
mod query_spec;
pub mod sql_alias;
mod statement;
pub mod type_inference;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::LoweringConfig;
use crate::domain_catalog::domain_model::MetadataResolver;
use crate::domain_catalog::value_mapping::ValueMapping;
use crate::sql_ast::expression::JdbcParameter;
use crate::sql_ast::statement::{Clause, CteColumn, QuerySpec, Statement};
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::parameters::{DomainParameterXref, QueryParameterBindings, SqmParameterId};
use crate::sqm::query_options::QueryOptions;
use crate::sqm::tree::SqmStatement;

pub use aggregate_assignment::AggregateColumnAssignmentHandler;
pub use errors::{LoweringError, QueryCompilationError};
pub use from_clause_index::{FromClauseIndex, GroupSource, TableGroupRef};
pub use processing_state::{ContextDepths, ProcessingState, Shallowness, Stack};
pub use type_inference::InferredType;

/// Result of lowering one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqmTranslation {
    pub statement: Statement,
    /// SQM parameter occurrence → JDBC parameters, one per column
    pub jdbc_parameters: IndexMap<SqmParameterId, Vec<JdbcParameter>>,
    pub affected_table_names: BTreeSet<String>,
    pub fetched_paths: Vec<NavigablePath>,
}

impl SqmTranslation {
    pub fn jdbc_parameter_count(&self) -> usize {
        self.jdbc_parameters.values().map(Vec::len).sum()
    }
}

/// Post-processing hook run on every lowered query spec.
pub trait QueryTransformer {
    fn transform(&self, query_spec: &mut QuerySpec) -> Result<(), LoweringError>;
}

impl<F> QueryTransformer for F
where
    F: Fn(&mut QuerySpec) -> Result<(), LoweringError>,
{
    fn transform(&self, query_spec: &mut QuerySpec) -> Result<(), LoweringError> {
        self(query_spec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseTransition {
    Enter,
    Exit,
}

pub type ClauseListener<'a> = Box<dyn FnMut(Clause, ClauseTransition) + 'a>;

pub struct SqmToSqlAstConverter<'a> {
    metadata: &'a dyn MetadataResolver,
    bindings: &'a QueryParameterBindings,
    xref: &'a mut DomainParameterXref,
    options: &'a QueryOptions,
    config: &'a LoweringConfig,

    alias_manager: sql_alias::SqlAliasBaseManager,
    from_clause_index: FromClauseIndex,

    processing_states: Stack<ProcessingState>,
    clauses: Stack<Clause>,
    shallowness: Stack<Shallowness>,
    inferred_types: Stack<InferredType<'a>>,

    jdbc_parameters: IndexMap<SqmParameterId, Vec<JdbcParameter>>,
    next_jdbc_index: usize,
    /// Resolved mapping per lowered parameter occurrence
    parameter_mappings: HashMap<SqmParameterId, ValueMapping>,

    affected_table_names: BTreeSet<String>,
    cte_shapes: HashMap<String, Vec<CteColumn>>,
    current_cte: Option<String>,
    lowering_select: bool,

    query_transformers: Vec<Box<dyn QueryTransformer + 'a>>,
    clause_listener: Option<ClauseListener<'a>>,
}

impl<'a> SqmToSqlAstConverter<'a> {
    pub fn new(
        metadata: &'a dyn MetadataResolver,
        bindings: &'a QueryParameterBindings,
        xref: &'a mut DomainParameterXref,
        options: &'a QueryOptions,
        config: &'a LoweringConfig,
    ) -> Self {
        SqmToSqlAstConverter {
            metadata,
            bindings,
            xref,
            options,
            config,
            alias_manager: sql_alias::SqlAliasBaseManager::new(),
            from_clause_index: FromClauseIndex::new(),
            processing_states: Stack::new(),
            clauses: Stack::new(),
            shallowness: Stack::new(),
            inferred_types: Stack::new(),
            jdbc_parameters: IndexMap::new(),
            next_jdbc_index: 0,
            parameter_mappings: HashMap::new(),
            affected_table_names: BTreeSet::new(),
            cte_shapes: HashMap::new(),
            current_cte: None,
            lowering_select: false,
            query_transformers: Vec::new(),
            clause_listener: None,
        }
    }

    pub fn with_query_transformer(mut self, transformer: impl QueryTransformer + 'a) -> Self {
        self.query_transformers.push(Box::new(transformer));
        self
    }

    pub fn with_clause_listener(mut self, listener: impl FnMut(Clause, ClauseTransition) + 'a) -> Self {
        self.clause_listener = Some(Box::new(listener));
        self
    }

    /// Lowers `statement`. Per-statement state is reset first, so one
    /// converter may translate several statements in turn.
    pub fn translate(&mut self, statement: &'a SqmStatement) -> Result<SqmTranslation, LoweringError> {
        log::debug!("Lowering {} statement", statement.kind_name());
        self.reset();

        let lowered = match statement {
            SqmStatement::Select(select) => self.lower_select_statement(select),
            SqmStatement::Update(update) => self.lower_update_statement(update),
            SqmStatement::Delete(delete) => self.lower_delete_statement(delete),
            SqmStatement::InsertSelect(insert) => self.lower_insert_select_statement(insert),
            SqmStatement::InsertValues(insert) => self.lower_insert_values_statement(insert),
        };

        let depths = self.context_depths();
        if depths != ContextDepths::default() {
            log::warn!("Context stacks not balanced after lowering: {:?}", depths);
        }

        let statement = lowered?;
        let translation = SqmTranslation {
            statement,
            jdbc_parameters: std::mem::take(&mut self.jdbc_parameters),
            affected_table_names: std::mem::take(&mut self.affected_table_names),
            fetched_paths: self.from_clause_index.fetched_paths().to_vec(),
        };
        log::debug!(
            "Lowered {} statement: {} parameter occurrence(s), {} JDBC parameter(s)",
            statement_kind(&translation.statement),
            translation.jdbc_parameters.len(),
            translation.jdbc_parameter_count()
        );
        Ok(translation)
    }

    pub fn context_depths(&self) -> ContextDepths {
        ContextDepths {
            processing_states: self.processing_states.depth(),
            clauses: self.clauses.depth(),
            shallowness: self.shallowness.depth(),
            inferred_types: self.inferred_types.depth(),
        }
    }

    pub fn current_clause(&self) -> Option<Clause> {
        self.clauses.current().copied()
    }

    pub fn current_shallowness(&self) -> Shallowness {
        self.shallowness.current().copied().unwrap_or_default()
    }

    fn reset(&mut self) {
        self.alias_manager = sql_alias::SqlAliasBaseManager::new();
        self.from_clause_index = FromClauseIndex::new();
        self.processing_states = Stack::new();
        self.clauses = Stack::new();
        self.shallowness = Stack::new();
        self.inferred_types = Stack::new();
        self.jdbc_parameters.clear();
        self.next_jdbc_index = 0;
        self.parameter_mappings.clear();
        self.affected_table_names.clear();
        self.cte_shapes.clear();
        self.current_cte = None;
        self.lowering_select = false;
    }

    // ------------------------------------------------------------------
    // Scoped context helpers
    // ------------------------------------------------------------------

    pub(crate) fn with_clause<R>(
        &mut self,
        clause: Clause,
        f: impl FnOnce(&mut Self) -> Result<R, LoweringError>,
    ) -> Result<R, LoweringError> {
        self.clauses.push(clause);
        self.notify_clause(clause, ClauseTransition::Enter);
        let result = f(self);
        self.clauses.pop();
        self.notify_clause(clause, ClauseTransition::Exit);
        result
    }

    pub(crate) fn with_inferred_type<R>(
        &mut self,
        inferred: InferredType<'a>,
        f: impl FnOnce(&mut Self) -> Result<R, LoweringError>,
    ) -> Result<R, LoweringError> {
        self.inferred_types.push(inferred);
        let result = f(self);
        self.inferred_types.pop();
        result
    }

    pub(crate) fn with_shallowness<R>(
        &mut self,
        shallowness: Shallowness,
        f: impl FnOnce(&mut Self) -> Result<R, LoweringError>,
    ) -> Result<R, LoweringError> {
        self.shallowness.push(shallowness);
        let result = f(self);
        self.shallowness.pop();
        result
    }

    fn notify_clause(&mut self, clause: Clause, transition: ClauseTransition) {
        log::trace!("{:?} clause {:?}", transition, clause);
        if let Some(listener) = self.clause_listener.as_mut() {
            listener(clause, transition);
        }
    }

    // ------------------------------------------------------------------
    // Processing-state access
    // ------------------------------------------------------------------

    pub(crate) fn current_state(&self) -> Result<&ProcessingState, LoweringError> {
        self.processing_states
            .current()
            .ok_or_else(|| LoweringError::internal("no query spec is being lowered"))
    }

    pub(crate) fn current_state_mut(&mut self) -> Result<&mut ProcessingState, LoweringError> {
        self.processing_states
            .current_mut()
            .ok_or_else(|| LoweringError::internal("no query spec is being lowered"))
    }

    pub(crate) fn current_query_spec_mut(&mut self) -> Result<&mut QuerySpec, LoweringError> {
        Ok(&mut self.current_state_mut()?.query_spec)
    }

    /// Top-level query spec of a SELECT statement, outside any CTE body.
    pub(crate) fn is_top_level_select(&self) -> bool {
        self.lowering_select && self.processing_states.depth() == 1 && self.current_cte.is_none()
    }

    pub(crate) fn push_registry_scope(&mut self) {
        let parent = std::mem::take(&mut self.from_clause_index);
        self.from_clause_index = FromClauseIndex::child_of(parent);
    }

    pub(crate) fn pop_registry_scope(&mut self) -> Result<(), LoweringError> {
        let scope = std::mem::take(&mut self.from_clause_index);
        self.from_clause_index = scope
            .into_parent()
            .ok_or_else(|| LoweringError::internal("registry scope popped without a parent"))?;
        Ok(())
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Select(_) => "select",
        Statement::Update(_) => "update",
        Statement::Delete(_) => "delete",
        Statement::Insert(_) => "insert",
    }
}

/// Lowers `statement` with a fresh parameter xref and converter.
pub fn translate(
    statement: &SqmStatement,
    metadata: &dyn MetadataResolver,
    bindings: &QueryParameterBindings,
    options: &QueryOptions,
    config: &LoweringConfig,
) -> Result<(SqmTranslation, DomainParameterXref), LoweringError> {
    let mut xref = DomainParameterXref::from_statement(statement);
    let translation = {
        let mut converter = SqmToSqlAstConverter::new(metadata, bindings, &mut xref, options, config);
        converter.translate(statement)?
    };
    Ok((translation, xref))
}

/// Same as [`translate`], with every failure reported as a single
/// [`QueryCompilationError`].
pub fn compile(
    statement: &SqmStatement,
    metadata: &dyn MetadataResolver,
    bindings: &QueryParameterBindings,
    options: &QueryOptions,
    config: &LoweringConfig,
) -> Result<(SqmTranslation, DomainParameterXref), QueryCompilationError> {
    translate(statement, metadata, bindings, options, config).map_err(|cause| {
        log::debug!("Query compilation failed: {}", cause);
        QueryCompilationError::from(cause)
    })
}
