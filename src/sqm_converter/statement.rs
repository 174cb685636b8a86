//! Statement-level lowering: SELECT (with CTEs), UPDATE, DELETE and INSERT.
//!
//! DML statements get a processing frame of their own so target paths and
//! implicit joins in SET/WHERE resolve like in a query spec.

use crate::domain_catalog::domain_model::{AttributeKind, ColumnMapping, EntityDescriptor};
use crate::domain_catalog::value_mapping::{JdbcMapping, JdbcType};
use crate::sql_ast::expression::{ColumnReference, Expression};
use crate::sql_ast::predicate::{combine_predicates, conjunction, Predicate};
use crate::sql_ast::statement::{
    Assignment, Clause, CteColumn, CteStatement, DeleteStatement, InsertSource, InsertStatement, QuerySpec,
    SelectStatement, Statement, UpdateStatement,
};
use crate::sql_ast::table_group::{FromClause, TableReference};
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::tree::{
    SqmAssignment, SqmCteStatement, SqmDeleteStatement, SqmExpression, SqmInsertSelectStatement,
    SqmInsertValuesStatement, SqmPredicate, SqmRoot, SqmRootSource, SqmSelectStatement, SqmUpdateStatement,
};

use super::aggregate_assignment::AggregateColumnAssignmentHandler;
use super::errors::LoweringError;
use super::from_clause::column_reference;
use super::from_clause_index::{FromClauseIndex, TableGroupRef};
use super::processing_state::ProcessingState;
use super::type_inference::{embedded_sub_column, InferredType};
use super::SqmToSqlAstConverter;

impl<'a> SqmToSqlAstConverter<'a> {
    pub(crate) fn lower_select_statement(&mut self, select: &'a SqmSelectStatement) -> Result<Statement, LoweringError> {
        self.lowering_select = true;
        let cte_statements = if select.cte_statements.is_empty() {
            Vec::new()
        } else {
            self.with_clause(Clause::Cte, |converter| {
                select
                    .cte_statements
                    .iter()
                    .map(|cte| converter.lower_cte(cte))
                    .collect::<Result<Vec<_>, _>>()
            })?
        };
        let query_spec = self.lower_query_part(&select.query_part)?;
        Ok(Statement::Select(SelectStatement {
            cte_statements,
            query_spec,
        }))
    }

    /// Lowers a CTE body against a registry of its own. Later CTEs and the
    /// main query see the CTE through its column shape.
    fn lower_cte(&mut self, cte: &'a SqmCteStatement) -> Result<CteStatement, LoweringError> {
        if self.cte_shapes.contains_key(&cte.name) {
            return Err(LoweringError::conversion(format!("CTE `{}` is defined twice", cte.name)));
        }

        let outer_index = std::mem::replace(&mut self.from_clause_index, FromClauseIndex::new());
        let outer_cte = self.current_cte.replace(cte.name.clone());
        let lowered = self.lower_query_part(&cte.query_part);
        self.current_cte = outer_cte;
        self.from_clause_index = outer_index;
        let query_spec = lowered?;

        let columns = cte_columns(cte, &query_spec)?;
        log::debug!("CTE `{}` lowered with {} column(s)", cte.name, columns.len());
        self.cte_shapes.insert(cte.name.clone(), columns.clone());
        Ok(CteStatement {
            name: cte.name.clone(),
            columns,
            query_spec,
        })
    }

    pub(crate) fn lower_update_statement(&mut self, update: &'a SqmUpdateStatement) -> Result<Statement, LoweringError> {
        let entity = self.dml_target_entity(&update.target)?;
        let (lowered, from_clause) = self.in_dml_frame(Clause::Update, |converter| {
            let (target, restrictions) = converter.consume_dml_target(&update.target)?;
            let assignments = converter.with_clause(Clause::Set, |converter| {
                update
                    .assignments
                    .iter()
                    .map(|assignment| converter.lower_assignment(&target, assignment))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            let restriction = converter.lower_dml_restriction(update.where_clause.as_ref(), restrictions)?;
            Ok((target, assignments, restriction))
        })?;
        let (target, assignments, restriction) = lowered;

        let assignments = if entity.has_aggregate_column_writers() {
            match AggregateColumnAssignmentHandler::for_update(entity, &assignments) {
                Some(handler) => handler.rewrite(assignments, &target)?,
                None => assignments,
            }
        } else {
            assignments
        };

        Ok(Statement::Update(UpdateStatement {
            target_table: target_table(&from_clause)?,
            from_clause,
            assignments,
            restriction,
        }))
    }

    pub(crate) fn lower_delete_statement(&mut self, delete: &'a SqmDeleteStatement) -> Result<Statement, LoweringError> {
        self.dml_target_entity(&delete.target)?;
        let (restriction, from_clause) = self.in_dml_frame(Clause::Delete, |converter| {
            let (_, restrictions) = converter.consume_dml_target(&delete.target)?;
            converter.lower_dml_restriction(delete.where_clause.as_ref(), restrictions)
        })?;
        Ok(Statement::Delete(DeleteStatement {
            target_table: target_table(&from_clause)?,
            from_clause,
            restriction,
        }))
    }

    pub(crate) fn lower_insert_select_statement(
        &mut self,
        insert: &'a SqmInsertSelectStatement,
    ) -> Result<Statement, LoweringError> {
        self.dml_target_entity(&insert.target)?;
        let ((target_columns, query_spec), from_clause) = self.in_dml_frame(Clause::Insert, |converter| {
            // restrictions filter rows that exist; they have no say over inserted ones
            let (target, _) = converter.consume_dml_target(&insert.target)?;
            let target_columns = converter.insert_target_columns(&target, &insert.insert_paths)?;
            let query_spec = converter.lower_query_part(&insert.select_query)?;
            let selected = query_spec.select_clause.sql_selections.len();
            if selected != target_columns.len() {
                return Err(LoweringError::conversion(format!(
                    "insert targets {} column(s) but the query selects {}",
                    target_columns.len(),
                    selected
                )));
            }
            Ok((target_columns, query_spec))
        })?;
        Ok(Statement::Insert(InsertStatement {
            target_table: target_table(&from_clause)?,
            target_columns,
            source: InsertSource::Select {
                query_spec: Box::new(query_spec),
            },
        }))
    }

    pub(crate) fn lower_insert_values_statement(
        &mut self,
        insert: &'a SqmInsertValuesStatement,
    ) -> Result<Statement, LoweringError> {
        self.dml_target_entity(&insert.target)?;
        let ((target_columns, rows), from_clause) = self.in_dml_frame(Clause::Insert, |converter| {
            let (target, _) = converter.consume_dml_target(&insert.target)?;
            let target_columns = converter.insert_target_columns(&target, &insert.insert_paths)?;
            let rows = converter.with_clause(Clause::Values, |converter| {
                insert
                    .values_list
                    .iter()
                    .enumerate()
                    .map(|(row_number, row)| converter.lower_values_row(row_number, row, &insert.insert_paths))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            for (row_number, row) in rows.iter().enumerate() {
                if row.len() != target_columns.len() {
                    return Err(LoweringError::conversion(format!(
                        "values row {} spans {} column(s) but the insert targets {}",
                        row_number,
                        row.len(),
                        target_columns.len()
                    )));
                }
            }
            Ok((target_columns, rows))
        })?;
        Ok(Statement::Insert(InsertStatement {
            target_table: target_table(&from_clause)?,
            target_columns,
            source: InsertSource::Values { rows },
        }))
    }

    // ------------------------------------------------------------------
    // DML helpers
    // ------------------------------------------------------------------

    /// Runs `f` inside a root processing frame and clause marker, handing
    /// back its result together with the frame's FROM clause.
    fn in_dml_frame<R>(
        &mut self,
        clause: Clause,
        f: impl FnOnce(&mut Self) -> Result<R, LoweringError>,
    ) -> Result<(R, FromClause), LoweringError> {
        self.processing_states
            .push(ProcessingState::new(QuerySpec::new(true), false));
        let lowered = self.with_clause(clause, f);
        let state = self.processing_states.pop();
        let lowered = lowered?;
        let state = state.ok_or_else(|| LoweringError::internal("processing state stack underflow"))?;
        Ok((lowered, state.query_spec.from_clause))
    }

    fn dml_target_entity(&self, target: &SqmRoot) -> Result<&'a EntityDescriptor, LoweringError> {
        match &target.source {
            SqmRootSource::Entity { entity_name } => Ok(self.metadata.entity(entity_name)?),
            SqmRootSource::Cte { cte_name } => Err(LoweringError::conversion(format!(
                "CTE `{}` cannot be the target of a DML statement",
                cte_name
            ))),
        }
    }

    fn consume_dml_target(&mut self, target: &'a SqmRoot) -> Result<(TableGroupRef, Vec<Predicate>), LoweringError> {
        if !target.joins.is_empty() {
            return Err(LoweringError::conversion(format!(
                "the DML target {} cannot declare joins",
                target.navigable_path
            )));
        }
        self.with_clause(Clause::From, |converter| {
            let mut restrictions = Vec::new();
            let group = converter.consume_root(target, &mut restrictions)?;
            Ok((group, restrictions))
        })
    }

    fn lower_dml_restriction(
        &mut self,
        where_clause: Option<&'a SqmPredicate>,
        restrictions: Vec<Predicate>,
    ) -> Result<Option<Predicate>, LoweringError> {
        let lowered = match where_clause {
            Some(predicate) => Some(self.with_clause(Clause::Where, |converter| converter.lower_predicate(predicate))?),
            None => None,
        };
        Ok(combine_predicates(lowered, conjunction(restrictions)))
    }

    fn lower_assignment(&mut self, target: &TableGroupRef, assignment: &'a SqmAssignment) -> Result<Assignment, LoweringError> {
        let assignable = self.lower_assignable(target, &assignment.target_path)?;
        let inferred = InferredType::from_mapping(self.path_value_mapping(&assignment.target_path));
        let assigned_value =
            self.with_inferred_type(inferred, |converter| converter.lower_expression(&assignment.value))?;
        if !matches!(assigned_value, Expression::SubQuery { .. }) && assigned_value.column_count() != assignable.len() {
            return Err(LoweringError::conversion(format!(
                "assignment to `{}` spans {} column(s) but the value spans {}",
                assignment.target_path,
                assignable.len(),
                assigned_value.column_count()
            )));
        }
        Ok(Assignment {
            assignable,
            assigned_value,
        })
    }

    fn insert_target_columns(
        &mut self,
        target: &TableGroupRef,
        insert_paths: &[NavigablePath],
    ) -> Result<Vec<ColumnReference>, LoweringError> {
        let mut columns = Vec::new();
        for path in insert_paths {
            columns.extend(self.lower_assignable(target, path)?);
        }
        Ok(columns)
    }

    fn lower_values_row(
        &mut self,
        row_number: usize,
        row: &'a [SqmExpression],
        insert_paths: &[NavigablePath],
    ) -> Result<Vec<Expression>, LoweringError> {
        if row.len() != insert_paths.len() {
            return Err(LoweringError::conversion(format!(
                "values row {} has {} value(s) for {} insert path(s)",
                row_number,
                row.len(),
                insert_paths.len()
            )));
        }
        let mut lowered = Vec::with_capacity(row.len());
        for (value, path) in row.iter().zip(insert_paths) {
            let inferred = InferredType::from_mapping(self.path_value_mapping(path));
            let expression = self.with_inferred_type(inferred, |converter| converter.lower_expression(value))?;
            lowered.extend(expression.into_columns());
        }
        Ok(lowered)
    }

    /// Target columns of an attribute path relative to the DML target.
    fn lower_assignable(&self, target: &TableGroupRef, path: &NavigablePath) -> Result<Vec<ColumnReference>, LoweringError> {
        let not_an_attribute = || {
            LoweringError::conversion(format!(
                "`{}` is not an attribute of the target {}",
                path, target.navigable_path
            ))
        };
        let parent = path.parent().ok_or_else(not_an_attribute)?;
        let entity = self.group_entity(target)?;

        let columns: Vec<ColumnMapping> = if parent == target.navigable_path {
            let attribute = entity.attribute(path.local_name())?;
            match &attribute.kind {
                AttributeKind::Basic { column } => vec![column.clone()],
                AttributeKind::Embedded { columns, .. } => columns.clone(),
                AttributeKind::ToOne { fk_columns, .. } => fk_columns.clone(),
                AttributeKind::ToMany { .. } => {
                    return Err(LoweringError::conversion(format!(
                        "plural attribute `{}` cannot be assigned",
                        path
                    )))
                }
            }
        } else if parent.parent().as_ref() == Some(&target.navigable_path) {
            let attribute = entity.attribute(parent.local_name())?;
            let column = embedded_sub_column(attribute, path.local_name()).ok_or_else(|| {
                LoweringError::conversion(format!(
                    "`{}` is not a sub-attribute of an embedded attribute of `{}`",
                    path, entity.name
                ))
            })?;
            vec![column.clone()]
        } else {
            return Err(not_an_attribute());
        };

        columns
            .iter()
            .map(|column| Ok(column_reference(target.qualifier_for(column)?, column)))
            .collect()
    }
}

fn target_table(from_clause: &FromClause) -> Result<TableReference, LoweringError> {
    from_clause
        .roots
        .first()
        .map(|root| root.primary_table_reference.clone())
        .ok_or_else(|| LoweringError::internal("DML statement without a target table"))
}

/// Column shape of a lowered CTE: explicit names first, then selection
/// aliases, then positional names.
fn cte_columns(cte: &SqmCteStatement, query_spec: &QuerySpec) -> Result<Vec<CteColumn>, LoweringError> {
    let selections = &query_spec.select_clause.sql_selections;
    if !cte.columns.is_empty() && cte.columns.len() != selections.len() {
        return Err(LoweringError::conversion(format!(
            "CTE `{}` names {} column(s) but selects {}",
            cte.name,
            cte.columns.len(),
            selections.len()
        )));
    }
    Ok(selections
        .iter()
        .enumerate()
        .map(|(position, selection)| CteColumn {
            name: cte
                .columns
                .get(position)
                .cloned()
                .or_else(|| selection.alias.clone())
                .unwrap_or_else(|| format!("c{}", position)),
            jdbc_mapping: selection
                .expression
                .jdbc_mapping()
                .cloned()
                .unwrap_or_else(|| JdbcMapping::new(JdbcType::Object)),
        })
        .collect())
}
