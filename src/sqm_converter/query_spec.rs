//! Query-spec lowering and the SELECT clause.
//!
//! Clause order within one query spec:
//!
//! ```text
//! FROM → SELECT → WHERE (+ restrictions) → GROUP BY → HAVING → ORDER BY → FETCH → OFFSET
//! ```
//!
//! FROM goes first so every path in the other clauses can resolve against
//! the registered table groups.

use crate::domain_catalog::value_mapping::{JdbcType, ValueMapping};
use crate::sql_ast::expression::{ColumnReference, Expression};
use crate::sql_ast::predicate::conjunction;
use crate::sql_ast::statement::{Clause, DomainResult, QuerySpec, SortSpecification};
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::tree::{SqmExpression, SqmQueryPart, SqmQuerySpec, SqmSelectClause, SqmSelectable, SqmSelection};

use super::errors::LoweringError;
use super::from_clause::column_reference;
use super::from_clause_index::{GroupSource, TableGroupRef};
use super::processing_state::{ProcessingState, Shallowness};
use super::type_inference::InferredType;
use super::SqmToSqlAstConverter;

impl<'a> SqmToSqlAstConverter<'a> {
    pub(crate) fn lower_query_part(&mut self, query_part: &'a SqmQueryPart) -> Result<QuerySpec, LoweringError> {
        match query_part {
            SqmQueryPart::Spec(spec) => self.lower_query_spec(spec),
            SqmQueryPart::Group(group) => Err(LoweringError::not_yet_implemented(format!(
                "{:?} query group with {} part(s)",
                group.operator,
                group.parts.len()
            ))),
        }
    }

    pub(crate) fn lower_query_spec(&mut self, spec: &'a SqmQuerySpec) -> Result<QuerySpec, LoweringError> {
        let nested = !self.processing_states.is_empty();
        let is_root = !nested && self.current_cte.is_none();
        let deduplicate = is_root
            && self
                .options
                .deduplicate_results
                .unwrap_or(self.config.deduplicate_selection_items);

        if nested {
            self.push_registry_scope();
        }
        self.processing_states
            .push(ProcessingState::new(QuerySpec::new(is_root), deduplicate));
        crate::debug_print!(
            "lowering query spec: root={} depth={}",
            is_root,
            self.processing_states.depth()
        );

        let lowered = self
            .lower_query_spec_clauses(spec, is_root)
            .and_then(|()| self.apply_query_transformers());

        let state = self.processing_states.pop();
        let scope = if nested { self.pop_registry_scope() } else { Ok(()) };
        lowered?;
        scope?;

        Ok(state
            .ok_or_else(|| LoweringError::internal("processing state stack underflow"))?
            .query_spec)
    }

    /// Runs while the spec's processing state is still current.
    fn apply_query_transformers(&mut self) -> Result<(), LoweringError> {
        let state = self
            .processing_states
            .current_mut()
            .ok_or_else(|| LoweringError::internal("no query spec to transform"))?;
        for transformer in &self.query_transformers {
            transformer.transform(&mut state.query_spec)?;
        }
        Ok(())
    }

    fn lower_query_spec_clauses(&mut self, spec: &'a SqmQuerySpec, is_root: bool) -> Result<(), LoweringError> {
        let restrictions = self.consume_from_clause(&spec.from_clause)?;
        if is_root {
            self.apply_lock_modes()?;
        }

        self.with_clause(Clause::Select, |converter| {
            match &spec.select_clause {
                Some(select_clause) => converter.lower_select_clause(select_clause)?,
                None => converter.select_roots(spec)?,
            }
            if is_root && converter.lowering_select {
                converter.append_fetch_selections()?;
            }
            Ok(())
        })?;

        let where_clause = match &spec.where_clause {
            Some(predicate) => Some(self.with_clause(Clause::Where, |converter| converter.lower_predicate(predicate))?),
            None => None,
        };
        let query_spec = self.current_query_spec_mut()?;
        query_spec.apply_predicate(where_clause);
        query_spec.apply_predicate(conjunction(restrictions));

        if !spec.group_by.is_empty() {
            let group_by = self.with_clause(Clause::GroupBy, |converter| {
                spec.group_by
                    .iter()
                    .map(|expression| converter.lower_expression(expression))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            self.current_query_spec_mut()?.group_by = group_by;
        }

        if let Some(having) = &spec.having {
            let having = self.with_clause(Clause::Having, |converter| converter.lower_predicate(having))?;
            self.current_query_spec_mut()?.having = Some(having);
        }

        if !spec.order_by.is_empty() {
            let sort_specifications = self.with_clause(Clause::OrderBy, |converter| {
                spec.order_by
                    .iter()
                    .map(|sort| {
                        Ok(SortSpecification {
                            expression: converter.with_inferred_type(InferredType::None, |converter| {
                                converter.lower_expression(&sort.expression)
                            })?,
                            order: sort.order,
                            nulls: sort.nulls,
                        })
                    })
                    .collect::<Result<Vec<_>, LoweringError>>()
            })?;
            self.current_query_spec_mut()?.sort_specifications = sort_specifications;
        }

        if let Some(fetch) = &spec.fetch {
            let fetch = self.lower_row_count(Clause::Fetch, fetch)?;
            self.current_query_spec_mut()?.fetch = Some(fetch);
        }
        if let Some(offset) = &spec.offset {
            let offset = self.lower_row_count(Clause::Offset, offset)?;
            self.current_query_spec_mut()?.offset = Some(offset);
        }
        Ok(())
    }

    fn lower_row_count(&mut self, clause: Clause, expression: &'a SqmExpression) -> Result<Expression, LoweringError> {
        self.with_clause(clause, |converter| {
            converter.with_inferred_type(
                InferredType::Mapping(ValueMapping::basic(JdbcType::Integer)),
                |converter| converter.lower_expression(expression),
            )
        })
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn lower_select_clause(&mut self, select_clause: &'a SqmSelectClause) -> Result<(), LoweringError> {
        self.current_query_spec_mut()?.select_clause.distinct = select_clause.distinct;
        for selection in &select_clause.selections {
            let domain_result = self.lower_selection(selection)?;
            self.current_query_spec_mut()?
                .select_clause
                .domain_results
                .push(domain_result);
        }
        Ok(())
    }

    /// `from Employee e` without a select list selects its roots.
    fn select_roots(&mut self, spec: &'a SqmQuerySpec) -> Result<(), LoweringError> {
        for root in &spec.from_clause.roots {
            let domain_result = match self.lower_entity_selection(&root.navigable_path, None)? {
                Some(domain_result) => domain_result,
                None => {
                    return Err(LoweringError::internal(format!(
                        "root {} has no table group",
                        root.navigable_path
                    )))
                }
            };
            self.current_query_spec_mut()?
                .select_clause
                .domain_results
                .push(domain_result);
        }
        Ok(())
    }

    fn lower_selection(&mut self, selection: &'a SqmSelection) -> Result<DomainResult, LoweringError> {
        match &selection.selectable {
            SqmSelectable::DynamicInstantiation { target, arguments } => {
                let arguments = self.with_shallowness(Shallowness::Ctor, |converter| {
                    arguments
                        .iter()
                        .map(|argument| converter.lower_selection(argument))
                        .collect::<Result<Vec<_>, _>>()
                })?;
                Ok(DomainResult::Instantiation {
                    alias: selection.alias.clone(),
                    target: target.clone(),
                    arguments,
                })
            }
            SqmSelectable::Expression { expression } => {
                self.lower_selection_expression(expression, selection.alias.clone())
            }
        }
    }

    fn lower_selection_expression(
        &mut self,
        expression: &'a SqmExpression,
        alias: Option<String>,
    ) -> Result<DomainResult, LoweringError> {
        if let SqmExpression::Path { navigable_path } = expression {
            if self.current_shallowness() == Shallowness::None {
                if let Some(domain_result) = self.lower_entity_selection(navigable_path, alias.clone())? {
                    return Ok(domain_result);
                }
            }
            if let Some(ValueMapping::Embeddable { name, .. }) = self.path_value_mapping(navigable_path) {
                let lowered = self.lower_path(navigable_path)?;
                let positions = self.add_selections(lowered.into_columns(), None)?;
                return Ok(DomainResult::Embeddable {
                    alias,
                    embeddable: name,
                    positions,
                });
            }
        }

        let lowered = self.with_inferred_type(InferredType::None, |converter| converter.lower_expression(expression))?;
        let column_alias = if lowered.column_count() == 1 { alias.clone() } else { None };
        let positions = self.add_selections(lowered.into_columns(), column_alias)?;
        Ok(DomainResult::Basic { alias, positions })
    }

    /// Full entity selection for an entity-valued path; `None` when the
    /// path is not entity-valued.
    fn lower_entity_selection(
        &mut self,
        path: &NavigablePath,
        alias: Option<String>,
    ) -> Result<Option<DomainResult>, LoweringError> {
        let group = match self.from_clause_index.find(path).cloned() {
            Some(group) => group,
            None => match self.path_value_mapping(path) {
                Some(ValueMapping::Entity { .. }) if !path.is_root() => self.resolve_table_group(path)?,
                _ => return Ok(None),
            },
        };

        let domain_result = match &group.source {
            GroupSource::Entity(entity_name) => {
                let positions = self.select_entity_columns(&group)?;
                DomainResult::Entity {
                    alias,
                    entity_name: entity_name.clone(),
                    navigable_path: group.navigable_path.clone(),
                    positions,
                }
            }
            GroupSource::Cte(cte_name) => {
                let columns: Vec<Expression> = self
                    .cte_shapes
                    .get(cte_name)
                    .map(|columns| {
                        columns
                            .iter()
                            .map(|column| {
                                Expression::ColumnReference(ColumnReference {
                                    qualifier: group.primary_alias.clone(),
                                    column_name: column.name.clone(),
                                    jdbc_mapping: column.jdbc_mapping.clone(),
                                    selectable_path: column.name.clone(),
                                    aggregate_column: None,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let positions = self.add_selections(columns, None)?;
                DomainResult::Basic { alias, positions }
            }
        };
        Ok(Some(domain_result))
    }

    fn select_entity_columns(&mut self, group: &TableGroupRef) -> Result<Vec<usize>, LoweringError> {
        let entity = self.group_entity(group)?;
        let columns = entity
            .selectable_columns()
            .iter()
            .map(|column| Ok(column_reference(group.qualifier_for(column)?, column).into()))
            .collect::<Result<Vec<Expression>, LoweringError>>()?;
        self.add_selections(columns, None)
    }

    /// Columns of every fetched association, after the regular selections.
    fn append_fetch_selections(&mut self) -> Result<(), LoweringError> {
        let fetched = self.from_clause_index.fetched_paths().to_vec();
        for path in fetched {
            let group = self
                .from_clause_index
                .find(&path)
                .cloned()
                .ok_or_else(|| LoweringError::internal(format!("fetched path {} is not registered", path)))?;
            let entity_name = group.entity_name().unwrap_or_default().to_string();
            let positions = self.select_entity_columns(&group)?;
            log::debug!("Fetch {} adds {} selection(s)", path, positions.len());
            self.current_query_spec_mut()?
                .select_clause
                .domain_results
                .push(DomainResult::Fetch {
                    navigable_path: path,
                    entity_name,
                    positions,
                });
        }
        Ok(())
    }

    fn add_selections(&mut self, expressions: Vec<Expression>, alias: Option<String>) -> Result<Vec<usize>, LoweringError> {
        let state = self.current_state_mut()?;
        Ok(expressions
            .into_iter()
            .map(|expression| state.add_selection(expression, alias.clone()))
            .collect())
    }
}
