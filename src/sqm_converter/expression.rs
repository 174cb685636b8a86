//! Expression lowering: paths, literals, parameters, functions, case,
//! arithmetic, tuples and scalar subqueries.

use crate::domain_catalog::domain_model::AttributeKind;
use crate::domain_catalog::function_registry::{get_function_descriptor, widen, ReturnType};
use crate::domain_catalog::value_mapping::{JdbcMapping, JdbcType, ValueMapping};
use crate::sql_ast::expression::{tuple_or_single, ColumnReference, Expression, JdbcParameter, QueryLiteral, SearchedWhen, SimpleWhen};
use crate::sql_ast::statement::QuerySpec;
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::parameters::SqmParameter;
use crate::sqm::tree::{SqmExpression, SqmQueryPart, SqmSearchedWhen, SqmSimpleWhen};

use super::errors::LoweringError;
use super::from_clause::{column_reference, identifier_reference};
use super::from_clause_index::{GroupSource, TableGroupRef};
use super::processing_state::Shallowness;
use super::type_inference::{arithmetic_result, embedded_sub_column, InferredType};
use super::SqmToSqlAstConverter;

impl<'a> SqmToSqlAstConverter<'a> {
    pub(crate) fn lower_expression(&mut self, expression: &'a SqmExpression) -> Result<Expression, LoweringError> {
        match expression {
            SqmExpression::Path { navigable_path } => self.lower_path(navigable_path),
            SqmExpression::Literal { value, value_mapping } => Ok(self.lower_literal(value, value_mapping.as_ref())),
            SqmExpression::Parameter(parameter) => self.lower_parameter(parameter),
            SqmExpression::Function {
                name,
                arguments,
                return_type,
            } => self.lower_function(name, arguments, return_type.as_ref()),
            SqmExpression::CaseSearched {
                when_fragments,
                otherwise,
            } => self.lower_searched_case(when_fragments, otherwise.as_deref()),
            SqmExpression::CaseSimple {
                fixture,
                when_fragments,
                otherwise,
            } => self.lower_simple_case(fixture, when_fragments, otherwise.as_deref()),
            SqmExpression::UnaryOperation { operator, operand } => Ok(Expression::UnaryOperation {
                operator: *operator,
                operand: Box::new(self.lower_expression(operand)?),
            }),
            SqmExpression::BinaryArithmetic { operator, left, right } => {
                let left_inferred = self.sibling_inference(&[right.as_ref()]);
                let right_inferred = self.sibling_inference(&[left.as_ref()]);
                let left = self.with_inferred_type(left_inferred, |converter| converter.lower_expression(left))?;
                let right = self.with_inferred_type(right_inferred, |converter| converter.lower_expression(right))?;
                let jdbc_mapping = match (left.jdbc_mapping(), right.jdbc_mapping()) {
                    (Some(l), Some(r)) => arithmetic_result(l, r),
                    (Some(single), None) | (None, Some(single)) => single.clone(),
                    (None, None) => JdbcMapping::new(JdbcType::Object),
                };
                Ok(Expression::BinaryArithmetic {
                    operator: *operator,
                    left: Box::new(left),
                    right: Box::new(right),
                    jdbc_mapping,
                })
            }
            SqmExpression::Tuple { elements } => self.lower_tuple(elements),
            SqmExpression::Distinct { expression } => Ok(Expression::Distinct {
                expression: Box::new(self.lower_expression(expression)?),
            }),
            SqmExpression::Star => Ok(Expression::Star),
            SqmExpression::SubQuery { query_part } => Ok(Expression::SubQuery {
                query_spec: Box::new(self.lower_subquery(query_part)?),
            }),
        }
    }

    /// Lowers a nested query part in its own frame and registry scope.
    pub(crate) fn lower_subquery(&mut self, query_part: &'a SqmQueryPart) -> Result<QuerySpec, LoweringError> {
        self.with_shallowness(Shallowness::Subquery, |converter| {
            converter.with_inferred_type(InferredType::None, |converter| converter.lower_query_part(query_part))
        })
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    pub(crate) fn lower_path(&mut self, path: &NavigablePath) -> Result<Expression, LoweringError> {
        if let Some(cached) = self.current_state()?.expression_cache.get(path) {
            return Ok(cached.clone());
        }
        if let Some(group) = self.from_clause_index.find(path).cloned() {
            return self.entity_reference(&group);
        }

        let parent_path = path
            .parent()
            .ok_or_else(|| LoweringError::conversion(format!("`{}` does not name a from-element", path)))?;
        let local = path.local_name();
        let expression = match self.from_clause_index.find(&parent_path).cloned() {
            Some(owner) => self.lower_attribute(&owner, local)?,
            None => self.lower_nested_attribute(&parent_path, local)?,
        };

        self.current_state_mut()?
            .expression_cache
            .insert(path.clone(), expression.clone());
        Ok(expression)
    }

    /// `owner.local` where `owner` is itself an attribute path, e.g.
    /// `e.address.city` or `e.manager.id`.
    fn lower_nested_attribute(&mut self, parent_path: &NavigablePath, local: &str) -> Result<Expression, LoweringError> {
        let owner_path = parent_path
            .parent()
            .ok_or_else(|| LoweringError::conversion(format!("`{}` does not name a from-element", parent_path)))?;
        let owner = self.resolve_table_group(&owner_path)?;
        let owner_entity = self.group_entity(&owner)?;
        let parent_attribute = owner_entity.attribute(parent_path.local_name())?;

        match &parent_attribute.kind {
            AttributeKind::Embedded { embeddable, .. } => {
                let column = embedded_sub_column(parent_attribute, local).ok_or_else(|| {
                    LoweringError::conversion(format!("embeddable `{}` has no attribute `{}`", embeddable, local))
                })?;
                Ok(column_reference(owner.qualifier_for(column)?, column).into())
            }
            AttributeKind::ToOne {
                target_entity,
                fk_columns,
                ..
            } => {
                let target = self.metadata.entity(target_entity)?;
                if self.config.implicit_fk_optimization && target.identifier.name == local {
                    log::trace!("{}.{} read from the foreign key", parent_path, local);
                    let columns = fk_columns
                        .iter()
                        .map(|fk| Ok(column_reference(owner.qualifier_for(fk)?, fk).into()))
                        .collect::<Result<Vec<Expression>, LoweringError>>()?;
                    return Ok(tuple_or_single(columns));
                }
                let joined = self.resolve_table_group(parent_path)?;
                self.lower_attribute(&joined, local)
            }
            AttributeKind::ToMany { .. } => {
                let joined = self.resolve_table_group(parent_path)?;
                self.lower_attribute(&joined, local)
            }
            AttributeKind::Basic { .. } => Err(LoweringError::conversion(format!(
                "basic attribute `{}` cannot be dereferenced",
                parent_path
            ))),
        }
    }

    /// Attribute `local` of a registered table group.
    fn lower_attribute(&mut self, owner: &TableGroupRef, local: &str) -> Result<Expression, LoweringError> {
        let entity_name = match &owner.source {
            GroupSource::Entity(entity_name) => entity_name,
            GroupSource::Cte(cte_name) => {
                let column = self
                    .cte_shapes
                    .get(cte_name)
                    .and_then(|columns| columns.iter().find(|column| column.name == local))
                    .ok_or_else(|| LoweringError::conversion(format!("CTE `{}` has no column `{}`", cte_name, local)))?;
                return Ok(Expression::ColumnReference(ColumnReference {
                    qualifier: owner.primary_alias.clone(),
                    column_name: column.name.clone(),
                    jdbc_mapping: column.jdbc_mapping.clone(),
                    selectable_path: local.to_string(),
                    aggregate_column: None,
                }));
            }
        };
        let entity = self.metadata.entity(entity_name)?;
        let attribute = entity.attribute(local)?;
        match &attribute.kind {
            AttributeKind::Basic { column } => Ok(column_reference(owner.qualifier_for(column)?, column).into()),
            AttributeKind::Embedded { columns, .. } => {
                let columns = columns
                    .iter()
                    .map(|column| Ok(column_reference(owner.qualifier_for(column)?, column).into()))
                    .collect::<Result<Vec<Expression>, LoweringError>>()?;
                Ok(tuple_or_single(columns))
            }
            AttributeKind::ToOne { fk_columns, .. } if self.config.implicit_fk_optimization => {
                let columns = fk_columns
                    .iter()
                    .map(|fk| Ok(column_reference(owner.qualifier_for(fk)?, fk).into()))
                    .collect::<Result<Vec<Expression>, LoweringError>>()?;
                Ok(tuple_or_single(columns))
            }
            AttributeKind::ToOne { .. } => {
                let joined = self.resolve_table_group(&owner.navigable_path.append(local))?;
                self.entity_reference(&joined)
            }
            AttributeKind::ToMany { .. } => Err(LoweringError::conversion(format!(
                "plural attribute `{}.{}` cannot be used as a value",
                entity.name, local
            ))),
        }
    }

    /// An entity used as a value: its identifier columns.
    pub(crate) fn entity_reference(&self, group: &TableGroupRef) -> Result<Expression, LoweringError> {
        match &group.source {
            GroupSource::Entity(entity_name) => {
                let entity = self.metadata.entity(entity_name)?;
                Ok(tuple_or_single(identifier_reference(group, entity)?))
            }
            GroupSource::Cte(cte_name) => Err(LoweringError::not_yet_implemented(format!(
                "CTE `{}` used as a value",
                cte_name
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Literals and parameters
    // ------------------------------------------------------------------

    fn lower_literal(&self, value: &serde_json::Value, explicit: Option<&ValueMapping>) -> Expression {
        let jdbc_mapping = explicit
            .cloned()
            .or_else(|| self.current_inferred_mapping())
            .or_else(|| JdbcType::from_json_value(value).map(ValueMapping::basic))
            .and_then(|mapping| mapping.first_jdbc_mapping())
            .unwrap_or_else(|| JdbcMapping::new(JdbcType::Object));
        Expression::Literal(QueryLiteral {
            value: value.clone(),
            jdbc_mapping,
        })
    }

    pub(crate) fn lower_parameter(&mut self, parameter: &SqmParameter) -> Result<Expression, LoweringError> {
        if let Some(binding) = self.bindings.binding(&parameter.key) {
            if binding.is_multi_valued() && !parameter.allow_multi_valued {
                return Err(LoweringError::conversion(format!(
                    "parameter {} is bound to a collection but does not accept multiple values",
                    parameter.key
                )));
            }
        }
        self.lower_parameter_occurrence(parameter)
    }

    /// Creates one JDBC parameter per column of the occurrence's mapping.
    pub(crate) fn lower_parameter_occurrence(&mut self, parameter: &SqmParameter) -> Result<Expression, LoweringError> {
        if !self.xref.contains(parameter.id) {
            return Err(LoweringError::internal(format!(
                "parameter occurrence {} ({}) is not registered in the parameter xref",
                parameter.id.0, parameter.key
            )));
        }
        if self.jdbc_parameters.contains_key(&parameter.id) {
            return Err(LoweringError::internal(format!(
                "parameter occurrence {} ({}) lowered twice",
                parameter.id.0, parameter.key
            )));
        }

        let mapping = self.resolve_parameter_mapping(parameter)?;
        let jdbc_mappings = mapping.jdbc_mappings();
        if jdbc_mappings.is_empty() {
            return Err(LoweringError::conversion(format!(
                "value mapping {} of parameter {} spans no columns",
                mapping, parameter.key
            )));
        }

        let mut jdbc_parameters = Vec::with_capacity(jdbc_mappings.len());
        for jdbc_mapping in jdbc_mappings {
            jdbc_parameters.push(JdbcParameter {
                index: self.next_jdbc_index,
                jdbc_mapping,
            });
            self.next_jdbc_index += 1;
        }
        log::trace!(
            "Parameter {} (occurrence {}) → {} JDBC parameter(s) as {}",
            parameter.key,
            parameter.id.0,
            jdbc_parameters.len(),
            mapping
        );

        self.parameter_mappings.insert(parameter.id, mapping);
        self.jdbc_parameters.insert(parameter.id, jdbc_parameters.clone());
        Ok(tuple_or_single(jdbc_parameters.into_iter().map(Expression::Parameter).collect()))
    }

    // ------------------------------------------------------------------
    // Functions, case, tuples
    // ------------------------------------------------------------------

    fn lower_function(
        &mut self,
        name: &str,
        arguments: &'a [SqmExpression],
        return_type: Option<&ValueMapping>,
    ) -> Result<Expression, LoweringError> {
        let descriptor = get_function_descriptor(name);
        if let Some(descriptor) = descriptor {
            if arguments.len() < descriptor.min_arguments {
                return Err(LoweringError::conversion(format!(
                    "function `{}` expects at least {} argument(s), got {}",
                    descriptor.name,
                    descriptor.min_arguments,
                    arguments.len()
                )));
            }
        }

        // coalesce(:p, e.name) and friends type their arguments from each other
        let argument_inference = match descriptor.map(|descriptor| descriptor.return_type) {
            Some(ReturnType::FirstArgument) => InferredType::FromExpressions(arguments.iter().collect()),
            _ => InferredType::None,
        };
        let lowered = self.with_shallowness(Shallowness::Function, |converter| {
            converter.with_inferred_type(argument_inference, |converter| {
                arguments
                    .iter()
                    .map(|argument| converter.lower_expression(argument))
                    .collect::<Result<Vec<_>, _>>()
            })
        })?;

        let first_jdbc = lowered.first().and_then(Expression::jdbc_mapping).cloned();
        let jdbc_mapping = match (return_type, descriptor.map(|descriptor| descriptor.return_type)) {
            (Some(explicit), _) => explicit.first_jdbc_mapping(),
            (None, Some(ReturnType::Fixed(jdbc_type))) => Some(JdbcMapping::new(jdbc_type)),
            (None, Some(ReturnType::Widened)) => first_jdbc.map(|mapping| JdbcMapping::new(widen(mapping.jdbc_type))),
            (None, Some(ReturnType::FirstArgument)) | (None, None) => first_jdbc,
        }
        .unwrap_or_else(|| JdbcMapping::new(JdbcType::Object));

        Ok(Expression::Function {
            name: name.to_string(),
            arguments: lowered,
            aggregate: descriptor.map(|descriptor| descriptor.aggregate).unwrap_or(false),
            jdbc_mapping,
        })
    }

    fn lower_searched_case(
        &mut self,
        when_fragments: &'a [SqmSearchedWhen],
        otherwise: Option<&'a SqmExpression>,
    ) -> Result<Expression, LoweringError> {
        let results: Vec<&'a SqmExpression> = when_fragments
            .iter()
            .map(|when| &when.result)
            .chain(otherwise)
            .collect();
        let result_inference = self.sibling_inference(&results);

        let mut lowered_whens = Vec::with_capacity(when_fragments.len());
        for when in when_fragments {
            let predicate = self.lower_predicate(&when.predicate)?;
            let result =
                self.with_inferred_type(result_inference.clone(), |converter| converter.lower_expression(&when.result))?;
            lowered_whens.push(SearchedWhen { predicate, result });
        }
        let otherwise = match otherwise {
            Some(otherwise) => Some(Box::new(
                self.with_inferred_type(result_inference, |converter| converter.lower_expression(otherwise))?,
            )),
            None => None,
        };
        let jdbc_mapping = case_result_mapping(lowered_whens.iter().map(|when| &when.result), otherwise.as_deref());
        Ok(Expression::CaseSearched {
            when_fragments: lowered_whens,
            otherwise,
            jdbc_mapping,
        })
    }

    fn lower_simple_case(
        &mut self,
        fixture: &'a SqmExpression,
        when_fragments: &'a [SqmSimpleWhen],
        otherwise: Option<&'a SqmExpression>,
    ) -> Result<Expression, LoweringError> {
        let checks: Vec<&'a SqmExpression> = when_fragments.iter().map(|when| &when.check).collect();
        let fixture_inference = InferredType::FromExpressions(checks);
        let lowered_fixture =
            self.with_inferred_type(fixture_inference, |converter| converter.lower_expression(fixture))?;

        let results: Vec<&'a SqmExpression> = when_fragments
            .iter()
            .map(|when| &when.result)
            .chain(otherwise)
            .collect();
        let result_inference = self.sibling_inference(&results);

        let mut lowered_whens = Vec::with_capacity(when_fragments.len());
        for when in when_fragments {
            let check = self.with_inferred_type(InferredType::FromExpressions(vec![fixture]), |converter| {
                converter.lower_expression(&when.check)
            })?;
            let result =
                self.with_inferred_type(result_inference.clone(), |converter| converter.lower_expression(&when.result))?;
            lowered_whens.push(SimpleWhen { check, result });
        }
        let otherwise = match otherwise {
            Some(otherwise) => Some(Box::new(
                self.with_inferred_type(result_inference, |converter| converter.lower_expression(otherwise))?,
            )),
            None => None,
        };
        let jdbc_mapping = case_result_mapping(lowered_whens.iter().map(|when| &when.result), otherwise.as_deref());
        Ok(Expression::CaseSimple {
            fixture: Box::new(lowered_fixture),
            when_fragments: lowered_whens,
            otherwise,
            jdbc_mapping,
        })
    }

    fn lower_tuple(&mut self, elements: &'a [SqmExpression]) -> Result<Expression, LoweringError> {
        let element_mappings: Vec<Option<ValueMapping>> = match self.current_inferred_mapping() {
            Some(ValueMapping::Embeddable { attributes, .. }) if attributes.len() == elements.len() => {
                attributes.into_iter().map(|(_, mapping)| Some(mapping)).collect()
            }
            Some(ValueMapping::Entity { identifier, .. }) => match *identifier {
                ValueMapping::Embeddable { attributes, .. } if attributes.len() == elements.len() => {
                    attributes.into_iter().map(|(_, mapping)| Some(mapping)).collect()
                }
                _ => vec![None; elements.len()],
            },
            _ => vec![None; elements.len()],
        };

        let mut lowered = Vec::with_capacity(elements.len());
        for (element, mapping) in elements.iter().zip(element_mappings) {
            let inferred = InferredType::from_mapping(mapping);
            lowered.push(self.with_inferred_type(inferred, |converter| converter.lower_expression(element))?);
        }
        Ok(Expression::Tuple { expressions: lowered })
    }
}

/// First result with a known mapping.
fn case_result_mapping<'e>(
    results: impl Iterator<Item = &'e Expression>,
    otherwise: Option<&'e Expression>,
) -> JdbcMapping {
    results
        .chain(otherwise)
        .find_map(Expression::jdbc_mapping)
        .cloned()
        .unwrap_or_else(|| JdbcMapping::new(JdbcType::Object))
}
