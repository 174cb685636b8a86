//! Predicate lowering, including multi-valued IN-list expansion.

use crate::domain_catalog::value_mapping::{JdbcType, ValueMapping};
use crate::sql_ast::expression::Expression;
use crate::sql_ast::predicate::Predicate;
use crate::sqm::parameters::SqmParameter;
use crate::sqm::tree::{SqmExpression, SqmPredicate};

use super::errors::LoweringError;
use super::type_inference::InferredType;
use super::SqmToSqlAstConverter;

impl<'a> SqmToSqlAstConverter<'a> {
    pub(crate) fn lower_predicate(&mut self, predicate: &'a SqmPredicate) -> Result<Predicate, LoweringError> {
        match predicate {
            SqmPredicate::Comparison { left, operator, right } => {
                // Each side takes its mapping from the other, so `:p = e.salary`
                // and `e.salary = :p` type the parameter alike.
                let lowered_left = self.with_inferred_type(InferredType::FromExpressions(vec![right]), |converter| {
                    converter.lower_expression(left)
                })?;
                let lowered_right = self.with_inferred_type(InferredType::FromExpressions(vec![left]), |converter| {
                    converter.lower_expression(right)
                })?;
                check_arity(&lowered_left, &lowered_right)?;
                Ok(Predicate::Comparison {
                    left: lowered_left,
                    operator: *operator,
                    right: lowered_right,
                })
            }
            SqmPredicate::Between {
                expression,
                lower,
                upper,
                negated,
            } => {
                let lowered = self.with_inferred_type(InferredType::FromExpressions(vec![lower, upper]), |converter| {
                    converter.lower_expression(expression)
                })?;
                let lower = self.with_inferred_type(InferredType::FromExpressions(vec![expression]), |converter| {
                    converter.lower_expression(lower)
                })?;
                let upper = self.with_inferred_type(InferredType::FromExpressions(vec![expression]), |converter| {
                    converter.lower_expression(upper)
                })?;
                check_arity(&lowered, &lower)?;
                check_arity(&lowered, &upper)?;
                Ok(Predicate::Between {
                    expression: lowered,
                    lower,
                    upper,
                    negated: *negated,
                })
            }
            SqmPredicate::Like {
                match_expression,
                pattern,
                escape,
                case_sensitive,
                negated,
            } => {
                let lowered_match = self.with_inferred_type(InferredType::FromExpressions(vec![pattern]), |converter| {
                    converter.lower_expression(match_expression)
                })?;
                let lowered_pattern = self
                    .with_inferred_type(InferredType::FromExpressions(vec![match_expression]), |converter| {
                        converter.lower_expression(pattern)
                    })?;
                let lowered_escape = match escape {
                    Some(escape) => Some(self.with_inferred_type(
                        InferredType::Mapping(ValueMapping::basic(JdbcType::Varchar)),
                        |converter| converter.lower_expression(escape),
                    )?),
                    None => None,
                };
                Ok(Predicate::Like {
                    match_expression: lowered_match,
                    pattern: lowered_pattern,
                    escape: lowered_escape,
                    case_sensitive: *case_sensitive,
                    negated: *negated,
                })
            }
            SqmPredicate::Null { expression, negated } => Ok(Predicate::Nullness {
                expression: self.with_inferred_type(InferredType::None, |converter| converter.lower_expression(expression))?,
                negated: *negated,
            }),
            SqmPredicate::InList {
                test_expression,
                list_expressions,
                negated,
            } => self.lower_in_list(test_expression, list_expressions, *negated),
            SqmPredicate::InSubQuery {
                test_expression,
                sub_query,
                negated,
            } => {
                let inferred = InferredType::from_mapping(self.query_part_mapping(sub_query));
                let lowered_test =
                    self.with_inferred_type(inferred, |converter| converter.lower_expression(test_expression))?;
                let lowered_sub_query = self.lower_subquery(sub_query)?;
                let selected = lowered_sub_query.select_clause.sql_selections.len();
                if selected != lowered_test.column_count() {
                    return Err(LoweringError::conversion(format!(
                        "IN subquery selects {} column(s) but the tested expression spans {}",
                        selected,
                        lowered_test.column_count()
                    )));
                }
                Ok(Predicate::InSubQuery {
                    test_expression: lowered_test,
                    sub_query: Box::new(lowered_sub_query),
                    negated: *negated,
                })
            }
            SqmPredicate::Exists { sub_query, negated } => Ok(Predicate::Exists {
                sub_query: Box::new(self.lower_subquery(sub_query)?),
                negated: *negated,
            }),
            SqmPredicate::Junction { operator, predicates } => {
                let predicates = predicates
                    .iter()
                    .map(|predicate| self.lower_predicate(predicate))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Predicate::Junction {
                    operator: *operator,
                    predicates,
                })
            }
            SqmPredicate::Negated { predicate } => Ok(Predicate::Negated {
                predicate: Box::new(self.lower_predicate(predicate)?),
            }),
            SqmPredicate::Grouped { predicate } => Ok(Predicate::Grouped {
                predicate: Box::new(self.lower_predicate(predicate)?),
            }),
            SqmPredicate::BooleanExpression { expression, negated } => {
                let lowered = self.with_inferred_type(
                    InferredType::Mapping(ValueMapping::basic(JdbcType::Boolean)),
                    |converter| converter.lower_expression(expression),
                )?;
                Ok(Predicate::BooleanExpression {
                    expression: lowered,
                    negated: *negated,
                })
            }
            SqmPredicate::Empty { plural_path, .. } => Err(LoweringError::not_yet_implemented(format!(
                "emptiness check on `{}`",
                plural_path
            ))),
            SqmPredicate::MemberOf { plural_path, .. } => Err(LoweringError::not_yet_implemented(format!(
                "member-of check on `{}`",
                plural_path
            ))),
        }
    }

    fn lower_in_list(
        &mut self,
        test_expression: &'a SqmExpression,
        list_expressions: &'a [SqmExpression],
        negated: bool,
    ) -> Result<Predicate, LoweringError> {
        let lowered_test = self.with_inferred_type(
            InferredType::FromExpressions(list_expressions.iter().collect()),
            |converter| converter.lower_expression(test_expression),
        )?;

        if let [SqmExpression::Parameter(parameter)] = list_expressions {
            let bound_values = self
                .bindings
                .binding(&parameter.key)
                .filter(|binding| binding.is_multi_valued())
                .map(|binding| binding.values().len());
            if let Some(bound_values) = bound_values {
                return self.expand_in_list(test_expression, lowered_test, parameter, bound_values, negated);
            }
        }

        let lowered_list = self.with_inferred_type(InferredType::FromExpressions(vec![test_expression]), |converter| {
            list_expressions
                .iter()
                .map(|expression| converter.lower_expression(expression))
                .collect::<Result<Vec<_>, _>>()
        })?;
        for lowered in &lowered_list {
            check_arity(&lowered_test, lowered)?;
        }
        self.check_in_list_limit(lowered_list.len());
        Ok(Predicate::InList {
            test_expression: lowered_test,
            list_expressions: lowered_list,
            negated,
        })
    }

    /// One operand per bound value. The first operand is the original
    /// occurrence; the others are clones registered in the xref as its
    /// expansions.
    fn expand_in_list(
        &mut self,
        test_expression: &'a SqmExpression,
        lowered_test: Expression,
        parameter: &'a SqmParameter,
        bound_values: usize,
        negated: bool,
    ) -> Result<Predicate, LoweringError> {
        let mut operands = self.with_inferred_type(InferredType::FromExpressions(vec![test_expression]), |converter| {
            let mut operands = Vec::with_capacity(bound_values);
            if bound_values == 0 {
                return Ok(operands);
            }
            operands.push(converter.lower_parameter_occurrence(parameter)?);
            for _ in 1..bound_values {
                let id = converter.xref.next_parameter_id().ok_or_else(|| {
                    LoweringError::internal(format!("No parameter id left to expand {}", parameter.key))
                })?;
                let expansion = SqmParameter {
                    id,
                    ..parameter.clone()
                };
                converter.xref.add_expansion(parameter, expansion.clone());
                operands.push(converter.lower_parameter_occurrence(&expansion)?);
            }
            Ok(operands)
        })?;
        for operand in &operands {
            check_arity(&lowered_test, operand)?;
        }

        if self.config.in_clause_parameter_padding && bound_values > 0 {
            let padded = bound_values.next_power_of_two();
            if let Some(last) = operands.last().cloned() {
                operands.resize(padded, last);
            }
        }
        log::debug!(
            "Expanded {} into {} IN-list operand(s) for {} value(s)",
            parameter.key,
            operands.len(),
            bound_values
        );
        self.check_in_list_limit(operands.len());

        Ok(Predicate::InList {
            test_expression: lowered_test,
            list_expressions: operands,
            negated,
        })
    }

    fn check_in_list_limit(&self, operand_count: usize) {
        if let Some(limit) = self.config.in_expression_count_limit {
            if operand_count > limit as usize {
                log::warn!(
                    "IN list with {} expressions exceeds the configured limit of {}",
                    operand_count,
                    limit
                );
            }
        }
    }
}

fn check_arity(left: &Expression, right: &Expression) -> Result<(), LoweringError> {
    if matches!(left, Expression::SubQuery { .. }) || matches!(right, Expression::SubQuery { .. }) {
        return Ok(());
    }
    if left.column_count() != right.column_count() {
        return Err(LoweringError::conversion(format!(
            "tuple arity mismatch: {} column(s) compared with {}",
            left.column_count(),
            right.column_count()
        )));
    }
    Ok(())
}
