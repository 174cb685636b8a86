//! Read-only traversal of an SQM tree.

use super::parameters::SqmParameter;
use super::tree::*;

/// All parameter occurrences of a statement, in tree order.
pub fn collect_parameters(statement: &SqmStatement) -> Vec<&SqmParameter> {
    let mut collector = ParameterCollector { found: Vec::new() };
    collector.statement(statement);
    collector.found
}

struct ParameterCollector<'t> {
    found: Vec<&'t SqmParameter>,
}

impl<'t> ParameterCollector<'t> {
    fn statement(&mut self, statement: &'t SqmStatement) {
        match statement {
            SqmStatement::Select(select) => {
                for cte in &select.cte_statements {
                    self.query_part(&cte.query_part);
                }
                self.query_part(&select.query_part);
            }
            SqmStatement::Update(update) => {
                self.root(&update.target);
                for assignment in &update.assignments {
                    self.expression(&assignment.value);
                }
                self.optional_predicate(update.where_clause.as_ref());
            }
            SqmStatement::Delete(delete) => {
                self.root(&delete.target);
                self.optional_predicate(delete.where_clause.as_ref());
            }
            SqmStatement::InsertSelect(insert) => self.query_part(&insert.select_query),
            SqmStatement::InsertValues(insert) => {
                for row in &insert.values_list {
                    for value in row {
                        self.expression(value);
                    }
                }
            }
        }
    }

    fn query_part(&mut self, part: &'t SqmQueryPart) {
        match part {
            SqmQueryPart::Spec(spec) => self.query_spec(spec),
            SqmQueryPart::Group(group) => {
                for part in &group.parts {
                    self.query_part(part);
                }
            }
        }
    }

    fn query_spec(&mut self, spec: &'t SqmQuerySpec) {
        for root in &spec.from_clause.roots {
            self.root(root);
        }
        if let Some(select) = &spec.select_clause {
            for selection in &select.selections {
                self.selection(selection);
            }
        }
        self.optional_predicate(spec.where_clause.as_ref());
        for expression in &spec.group_by {
            self.expression(expression);
        }
        self.optional_predicate(spec.having.as_ref());
        for sort in &spec.order_by {
            self.expression(&sort.expression);
        }
        if let Some(offset) = &spec.offset {
            self.expression(offset);
        }
        if let Some(fetch) = &spec.fetch {
            self.expression(fetch);
        }
    }

    fn root(&mut self, root: &'t SqmRoot) {
        for join in &root.joins {
            self.join(join);
        }
    }

    fn join(&mut self, join: &'t SqmJoin) {
        self.optional_predicate(join.on_clause.as_ref());
        for nested in &join.joins {
            self.join(nested);
        }
    }

    fn selection(&mut self, selection: &'t SqmSelection) {
        match &selection.selectable {
            SqmSelectable::Expression { expression } => self.expression(expression),
            SqmSelectable::DynamicInstantiation { arguments, .. } => {
                for argument in arguments {
                    self.selection(argument);
                }
            }
        }
    }

    fn optional_predicate(&mut self, predicate: Option<&'t SqmPredicate>) {
        if let Some(predicate) = predicate {
            self.predicate(predicate);
        }
    }

    fn predicate(&mut self, predicate: &'t SqmPredicate) {
        match predicate {
            SqmPredicate::Comparison { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            SqmPredicate::Between {
                expression,
                lower,
                upper,
                ..
            } => {
                self.expression(expression);
                self.expression(lower);
                self.expression(upper);
            }
            SqmPredicate::Like {
                match_expression,
                pattern,
                escape,
                ..
            } => {
                self.expression(match_expression);
                self.expression(pattern);
                if let Some(escape) = escape {
                    self.expression(escape);
                }
            }
            SqmPredicate::Null { expression, .. } | SqmPredicate::BooleanExpression { expression, .. } => {
                self.expression(expression)
            }
            SqmPredicate::InList {
                test_expression,
                list_expressions,
                ..
            } => {
                self.expression(test_expression);
                for expression in list_expressions {
                    self.expression(expression);
                }
            }
            SqmPredicate::InSubQuery {
                test_expression,
                sub_query,
                ..
            } => {
                self.expression(test_expression);
                self.query_part(sub_query);
            }
            SqmPredicate::Exists { sub_query, .. } => self.query_part(sub_query),
            SqmPredicate::Junction { predicates, .. } => {
                for predicate in predicates {
                    self.predicate(predicate);
                }
            }
            SqmPredicate::Negated { predicate } | SqmPredicate::Grouped { predicate } => self.predicate(predicate),
            SqmPredicate::Empty { .. } => {}
            SqmPredicate::MemberOf { value, .. } => self.expression(value),
        }
    }

    fn expression(&mut self, expression: &'t SqmExpression) {
        match expression {
            SqmExpression::Parameter(parameter) => self.found.push(parameter),
            SqmExpression::Path { .. } | SqmExpression::Literal { .. } | SqmExpression::Star => {}
            SqmExpression::Function { arguments, .. } => {
                for argument in arguments {
                    self.expression(argument);
                }
            }
            SqmExpression::CaseSearched {
                when_fragments,
                otherwise,
            } => {
                for when in when_fragments {
                    self.predicate(&when.predicate);
                    self.expression(&when.result);
                }
                if let Some(otherwise) = otherwise {
                    self.expression(otherwise);
                }
            }
            SqmExpression::CaseSimple {
                fixture,
                when_fragments,
                otherwise,
            } => {
                self.expression(fixture);
                for when in when_fragments {
                    self.expression(&when.check);
                    self.expression(&when.result);
                }
                if let Some(otherwise) = otherwise {
                    self.expression(otherwise);
                }
            }
            SqmExpression::UnaryOperation { operand, .. } => self.expression(operand),
            SqmExpression::BinaryArithmetic { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            SqmExpression::Tuple { elements } => {
                for element in elements {
                    self.expression(element);
                }
            }
            SqmExpression::Distinct { expression } => self.expression(expression),
            SqmExpression::SubQuery { query_part } => self.query_part(query_part),
        }
    }
}
