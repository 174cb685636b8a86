//! SQL AST expressions.

use serde::Serialize;

use super::statement::QuerySpec;
use super::predicate::Predicate;
use crate::domain_catalog::value_mapping::JdbcMapping;
use crate::sqm::tree::{ArithmeticOperator, UnaryArithmeticOperator};

/// A column qualified by the alias of the table reference that owns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReference {
    pub qualifier: String,
    pub column_name: String,
    pub jdbc_mapping: JdbcMapping,
    /// Attribute path relative to the owning entity
    pub selectable_path: String,
    /// Structured column holding this value, for sub-attributes of an
    /// aggregate embeddable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_column: Option<String>,
}

impl ColumnReference {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.qualifier, self.column_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLiteral {
    pub value: serde_json::Value,
    pub jdbc_mapping: JdbcMapping,
}

/// Execution-time bind placeholder for exactly one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JdbcParameter {
    /// Creation order within the translation
    pub index: usize,
    pub jdbc_mapping: JdbcMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchedWhen {
    pub predicate: Predicate,
    pub result: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimpleWhen {
    pub check: Expression,
    pub result: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    ColumnReference(ColumnReference),
    Literal(QueryLiteral),
    Parameter(JdbcParameter),
    Tuple {
        expressions: Vec<Expression>,
    },
    CaseSearched {
        when_fragments: Vec<SearchedWhen>,
        otherwise: Option<Box<Expression>>,
        jdbc_mapping: JdbcMapping,
    },
    CaseSimple {
        fixture: Box<Expression>,
        when_fragments: Vec<SimpleWhen>,
        otherwise: Option<Box<Expression>>,
        jdbc_mapping: JdbcMapping,
    },
    Function {
        name: String,
        arguments: Vec<Expression>,
        aggregate: bool,
        jdbc_mapping: JdbcMapping,
    },
    UnaryOperation {
        operator: UnaryArithmeticOperator,
        operand: Box<Expression>,
    },
    BinaryArithmetic {
        operator: ArithmeticOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        jdbc_mapping: JdbcMapping,
    },
    Distinct {
        expression: Box<Expression>,
    },
    Star,
    SubQuery {
        query_spec: Box<QuerySpec>,
    },
    /// Composite write of several sub-columns into one structured column
    AggregateColumnWrite {
        aggregate_column: ColumnReference,
        column_references: Vec<ColumnReference>,
        values: Vec<Expression>,
    },
}

impl Expression {
    /// Number of columns this expression spans
    pub fn column_count(&self) -> usize {
        match self {
            Expression::Tuple { expressions } => expressions.iter().map(Expression::column_count).sum(),
            _ => 1,
        }
    }

    /// Flattens tuples into their single-column elements.
    pub fn into_columns(self) -> Vec<Expression> {
        match self {
            Expression::Tuple { expressions } => expressions.into_iter().flat_map(Expression::into_columns).collect(),
            other => vec![other],
        }
    }

    pub fn jdbc_mapping(&self) -> Option<&JdbcMapping> {
        match self {
            Expression::ColumnReference(column) => Some(&column.jdbc_mapping),
            Expression::Literal(literal) => Some(&literal.jdbc_mapping),
            Expression::Parameter(parameter) => Some(&parameter.jdbc_mapping),
            Expression::CaseSearched { jdbc_mapping, .. }
            | Expression::CaseSimple { jdbc_mapping, .. }
            | Expression::Function { jdbc_mapping, .. }
            | Expression::BinaryArithmetic { jdbc_mapping, .. } => Some(jdbc_mapping),
            Expression::UnaryOperation { operand, .. } => operand.jdbc_mapping(),
            Expression::Distinct { expression } => expression.jdbc_mapping(),
            Expression::Tuple { expressions } => expressions.first().and_then(Expression::jdbc_mapping),
            Expression::SubQuery { query_spec } => query_spec
                .select_clause
                .sql_selections
                .first()
                .and_then(|selection| selection.expression.jdbc_mapping()),
            Expression::AggregateColumnWrite { aggregate_column, .. } => Some(&aggregate_column.jdbc_mapping),
            Expression::Star => None,
        }
    }

    pub fn as_column_reference(&self) -> Option<&ColumnReference> {
        match self {
            Expression::ColumnReference(column) => Some(column),
            _ => None,
        }
    }

    /// Column references of a column or a tuple of columns.
    pub fn column_references(&self) -> Option<Vec<ColumnReference>> {
        match self {
            Expression::ColumnReference(column) => Some(vec![column.clone()]),
            Expression::Tuple { expressions } => {
                let mut columns = Vec::with_capacity(expressions.len());
                for expression in expressions {
                    columns.extend(expression.column_references()?);
                }
                Some(columns)
            }
            _ => None,
        }
    }

    /// Every JDBC parameter below this expression, in tree order.
    pub fn jdbc_parameters(&self) -> Vec<&JdbcParameter> {
        let mut found = Vec::new();
        self.collect_parameters(&mut found);
        found
    }

    fn collect_parameters<'e>(&'e self, into: &mut Vec<&'e JdbcParameter>) {
        match self {
            Expression::Parameter(parameter) => into.push(parameter),
            Expression::Tuple { expressions } => expressions.iter().for_each(|e| e.collect_parameters(into)),
            Expression::Function { arguments, .. } => arguments.iter().for_each(|e| e.collect_parameters(into)),
            Expression::UnaryOperation { operand, .. } => operand.collect_parameters(into),
            Expression::BinaryArithmetic { left, right, .. } => {
                left.collect_parameters(into);
                right.collect_parameters(into);
            }
            Expression::Distinct { expression } => expression.collect_parameters(into),
            Expression::CaseSearched {
                when_fragments,
                otherwise,
                ..
            } => {
                for when in when_fragments {
                    when.result.collect_parameters(into);
                }
                if let Some(otherwise) = otherwise {
                    otherwise.collect_parameters(into);
                }
            }
            Expression::CaseSimple {
                fixture,
                when_fragments,
                otherwise,
                ..
            } => {
                fixture.collect_parameters(into);
                for when in when_fragments {
                    when.check.collect_parameters(into);
                    when.result.collect_parameters(into);
                }
                if let Some(otherwise) = otherwise {
                    otherwise.collect_parameters(into);
                }
            }
            Expression::AggregateColumnWrite { values, .. } => values.iter().for_each(|e| e.collect_parameters(into)),
            Expression::ColumnReference(_) | Expression::Literal(_) | Expression::Star | Expression::SubQuery { .. } => {}
        }
    }
}

impl From<ColumnReference> for Expression {
    fn from(column: ColumnReference) -> Self {
        Expression::ColumnReference(column)
    }
}

/// Single expression, or a tuple when several columns are involved.
pub fn tuple_or_single(mut expressions: Vec<Expression>) -> Expression {
    if expressions.len() == 1 {
        if let Some(single) = expressions.pop() {
            return single;
        }
    }
    Expression::Tuple { expressions }
}
