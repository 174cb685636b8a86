//! SQL AST predicates.

use serde::Serialize;

use super::expression::Expression;
use super::statement::QuerySpec;
use crate::sqm::tree::{ComparisonOperator, JunctionOperator};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Comparison {
        left: Expression,
        operator: ComparisonOperator,
        right: Expression,
    },
    Between {
        expression: Expression,
        lower: Expression,
        upper: Expression,
        negated: bool,
    },
    Like {
        match_expression: Expression,
        pattern: Expression,
        escape: Option<Expression>,
        case_sensitive: bool,
        negated: bool,
    },
    Nullness {
        expression: Expression,
        negated: bool,
    },
    InList {
        test_expression: Expression,
        list_expressions: Vec<Expression>,
        negated: bool,
    },
    InSubQuery {
        test_expression: Expression,
        sub_query: Box<QuerySpec>,
        negated: bool,
    },
    Exists {
        sub_query: Box<QuerySpec>,
        negated: bool,
    },
    Junction {
        operator: JunctionOperator,
        predicates: Vec<Predicate>,
    },
    Negated {
        predicate: Box<Predicate>,
    },
    Grouped {
        predicate: Box<Predicate>,
    },
    BooleanExpression {
        expression: Expression,
        negated: bool,
    },
    /// Raw SQL restriction; `{alias}` placeholders refer to `qualifier`
    SqlFragment {
        sql: String,
        qualifier: String,
    },
}

impl Predicate {
    pub fn equal(left: Expression, right: Expression) -> Self {
        Predicate::Comparison {
            left,
            operator: ComparisonOperator::Equal,
            right,
        }
    }
}

/// AND-merges `incoming` into `base`, flattening into an existing
/// conjunction.
pub fn combine_predicates(base: Option<Predicate>, incoming: Option<Predicate>) -> Option<Predicate> {
    match (base, incoming) {
        (None, incoming) => incoming,
        (base, None) => base,
        (
            Some(Predicate::Junction {
                operator: JunctionOperator::And,
                mut predicates,
            }),
            Some(incoming),
        ) => {
            predicates.push(incoming);
            Some(Predicate::Junction {
                operator: JunctionOperator::And,
                predicates,
            })
        }
        (Some(base), Some(incoming)) => Some(Predicate::Junction {
            operator: JunctionOperator::And,
            predicates: vec![base, incoming],
        }),
    }
}

/// Conjunction of all predicates; `None` when empty.
pub fn conjunction(predicates: Vec<Predicate>) -> Option<Predicate> {
    predicates
        .into_iter()
        .fold(None, |acc, predicate| combine_predicates(acc, Some(predicate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(sql: &str) -> Predicate {
        Predicate::SqlFragment {
            sql: sql.to_string(),
            qualifier: "e1_0".to_string(),
        }
    }

    #[test]
    fn test_combine_flattens_conjunctions() {
        let combined = combine_predicates(Some(fragment("a")), Some(fragment("b")));
        let combined = combine_predicates(combined, Some(fragment("c")));
        match combined {
            Some(Predicate::Junction { predicates, .. }) => assert_eq!(predicates.len(), 3),
            other => panic!("expected conjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_combine_with_nothing() {
        assert_eq!(combine_predicates(None, None), None);
        assert_eq!(combine_predicates(None, Some(fragment("a"))), Some(fragment("a")));
        assert_eq!(conjunction(vec![fragment("a")]), Some(fragment("a")));
        assert_eq!(conjunction(Vec::new()), None);
    }
}
