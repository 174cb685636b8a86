//! Programmatic construction of SQM trees.
//!
//! ```ignore
//! let mut b = SqmBuilder::new();
//! let e = entity_root("Employee", "e");
//! let spec = SqmQuerySpec::from_root(e.clone())
//!     .with_selection(select_item(path(&e.navigable_path)))
//!     .with_where(eq(attr(&e.navigable_path, "name"), b.named_parameter("name")));
//! let statement = SqmStatement::select(spec);
//! ```

use super::navigable_path::NavigablePath;
use super::parameters::{ParameterKey, SqmParameter, SqmParameterId};
use super::tree::*;
use crate::domain_catalog::value_mapping::ValueMapping;

/// Allocates parameter occurrence ids while a tree is being built.
#[derive(Debug, Default)]
pub struct SqmBuilder {
    next_parameter_id: u32,
}

impl SqmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter(
        &mut self,
        key: ParameterKey,
        anticipated_type: Option<ValueMapping>,
        allow_multi_valued: bool,
    ) -> SqmParameter {
        let id = SqmParameterId(self.next_parameter_id);
        self.next_parameter_id += 1;
        SqmParameter {
            id,
            key,
            anticipated_type,
            allow_multi_valued,
        }
    }

    pub fn named_parameter(&mut self, name: &str) -> SqmExpression {
        SqmExpression::Parameter(self.parameter(ParameterKey::Named(name.to_string()), None, false))
    }

    pub fn positional_parameter(&mut self, position: u32) -> SqmExpression {
        SqmExpression::Parameter(self.parameter(ParameterKey::Positional(position), None, false))
    }

    pub fn typed_parameter(&mut self, name: &str, anticipated_type: ValueMapping) -> SqmExpression {
        SqmExpression::Parameter(self.parameter(
            ParameterKey::Named(name.to_string()),
            Some(anticipated_type),
            false,
        ))
    }

    /// Parameter allowed to carry a collection, e.g. `in (:ids)`
    pub fn multi_valued_parameter(&mut self, name: &str) -> SqmExpression {
        SqmExpression::Parameter(self.parameter(ParameterKey::Named(name.to_string()), None, true))
    }
}

// ===== FROM =====

pub fn entity_root(entity_name: &str, alias: &str) -> SqmRoot {
    SqmRoot {
        navigable_path: NavigablePath::root(entity_name, Some(alias)),
        source: SqmRootSource::Entity {
            entity_name: entity_name.to_string(),
        },
        joins: Vec::new(),
        implicit_joins: Vec::new(),
    }
}

pub fn cte_root(cte_name: &str, alias: &str) -> SqmRoot {
    SqmRoot {
        navigable_path: NavigablePath::root(cte_name, Some(alias)),
        source: SqmRootSource::Cte {
            cte_name: cte_name.to_string(),
        },
        joins: Vec::new(),
        implicit_joins: Vec::new(),
    }
}

impl SqmRoot {
    pub fn with_join(mut self, join: SqmJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_implicit_join(mut self, join: SqmImplicitJoin) -> Self {
        self.implicit_joins.push(join);
        self
    }
}

/// `join parent.attribute alias`
pub fn attribute_join(
    parent: &NavigablePath,
    attribute: &str,
    alias: Option<&str>,
    join_type: SqmJoinType,
) -> SqmJoin {
    let navigable_path = match alias {
        Some(alias) => parent.append_with_alias(attribute, alias),
        None => parent.append(attribute),
    };
    SqmJoin {
        navigable_path,
        kind: SqmJoinKind::Attribute,
        join_type,
        fetched: false,
        on_clause: None,
        joins: Vec::new(),
        implicit_joins: Vec::new(),
    }
}

pub fn entity_join(entity_name: &str, alias: &str, join_type: SqmJoinType, on_clause: SqmPredicate) -> SqmJoin {
    SqmJoin {
        navigable_path: NavigablePath::root(entity_name, Some(alias)),
        kind: SqmJoinKind::Entity {
            entity_name: entity_name.to_string(),
        },
        join_type,
        fetched: false,
        on_clause: Some(on_clause),
        joins: Vec::new(),
        implicit_joins: Vec::new(),
    }
}

pub fn cross_join(entity_name: &str, alias: &str) -> SqmJoin {
    SqmJoin {
        navigable_path: NavigablePath::root(entity_name, Some(alias)),
        kind: SqmJoinKind::Cross {
            entity_name: entity_name.to_string(),
        },
        join_type: SqmJoinType::Cross,
        fetched: false,
        on_clause: None,
        joins: Vec::new(),
        implicit_joins: Vec::new(),
    }
}

pub fn implicit_join(parent: &NavigablePath, attribute: &str) -> SqmImplicitJoin {
    SqmImplicitJoin {
        navigable_path: parent.append(attribute),
        implicit_joins: Vec::new(),
    }
}

impl SqmJoin {
    pub fn fetch(mut self) -> Self {
        self.fetched = true;
        self
    }

    pub fn with_on(mut self, predicate: SqmPredicate) -> Self {
        self.on_clause = Some(predicate);
        self
    }

    pub fn with_join(mut self, join: SqmJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_implicit_join(mut self, join: SqmImplicitJoin) -> Self {
        self.implicit_joins.push(join);
        self
    }
}

// ===== EXPRESSIONS =====

pub fn path(navigable_path: &NavigablePath) -> SqmExpression {
    SqmExpression::Path {
        navigable_path: navigable_path.clone(),
    }
}

/// `parent.name`
pub fn attr(parent: &NavigablePath, name: &str) -> SqmExpression {
    SqmExpression::Path {
        navigable_path: parent.append(name),
    }
}

pub fn literal(value: serde_json::Value) -> SqmExpression {
    SqmExpression::Literal {
        value,
        value_mapping: None,
    }
}

pub fn typed_literal(value: serde_json::Value, value_mapping: ValueMapping) -> SqmExpression {
    SqmExpression::Literal {
        value,
        value_mapping: Some(value_mapping),
    }
}

pub fn function(name: &str, arguments: Vec<SqmExpression>) -> SqmExpression {
    SqmExpression::Function {
        name: name.to_string(),
        arguments,
        return_type: None,
    }
}

pub fn arithmetic(left: SqmExpression, operator: ArithmeticOperator, right: SqmExpression) -> SqmExpression {
    SqmExpression::BinaryArithmetic {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn tuple(elements: Vec<SqmExpression>) -> SqmExpression {
    SqmExpression::Tuple { elements }
}

pub fn subquery_expression(spec: SqmQuerySpec) -> SqmExpression {
    SqmExpression::SubQuery {
        query_part: Box::new(subquery(spec)),
    }
}

// ===== PREDICATES =====

pub fn comparison(left: SqmExpression, operator: ComparisonOperator, right: SqmExpression) -> SqmPredicate {
    SqmPredicate::Comparison { left, operator, right }
}

pub fn eq(left: SqmExpression, right: SqmExpression) -> SqmPredicate {
    comparison(left, ComparisonOperator::Equal, right)
}

pub fn and(predicates: Vec<SqmPredicate>) -> SqmPredicate {
    SqmPredicate::Junction {
        operator: JunctionOperator::And,
        predicates,
    }
}

pub fn or(predicates: Vec<SqmPredicate>) -> SqmPredicate {
    SqmPredicate::Junction {
        operator: JunctionOperator::Or,
        predicates,
    }
}

pub fn between(expression: SqmExpression, lower: SqmExpression, upper: SqmExpression) -> SqmPredicate {
    SqmPredicate::Between {
        expression,
        lower,
        upper,
        negated: false,
    }
}

pub fn in_list(test_expression: SqmExpression, list_expressions: Vec<SqmExpression>) -> SqmPredicate {
    SqmPredicate::InList {
        test_expression,
        list_expressions,
        negated: false,
    }
}

pub fn exists(spec: SqmQuerySpec) -> SqmPredicate {
    SqmPredicate::Exists {
        sub_query: subquery(spec),
        negated: false,
    }
}

pub fn is_null(expression: SqmExpression) -> SqmPredicate {
    SqmPredicate::Null {
        expression,
        negated: false,
    }
}

// ===== QUERY =====

pub fn select_item(expression: SqmExpression) -> SqmSelection {
    SqmSelection {
        selectable: SqmSelectable::Expression { expression },
        alias: None,
    }
}

pub fn aliased_item(expression: SqmExpression, alias: &str) -> SqmSelection {
    SqmSelection {
        selectable: SqmSelectable::Expression { expression },
        alias: Some(alias.to_string()),
    }
}

pub fn instantiation(target: &str, arguments: Vec<SqmSelection>) -> SqmSelection {
    SqmSelection {
        selectable: SqmSelectable::DynamicInstantiation {
            target: target.to_string(),
            arguments,
        },
        alias: None,
    }
}

pub fn subquery(spec: SqmQuerySpec) -> SqmQueryPart {
    SqmQueryPart::Spec(Box::new(spec))
}

impl SqmQuerySpec {
    pub fn from_root(root: SqmRoot) -> Self {
        SqmQuerySpec {
            from_clause: SqmFromClause { roots: vec![root] },
            ..Default::default()
        }
    }

    pub fn with_root(mut self, root: SqmRoot) -> Self {
        self.from_clause.roots.push(root);
        self
    }

    pub fn with_selection(mut self, selection: SqmSelection) -> Self {
        self.select_clause
            .get_or_insert_with(SqmSelectClause::default)
            .selections
            .push(selection);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.select_clause.get_or_insert_with(SqmSelectClause::default).distinct = true;
        self
    }

    pub fn with_where(mut self, predicate: SqmPredicate) -> Self {
        self.where_clause = Some(predicate);
        self
    }

    pub fn with_group_by(mut self, expression: SqmExpression) -> Self {
        self.group_by.push(expression);
        self
    }

    pub fn with_having(mut self, predicate: SqmPredicate) -> Self {
        self.having = Some(predicate);
        self
    }

    pub fn with_order_by(mut self, expression: SqmExpression, order: SortOrder) -> Self {
        self.order_by.push(SqmSortSpecification {
            expression,
            order,
            nulls: NullPrecedence::None,
        });
        self
    }

    pub fn with_offset(mut self, offset: SqmExpression) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_fetch(mut self, fetch: SqmExpression) -> Self {
        self.fetch = Some(fetch);
        self
    }
}

impl SqmStatement {
    pub fn select(spec: SqmQuerySpec) -> Self {
        SqmStatement::Select(SqmSelectStatement {
            cte_statements: Vec::new(),
            query_part: subquery(spec),
        })
    }

    pub fn select_with_ctes(ctes: Vec<SqmCteStatement>, spec: SqmQuerySpec) -> Self {
        SqmStatement::Select(SqmSelectStatement {
            cte_statements: ctes,
            query_part: subquery(spec),
        })
    }
}
