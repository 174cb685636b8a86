//! SQM node tree.
//!
//! The tree is produced externally (query-language parser or criteria
//! builder) and treated as immutable by the converter. Every node kind is a
//! variant of a closed enum so lowering is one exhaustive `match` per family.

use serde::{Deserialize, Serialize};

use super::navigable_path::NavigablePath;
use super::parameters::SqmParameter;
use crate::domain_catalog::value_mapping::ValueMapping;

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmStatement {
    Select(SqmSelectStatement),
    Update(SqmUpdateStatement),
    Delete(SqmDeleteStatement),
    InsertSelect(SqmInsertSelectStatement),
    InsertValues(SqmInsertValuesStatement),
}

impl SqmStatement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqmStatement::Select(_) => "select",
            SqmStatement::Update(_) => "update",
            SqmStatement::Delete(_) => "delete",
            SqmStatement::InsertSelect(_) => "insert-select",
            SqmStatement::InsertValues(_) => "insert-values",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmSelectStatement {
    #[serde(default)]
    pub cte_statements: Vec<SqmCteStatement>,
    pub query_part: SqmQueryPart,
}

/// `WITH name (columns) AS (query)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmCteStatement {
    pub name: String,
    /// Explicit column names; defaults to the selection aliases
    #[serde(default)]
    pub columns: Vec<String>,
    pub query_part: SqmQueryPart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmUpdateStatement {
    pub target: SqmRoot,
    pub assignments: Vec<SqmAssignment>,
    #[serde(default)]
    pub where_clause: Option<SqmPredicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmAssignment {
    pub target_path: NavigablePath,
    pub value: SqmExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmDeleteStatement {
    pub target: SqmRoot,
    #[serde(default)]
    pub where_clause: Option<SqmPredicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmInsertSelectStatement {
    pub target: SqmRoot,
    pub insert_paths: Vec<NavigablePath>,
    pub select_query: SqmQueryPart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmInsertValuesStatement {
    pub target: SqmRoot,
    pub insert_paths: Vec<NavigablePath>,
    pub values_list: Vec<Vec<SqmExpression>>,
}

// ============================================================================
// Query parts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmQueryPart {
    Spec(Box<SqmQuerySpec>),
    /// Set operation (UNION / INTERSECT / EXCEPT) over several parts
    Group(SqmQueryGroup),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmQueryGroup {
    pub operator: SetOperator,
    pub parts: Vec<SqmQueryPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqmQuerySpec {
    pub from_clause: SqmFromClause,
    #[serde(default)]
    pub select_clause: Option<SqmSelectClause>,
    #[serde(default)]
    pub where_clause: Option<SqmPredicate>,
    #[serde(default)]
    pub group_by: Vec<SqmExpression>,
    #[serde(default)]
    pub having: Option<SqmPredicate>,
    #[serde(default)]
    pub order_by: Vec<SqmSortSpecification>,
    #[serde(default)]
    pub offset: Option<SqmExpression>,
    /// Row limit (`LIMIT` / `FETCH FIRST`)
    #[serde(default)]
    pub fetch: Option<SqmExpression>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqmFromClause {
    pub roots: Vec<SqmRoot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmRoot {
    pub navigable_path: NavigablePath,
    pub source: SqmRootSource,
    #[serde(default)]
    pub joins: Vec<SqmJoin>,
    #[serde(default)]
    pub implicit_joins: Vec<SqmImplicitJoin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmRootSource {
    Entity { entity_name: String },
    Cte { cte_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmJoin {
    pub navigable_path: NavigablePath,
    pub kind: SqmJoinKind,
    pub join_type: SqmJoinType,
    #[serde(default)]
    pub fetched: bool,
    #[serde(default)]
    pub on_clause: Option<SqmPredicate>,
    #[serde(default)]
    pub joins: Vec<SqmJoin>,
    #[serde(default)]
    pub implicit_joins: Vec<SqmImplicitJoin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmJoinKind {
    /// `join e.manager m`: the attribute is the path's local name
    Attribute,
    /// `cross join Department d`
    Cross { entity_name: String },
    /// `join Department d on ...`
    Entity { entity_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqmJoinType {
    Inner,
    Left,
    Cross,
}

/// Join introduced by plain attribute navigation, e.g. `e.manager.name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmImplicitJoin {
    pub navigable_path: NavigablePath,
    #[serde(default)]
    pub implicit_joins: Vec<SqmImplicitJoin>,
}

// ============================================================================
// Select, order
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqmSelectClause {
    #[serde(default)]
    pub distinct: bool,
    pub selections: Vec<SqmSelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmSelection {
    pub selectable: SqmSelectable,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmSelectable {
    Expression { expression: SqmExpression },
    /// `select new Target(a, b)`
    DynamicInstantiation {
        target: String,
        arguments: Vec<SqmSelection>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmSortSpecification {
    pub expression: SqmExpression,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub nulls: NullPrecedence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPrecedence {
    #[default]
    None,
    First,
    Last,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmExpression {
    /// Reference to a from-element or one of its attributes
    Path { navigable_path: NavigablePath },
    Literal {
        value: serde_json::Value,
        #[serde(default)]
        value_mapping: Option<ValueMapping>,
    },
    Parameter(SqmParameter),
    Function {
        name: String,
        #[serde(default)]
        arguments: Vec<SqmExpression>,
        #[serde(default)]
        return_type: Option<ValueMapping>,
    },
    CaseSearched {
        when_fragments: Vec<SqmSearchedWhen>,
        #[serde(default)]
        otherwise: Option<Box<SqmExpression>>,
    },
    CaseSimple {
        fixture: Box<SqmExpression>,
        when_fragments: Vec<SqmSimpleWhen>,
        #[serde(default)]
        otherwise: Option<Box<SqmExpression>>,
    },
    UnaryOperation {
        operator: UnaryArithmeticOperator,
        operand: Box<SqmExpression>,
    },
    BinaryArithmetic {
        operator: ArithmeticOperator,
        left: Box<SqmExpression>,
        right: Box<SqmExpression>,
    },
    Tuple { elements: Vec<SqmExpression> },
    Distinct { expression: Box<SqmExpression> },
    Star,
    SubQuery { query_part: Box<SqmQueryPart> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmSearchedWhen {
    pub predicate: SqmPredicate,
    pub result: SqmExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmSimpleWhen {
    pub check: SqmExpression,
    pub result: SqmExpression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryArithmeticOperator {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

// ============================================================================
// Predicates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqmPredicate {
    Comparison {
        left: SqmExpression,
        operator: ComparisonOperator,
        right: SqmExpression,
    },
    Between {
        expression: SqmExpression,
        lower: SqmExpression,
        upper: SqmExpression,
        #[serde(default)]
        negated: bool,
    },
    Like {
        match_expression: SqmExpression,
        pattern: SqmExpression,
        #[serde(default)]
        escape: Option<SqmExpression>,
        #[serde(default = "default_true")]
        case_sensitive: bool,
        #[serde(default)]
        negated: bool,
    },
    Null {
        expression: SqmExpression,
        #[serde(default)]
        negated: bool,
    },
    InList {
        test_expression: SqmExpression,
        list_expressions: Vec<SqmExpression>,
        #[serde(default)]
        negated: bool,
    },
    InSubQuery {
        test_expression: SqmExpression,
        sub_query: SqmQueryPart,
        #[serde(default)]
        negated: bool,
    },
    Exists {
        sub_query: SqmQueryPart,
        #[serde(default)]
        negated: bool,
    },
    Junction {
        operator: JunctionOperator,
        predicates: Vec<SqmPredicate>,
    },
    Negated { predicate: Box<SqmPredicate> },
    Grouped { predicate: Box<SqmPredicate> },
    BooleanExpression {
        expression: SqmExpression,
        #[serde(default)]
        negated: bool,
    },
    /// `e.reports is empty`
    Empty {
        plural_path: NavigablePath,
        #[serde(default)]
        negated: bool,
    },
    /// `:x member of e.reports`
    MemberOf {
        value: SqmExpression,
        plural_path: NavigablePath,
        #[serde(default)]
        negated: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JunctionOperator {
    And,
    Or,
}
