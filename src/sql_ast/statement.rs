//! SQL AST statements and query specs.

use serde::Serialize;

use super::expression::{ColumnReference, Expression};
use super::predicate::{combine_predicates, Predicate};
use super::table_group::{FromClause, TableReference};
use crate::domain_catalog::value_mapping::JdbcMapping;
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::tree::{NullPrecedence, SortOrder};

/// SQL clause currently being lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Cte,
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    /// `LIMIT` / `FETCH FIRST`
    Fetch,
    Offset,
    Update,
    Set,
    Delete,
    Insert,
    Values,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlSelection {
    /// Zero-based position in the select list
    pub position: usize,
    pub expression: Expression,
    pub alias: Option<String>,
}

/// How one SQM selection maps onto SQL selection positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainResult {
    Basic {
        alias: Option<String>,
        positions: Vec<usize>,
    },
    Entity {
        alias: Option<String>,
        entity_name: String,
        navigable_path: NavigablePath,
        positions: Vec<usize>,
    },
    Embeddable {
        alias: Option<String>,
        embeddable: String,
        positions: Vec<usize>,
    },
    Instantiation {
        alias: Option<String>,
        target: String,
        arguments: Vec<DomainResult>,
    },
    /// Columns of a fetched association, appended after the selections
    Fetch {
        navigable_path: NavigablePath,
        entity_name: String,
        positions: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SelectClause {
    pub distinct: bool,
    pub sql_selections: Vec<SqlSelection>,
    pub domain_results: Vec<DomainResult>,
}

impl SelectClause {
    pub fn add_sql_selection(&mut self, expression: Expression, alias: Option<String>) -> usize {
        let position = self.sql_selections.len();
        self.sql_selections.push(SqlSelection {
            position,
            expression,
            alias,
        });
        position
    }

    pub fn find_selection(&self, expression: &Expression) -> Option<usize> {
        self.sql_selections
            .iter()
            .find(|selection| &selection.expression == expression)
            .map(|selection| selection.position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortSpecification {
    pub expression: Expression,
    pub order: SortOrder,
    pub nulls: NullPrecedence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    /// Top level of the statement (not a subquery or CTE body)
    pub is_root: bool,
    pub select_clause: SelectClause,
    pub from_clause: FromClause,
    pub where_clause: Option<Predicate>,
    pub group_by: Vec<Expression>,
    pub having: Option<Predicate>,
    pub sort_specifications: Vec<SortSpecification>,
    pub offset: Option<Expression>,
    pub fetch: Option<Expression>,
}

impl QuerySpec {
    pub fn new(is_root: bool) -> Self {
        QuerySpec {
            is_root,
            select_clause: SelectClause::default(),
            from_clause: FromClause::default(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            sort_specifications: Vec::new(),
            offset: None,
            fetch: None,
        }
    }

    /// AND-merges a predicate into the WHERE clause
    pub fn apply_predicate(&mut self, predicate: Option<Predicate>) {
        self.where_clause = combine_predicates(self.where_clause.take(), predicate);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CteColumn {
    pub name: String,
    pub jdbc_mapping: JdbcMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CteStatement {
    pub name: String,
    pub columns: Vec<CteColumn>,
    pub query_spec: QuerySpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    /// Target column(s); several for embeddable or composite FK targets
    pub assignable: Vec<ColumnReference>,
    pub assigned_value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectStatement {
    pub cte_statements: Vec<CteStatement>,
    pub query_spec: QuerySpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateStatement {
    pub target_table: TableReference,
    pub from_clause: FromClause,
    pub assignments: Vec<Assignment>,
    pub restriction: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteStatement {
    pub target_table: TableReference,
    pub from_clause: FromClause,
    pub restriction: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsertSource {
    Select { query_spec: Box<QuerySpec> },
    Values { rows: Vec<Vec<Expression>> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertStatement {
    pub target_table: TableReference,
    pub target_columns: Vec<ColumnReference>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Insert(InsertStatement),
}

impl Statement {
    pub fn as_select(&self) -> Option<&SelectStatement> {
        match self {
            Statement::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn as_update(&self) -> Option<&UpdateStatement> {
        match self {
            Statement::Update(update) => Some(update),
            _ => None,
        }
    }
}
