//! Alias / table-group registry.
//!
//! Maps navigable paths to the table groups lowered for them. A subquery
//! opens a child scope whose lookups fall through to the parent scope, so
//! correlated references resolve against the outer query. Sibling scopes
//! never see each other.
//!
//! ```text
//! select e from Employee e where exists (select 1 from Employee x where x.manager = e)
//! └─ scope0: Employee(e) ─────────────────────────────────────────────────┘
//!                                 └─ scope1: Employee(x) → falls back to scope0 for e
//! ```

use std::collections::HashMap;

use super::errors::LoweringError;
use crate::domain_catalog::domain_model::ColumnMapping;
use crate::sql_ast::table_group::TableGroup;
use crate::sqm::navigable_path::NavigablePath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSource {
    Entity(String),
    Cte(String),
}

/// Snapshot of a registered table group: what expression lowering needs
/// without borrowing the query spec under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGroupRef {
    pub navigable_path: NavigablePath,
    pub group_alias: String,
    pub source_alias: Option<String>,
    pub source: GroupSource,
    pub primary_table: String,
    pub primary_alias: String,
    /// secondary table name → alias
    pub secondary_aliases: HashMap<String, String>,
    pub can_use_inner_joins: bool,
}

impl TableGroupRef {
    pub fn of(group: &TableGroup, source: GroupSource) -> Self {
        TableGroupRef {
            navigable_path: group.navigable_path.clone(),
            group_alias: group.group_alias.clone(),
            source_alias: group.source_alias.clone(),
            source,
            primary_table: group.primary_table_reference.table_expression.clone(),
            primary_alias: group.primary_table_reference.identification_variable.clone(),
            secondary_aliases: group
                .table_reference_joins
                .iter()
                .map(|join| {
                    (
                        join.table_reference.table_expression.clone(),
                        join.table_reference.identification_variable.clone(),
                    )
                })
                .collect(),
            can_use_inner_joins: group.can_use_inner_joins,
        }
    }

    pub fn entity_name(&self) -> Option<&str> {
        match &self.source {
            GroupSource::Entity(name) => Some(name),
            GroupSource::Cte(_) => None,
        }
    }

    /// Alias of the table owning `column`.
    pub fn qualifier_for(&self, column: &ColumnMapping) -> Result<&str, LoweringError> {
        match column.table_name.as_deref() {
            None => Ok(&self.primary_alias),
            Some(table) if table == self.primary_table => Ok(&self.primary_alias),
            Some(table) => self.secondary_aliases.get(table).map(String::as_str).ok_or_else(|| {
                LoweringError::conversion(format!(
                    "column `{}` belongs to table `{}` which is not part of `{}`",
                    column.column_name, table, self.navigable_path
                ))
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct FromClauseIndex {
    table_groups: HashMap<NavigablePath, TableGroupRef>,
    /// explicit identification variable → path
    aliases: HashMap<String, NavigablePath>,
    fetched_paths: Vec<NavigablePath>,
    parent: Option<Box<FromClauseIndex>>,
}

impl FromClauseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child_of(parent: FromClauseIndex) -> Self {
        FromClauseIndex {
            parent: Some(Box::new(parent)),
            ..Default::default()
        }
    }

    /// Drops this scope and hands back the enclosing one.
    pub fn into_parent(self) -> Option<FromClauseIndex> {
        self.parent.map(|parent| *parent)
    }

    /// Number of enclosing scopes
    pub fn scope_depth(&self) -> usize {
        self.parent.as_ref().map(|p| p.scope_depth() + 1).unwrap_or(0)
    }

    pub fn register(&mut self, group: TableGroupRef) {
        if let Some(alias) = &group.source_alias {
            if let Some(previous) = self.aliases.insert(alias.clone(), group.navigable_path.clone()) {
                if previous != group.navigable_path {
                    log::debug!(
                        "Alias `{}` redefined: {} now points to {}",
                        alias,
                        previous,
                        group.navigable_path
                    );
                }
            }
        }
        if let Some(previous) = self.table_groups.insert(group.navigable_path.clone(), group) {
            log::debug!(
                "Table group for {} re-registered (was {})",
                previous.navigable_path,
                previous.group_alias
            );
        }
    }

    /// Registers in the scope `depth` levels above this one.
    pub fn register_at_depth(&mut self, depth: usize, group: TableGroupRef) -> Result<(), LoweringError> {
        if depth == 0 {
            self.register(group);
            return Ok(());
        }
        match self.parent.as_mut() {
            Some(parent) => parent.register_at_depth(depth - 1, group),
            None => Err(LoweringError::internal(format!(
                "no registry scope {} level(s) up for {}",
                depth, group.navigable_path
            ))),
        }
    }

    pub fn find(&self, path: &NavigablePath) -> Option<&TableGroupRef> {
        self.find_local(path)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.find(path)))
    }

    pub fn find_local(&self, path: &NavigablePath) -> Option<&TableGroupRef> {
        self.table_groups.get(path)
    }

    pub fn is_resolved(&self, path: &NavigablePath) -> bool {
        self.find(path).is_some()
    }

    /// How many scopes up the path is registered; 0 is this scope
    pub fn owner_depth(&self, path: &NavigablePath) -> Option<usize> {
        if self.table_groups.contains_key(path) {
            return Some(0);
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.owner_depth(path))
            .map(|depth| depth + 1)
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<&TableGroupRef> {
        self.find_local_by_alias(alias)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.find_by_alias(alias)))
    }

    pub fn find_local_by_alias(&self, alias: &str) -> Option<&TableGroupRef> {
        self.aliases.get(alias).and_then(|path| self.table_groups.get(path))
    }

    pub fn register_fetch(&mut self, path: NavigablePath) {
        if !self.fetched_paths.contains(&path) {
            self.fetched_paths.push(path);
        }
    }

    pub fn fetched_paths(&self) -> &[NavigablePath] {
        &self.fetched_paths
    }
}
