//! Table groups: one or more physical tables reachable under one alias stem.

use serde::Serialize;

use super::predicate::Predicate;
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::query_options::LockMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlAstJoinType {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReference {
    pub table_expression: String,
    pub identification_variable: String,
}

/// Secondary table joined to the group's primary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReferenceJoin {
    pub join_type: SqlAstJoinType,
    pub table_reference: TableReference,
    pub predicate: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableGroupJoin {
    pub navigable_path: NavigablePath,
    pub join_type: SqlAstJoinType,
    pub joined_group: TableGroup,
    pub predicate: Option<Predicate>,
    /// Created by attribute navigation rather than explicit join syntax
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableGroup {
    pub navigable_path: NavigablePath,
    /// Alias stem shared by the group's tables, e.g. `e1`
    pub group_alias: String,
    /// Identification variable from the query, if any
    pub source_alias: Option<String>,
    /// Entity or CTE name
    pub model_name: String,
    pub primary_table_reference: TableReference,
    pub table_reference_joins: Vec<TableReferenceJoin>,
    pub table_group_joins: Vec<TableGroupJoin>,
    pub can_use_inner_joins: bool,
    pub fetched: bool,
    #[serde(skip_serializing_if = "LockMode::is_none")]
    pub lock_mode: LockMode,
}

impl TableGroup {
    pub fn find_mut(&mut self, path: &NavigablePath) -> Option<&mut TableGroup> {
        if &self.navigable_path == path {
            return Some(self);
        }
        for join in &mut self.table_group_joins {
            if let Some(found) = join.joined_group.find_mut(path) {
                return Some(found);
            }
        }
        None
    }

    pub fn find(&self, path: &NavigablePath) -> Option<&TableGroup> {
        if &self.navigable_path == path {
            return Some(self);
        }
        self.table_group_joins
            .iter()
            .find_map(|join| join.joined_group.find(path))
    }

    pub fn find_join(&self, path: &NavigablePath) -> Option<&TableGroupJoin> {
        for join in &self.table_group_joins {
            if &join.navigable_path == path {
                return Some(join);
            }
            if let Some(found) = join.joined_group.find_join(path) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_join_mut(&mut self, path: &NavigablePath) -> Option<&mut TableGroupJoin> {
        for join in &mut self.table_group_joins {
            if &join.navigable_path == path {
                return Some(join);
            }
            if let Some(found) = join.joined_group.find_join_mut(path) {
                return Some(found);
            }
        }
        None
    }

    pub fn add_join(&mut self, join: TableGroupJoin) {
        self.table_group_joins.push(join);
    }

    /// Depth-first walk over this group and every joined group.
    pub fn visit<'g>(&'g self, visitor: &mut dyn FnMut(&'g TableGroup)) {
        visitor(self);
        for join in &self.table_group_joins {
            join.joined_group.visit(visitor);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FromClause {
    pub roots: Vec<TableGroup>,
}

impl FromClause {
    pub fn add_root(&mut self, root: TableGroup) {
        self.roots.push(root);
    }

    pub fn find_table_group(&self, path: &NavigablePath) -> Option<&TableGroup> {
        self.roots.iter().find_map(|root| root.find(path))
    }

    pub fn find_table_group_mut(&mut self, path: &NavigablePath) -> Option<&mut TableGroup> {
        for root in &mut self.roots {
            if let Some(found) = root.find_mut(path) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_join(&self, path: &NavigablePath) -> Option<&TableGroupJoin> {
        self.roots.iter().find_map(|root| root.find_join(path))
    }

    pub fn find_join_mut(&mut self, path: &NavigablePath) -> Option<&mut TableGroupJoin> {
        for root in &mut self.roots {
            if let Some(found) = root.find_join_mut(path) {
                return Some(found);
            }
        }
        None
    }

    /// Every table group, roots and joins, depth-first.
    pub fn table_groups(&self) -> Vec<&TableGroup> {
        let mut groups = Vec::new();
        for root in &self.roots {
            root.visit(&mut |group| groups.push(group));
        }
        groups
    }
}
