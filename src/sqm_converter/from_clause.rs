//! FROM-clause consumption and implicit join creation.
//!
//! Roots are consumed first, then each root's explicit joins depth-first,
//! then its implicit joins. Restrictions of roots and of INNER or CROSS
//! joins are returned to the caller for the WHERE clause; LEFT joins keep
//! theirs in the join predicate so they do not filter out outer rows.

use crate::domain_catalog::domain_model::{AttributeDescriptor, AttributeKind, ColumnMapping, EntityDescriptor};
use crate::sql_ast::expression::{ColumnReference, Expression};
use crate::sql_ast::predicate::{combine_predicates, conjunction, Predicate};
use crate::sql_ast::table_group::{SqlAstJoinType, TableGroup, TableGroupJoin, TableReference, TableReferenceJoin};
use crate::sql_ast::statement::Clause;
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::query_options::LockMode;
use crate::sqm::tree::{SqmFromClause, SqmImplicitJoin, SqmJoin, SqmJoinKind, SqmJoinType, SqmRoot, SqmRootSource};

use super::errors::LoweringError;
use super::from_clause_index::{GroupSource, TableGroupRef};
use super::processing_state::Shallowness;
use super::sql_alias::{stem_from_attribute_name, stem_from_entity_name};
use super::SqmToSqlAstConverter;

impl<'a> SqmToSqlAstConverter<'a> {
    /// Consumes every root of `from` into the current query spec and
    /// returns the restrictions that belong in its WHERE clause.
    pub(crate) fn consume_from_clause(&mut self, from: &'a SqmFromClause) -> Result<Vec<Predicate>, LoweringError> {
        self.with_clause(Clause::From, |converter| {
            let mut restrictions = Vec::new();
            for root in &from.roots {
                converter.consume_root(root, &mut restrictions)?;
            }
            Ok(restrictions)
        })
    }

    pub(crate) fn consume_root(
        &mut self,
        root: &'a SqmRoot,
        restrictions: &mut Vec<Predicate>,
    ) -> Result<TableGroupRef, LoweringError> {
        let (group, source) = match &root.source {
            SqmRootSource::Entity { entity_name } => {
                let entity = self.metadata.entity(entity_name)?;
                let group = self.create_entity_table_group(&root.navigable_path, entity, true);
                if let Some(restriction) = entity_restriction(entity, &group.primary_table_reference) {
                    restrictions.push(restriction);
                }
                (group, GroupSource::Entity(entity.name.clone()))
            }
            SqmRootSource::Cte { cte_name } => {
                let group = self.create_cte_table_group(&root.navigable_path, cte_name)?;
                (group, GroupSource::Cte(cte_name.clone()))
            }
        };

        let group_ref = TableGroupRef::of(&group, source);
        log::debug!(
            "Root {} → {} ({})",
            root.navigable_path,
            group_ref.primary_alias,
            group_ref.primary_table
        );
        self.current_query_spec_mut()?.from_clause.add_root(group);
        self.from_clause_index.register(group_ref.clone());

        for join in &root.joins {
            self.consume_explicit_join(join, &group_ref, restrictions)?;
        }
        self.consume_implicit_joins(&root.implicit_joins, &group_ref, restrictions)?;
        Ok(group_ref)
    }

    fn consume_explicit_join(
        &mut self,
        join: &'a SqmJoin,
        parent: &TableGroupRef,
        restrictions: &mut Vec<Predicate>,
    ) -> Result<(), LoweringError> {
        if self.from_clause_index.find_local(&join.navigable_path).is_some() {
            return Err(LoweringError::internal(format!(
                "explicit join path {} was already resolved",
                join.navigable_path
            )));
        }

        let join_type = sql_join_type(join.join_type);
        let inner_capable = parent.can_use_inner_joins && join_type != SqlAstJoinType::Left;
        let (mut group, entity, base_predicate, join_type) = match &join.kind {
            SqmJoinKind::Attribute => {
                let owner = self.group_entity(parent)?;
                let attribute = owner.attribute(join.navigable_path.local_name())?;
                let target = self.join_target(owner, attribute)?;
                let group = self.create_entity_table_group(&join.navigable_path, target, inner_capable);
                let target_ref = TableGroupRef::of(&group, GroupSource::Entity(target.name.clone()));
                let predicate = self.association_join_predicate(parent, attribute, &target_ref)?;
                (group, target, predicate, join_type)
            }
            SqmJoinKind::Cross { entity_name } => {
                let target = self.metadata.entity(entity_name)?;
                let group = self.create_entity_table_group(&join.navigable_path, target, parent.can_use_inner_joins);
                (group, target, None, SqlAstJoinType::Cross)
            }
            SqmJoinKind::Entity { entity_name } => {
                let target = self.metadata.entity(entity_name)?;
                let group = self.create_entity_table_group(&join.navigable_path, target, inner_capable);
                (group, target, None, join_type)
            }
        };

        // WHERE may only carry the restriction when no outer join sits
        // between this group and its root.
        let restriction = entity_restriction(entity, &group.primary_table_reference);
        let on_restriction = match restriction {
            Some(restriction) if group.can_use_inner_joins => {
                restrictions.push(restriction);
                None
            }
            restriction => restriction,
        };

        if join.fetched {
            if self.is_top_level_select() && self.current_shallowness() == Shallowness::None {
                group.fetched = true;
                self.from_clause_index.register_fetch(join.navigable_path.clone());
            } else {
                log::debug!("Fetch of {} ignored outside the top-level selection", join.navigable_path);
            }
        }

        let group_ref = TableGroupRef::of(&group, GroupSource::Entity(entity.name.clone()));
        log::debug!(
            "{:?} join {} → {} ({})",
            join_type,
            join.navigable_path,
            group_ref.primary_alias,
            group_ref.primary_table
        );
        self.attach_join(
            parent,
            TableGroupJoin {
                navigable_path: join.navigable_path.clone(),
                join_type,
                joined_group: group,
                predicate: base_predicate,
                implicit: false,
            },
        )?;
        self.from_clause_index.register(group_ref.clone());

        // The ON clause may navigate through the joined group, so it is
        // lowered only once the group is attached and registered.
        let on_predicate = match &join.on_clause {
            Some(on_clause) => Some(self.lower_predicate(on_clause)?),
            None => None,
        };
        if on_predicate.is_some() || on_restriction.is_some() {
            let state = self.current_state_mut()?;
            let table_group_join = state
                .query_spec
                .from_clause
                .find_join_mut(&join.navigable_path)
                .ok_or_else(|| LoweringError::internal(format!("join {} vanished", join.navigable_path)))?;
            let predicate = combine_predicates(table_group_join.predicate.take(), on_predicate);
            table_group_join.predicate = combine_predicates(predicate, on_restriction);
        }

        for nested in &join.joins {
            self.consume_explicit_join(nested, &group_ref, restrictions)?;
        }
        self.consume_implicit_joins(&join.implicit_joins, &group_ref, restrictions)
    }

    fn consume_implicit_joins(
        &mut self,
        joins: &'a [SqmImplicitJoin],
        parent: &TableGroupRef,
        restrictions: &mut Vec<Predicate>,
    ) -> Result<(), LoweringError> {
        for implicit in joins {
            let group_ref = match self.from_clause_index.find_local(&implicit.navigable_path) {
                Some(existing) => existing.clone(),
                None => self.create_implicit_join(parent, &implicit.navigable_path, Some(&mut *restrictions))?,
            };
            self.consume_implicit_joins(&implicit.implicit_joins, &group_ref, restrictions)?;
        }
        Ok(())
    }

    /// Table group for `path`, creating implicit joins for every
    /// unresolved segment.
    pub(crate) fn resolve_table_group(&mut self, path: &NavigablePath) -> Result<TableGroupRef, LoweringError> {
        if let Some(group) = self.from_clause_index.find(path) {
            return Ok(group.clone());
        }
        let parent_path = path
            .parent()
            .ok_or_else(|| LoweringError::conversion(format!("`{}` does not name a from-element", path)))?;
        let parent = self.resolve_table_group(&parent_path)?;
        self.create_implicit_join(&parent, path, None)
    }

    /// Joins the association `path` to `parent`. The join lands in the
    /// query spec and registry scope that own `parent`. With
    /// `restrictions`, an INNER join hands its entity restriction to the
    /// caller; otherwise the restriction goes into the join predicate.
    fn create_implicit_join(
        &mut self,
        parent: &TableGroupRef,
        path: &NavigablePath,
        restrictions: Option<&mut Vec<Predicate>>,
    ) -> Result<TableGroupRef, LoweringError> {
        let owner = self.group_entity(parent)?;
        let attribute = owner.attribute(path.local_name())?;
        let target = self.join_target(owner, attribute)?;
        let join_type = if parent.can_use_inner_joins {
            SqlAstJoinType::Inner
        } else {
            SqlAstJoinType::Left
        };

        let group = self.create_entity_table_group(path, target, join_type == SqlAstJoinType::Inner);
        let group_ref = TableGroupRef::of(&group, GroupSource::Entity(target.name.clone()));
        let mut predicate = self.association_join_predicate(parent, attribute, &group_ref)?;
        if let Some(restriction) = entity_restriction(target, &group.primary_table_reference) {
            match (join_type, restrictions) {
                (SqlAstJoinType::Inner, Some(restrictions)) => restrictions.push(restriction),
                _ => predicate = combine_predicates(predicate, Some(restriction)),
            }
        }

        log::debug!(
            "Implicit {:?} join {} → {} ({})",
            join_type,
            path,
            group_ref.primary_alias,
            group_ref.primary_table
        );
        let depth = self.attach_join(
            parent,
            TableGroupJoin {
                navigable_path: path.clone(),
                join_type,
                joined_group: group,
                predicate,
                implicit: true,
            },
        )?;
        self.from_clause_index.register_at_depth(depth, group_ref.clone())?;
        Ok(group_ref)
    }

    /// Adds `join` under `parent` in whichever frame owns `parent`.
    /// Returns the registry depth of that frame.
    fn attach_join(&mut self, parent: &TableGroupRef, join: TableGroupJoin) -> Result<usize, LoweringError> {
        let depth = self
            .from_clause_index
            .owner_depth(&parent.navigable_path)
            .ok_or_else(|| LoweringError::internal(format!("{} is not registered", parent.navigable_path)))?;
        let frames = self.processing_states.depth();
        if self.from_clause_index.scope_depth() + 1 != frames {
            return Err(LoweringError::internal(format!(
                "registry scopes ({}) out of step with query specs ({})",
                self.from_clause_index.scope_depth() + 1,
                frames
            )));
        }
        let frame = frames
            .checked_sub(depth + 1)
            .and_then(|index| self.processing_states.get_mut(index))
            .ok_or_else(|| LoweringError::internal(format!("no query spec owns {}", parent.navigable_path)))?;
        let owner = frame
            .query_spec
            .from_clause
            .find_table_group_mut(&parent.navigable_path)
            .ok_or_else(|| {
                LoweringError::internal(format!("table group {} missing from its query spec", parent.navigable_path))
            })?;
        owner.add_join(join);
        Ok(depth)
    }

    pub(crate) fn create_entity_table_group(
        &mut self,
        path: &NavigablePath,
        entity: &EntityDescriptor,
        can_use_inner_joins: bool,
    ) -> TableGroup {
        let stem = if path.is_root() {
            stem_from_entity_name(&entity.name)
        } else {
            stem_from_attribute_name(path.local_name())
        };
        let mut alias_base = self.alias_manager.create_alias_base(&stem);
        let primary = TableReference {
            table_expression: entity.table_name.clone(),
            identification_variable: alias_base.generate_new_alias(),
        };

        let identifier_columns = entity.identifier_columns();
        let table_reference_joins = entity
            .secondary_tables
            .iter()
            .map(|secondary| {
                let table_reference = TableReference {
                    table_expression: secondary.table_name.clone(),
                    identification_variable: alias_base.generate_new_alias(),
                };
                let predicate = conjunction(
                    identifier_columns
                        .iter()
                        .zip(&secondary.key_columns)
                        .map(|(id_column, key_column)| {
                            Predicate::equal(
                                column_reference(&primary.identification_variable, id_column).into(),
                                ColumnReference {
                                    qualifier: table_reference.identification_variable.clone(),
                                    column_name: key_column.clone(),
                                    jdbc_mapping: id_column.jdbc_mapping.clone(),
                                    selectable_path: id_column.selectable_path.clone(),
                                    aggregate_column: None,
                                }
                                .into(),
                            )
                        })
                        .collect(),
                );
                TableReferenceJoin {
                    join_type: if secondary.optional {
                        SqlAstJoinType::Left
                    } else {
                        SqlAstJoinType::Inner
                    },
                    table_reference,
                    predicate,
                }
            })
            .collect();

        self.affected_table_names
            .extend(entity.table_names().into_iter().map(str::to_string));

        TableGroup {
            navigable_path: path.clone(),
            group_alias: alias_base.alias_stem().to_string(),
            source_alias: path.alias().map(str::to_string),
            model_name: entity.name.clone(),
            primary_table_reference: primary,
            table_reference_joins,
            table_group_joins: Vec::new(),
            can_use_inner_joins,
            fetched: false,
            lock_mode: LockMode::None,
        }
    }

    fn create_cte_table_group(&mut self, path: &NavigablePath, cte_name: &str) -> Result<TableGroup, LoweringError> {
        if !self.cte_shapes.contains_key(cte_name) {
            return Err(LoweringError::conversion(format!(
                "CTE `{}` is referenced before it is defined",
                cte_name
            )));
        }
        let mut alias_base = self.alias_manager.create_alias_base(&stem_from_entity_name(cte_name));
        Ok(TableGroup {
            navigable_path: path.clone(),
            group_alias: alias_base.alias_stem().to_string(),
            source_alias: path.alias().map(str::to_string),
            model_name: cte_name.to_string(),
            primary_table_reference: TableReference {
                table_expression: cte_name.to_string(),
                identification_variable: alias_base.generate_new_alias(),
            },
            table_reference_joins: Vec::new(),
            table_group_joins: Vec::new(),
            can_use_inner_joins: true,
            fetched: false,
            lock_mode: LockMode::None,
        })
    }

    /// Entity descriptor behind a table group.
    pub(crate) fn group_entity(&self, group: &TableGroupRef) -> Result<&'a EntityDescriptor, LoweringError> {
        match &group.source {
            GroupSource::Entity(entity_name) => Ok(self.metadata.entity(entity_name)?),
            GroupSource::Cte(cte_name) => Err(LoweringError::not_yet_implemented(format!(
                "navigating associations of CTE `{}`",
                cte_name
            ))),
        }
    }

    fn join_target(
        &self,
        owner: &EntityDescriptor,
        attribute: &AttributeDescriptor,
    ) -> Result<&'a EntityDescriptor, LoweringError> {
        let target = attribute.target_entity().ok_or_else(|| {
            LoweringError::conversion(format!(
                "attribute `{}` of `{}` is not an association and cannot be joined",
                attribute.name, owner.name
            ))
        })?;
        Ok(self.metadata.entity(target)?)
    }

    /// Equi-join between the owner and the association target.
    fn association_join_predicate(
        &self,
        owner: &TableGroupRef,
        attribute: &AttributeDescriptor,
        target: &TableGroupRef,
    ) -> Result<Option<Predicate>, LoweringError> {
        let owner_entity = self.group_entity(owner)?;
        let target_entity = self.group_entity(target)?;
        let pairs: Vec<(ColumnReference, ColumnReference)> = match &attribute.kind {
            AttributeKind::ToOne { fk_columns, .. } => {
                let target_ids = target_entity.identifier_columns();
                if fk_columns.len() != target_ids.len() {
                    return Err(LoweringError::conversion(format!(
                        "`{}.{}` has {} foreign key column(s) but `{}` has {} identifier column(s)",
                        owner_entity.name,
                        attribute.name,
                        fk_columns.len(),
                        target_entity.name,
                        target_ids.len()
                    )));
                }
                let mut pairs = Vec::with_capacity(fk_columns.len());
                for (fk, id) in fk_columns.iter().zip(&target_ids) {
                    pairs.push((
                        column_reference(owner.qualifier_for(fk)?, fk),
                        column_reference(target.qualifier_for(id)?, id),
                    ));
                }
                pairs
            }
            AttributeKind::ToMany { key_columns, .. } => {
                let owner_ids = owner_entity.identifier_columns();
                if key_columns.len() != owner_ids.len() {
                    return Err(LoweringError::conversion(format!(
                        "`{}.{}` has {} key column(s) but `{}` has {} identifier column(s)",
                        owner_entity.name,
                        attribute.name,
                        key_columns.len(),
                        owner_entity.name,
                        owner_ids.len()
                    )));
                }
                let mut pairs = Vec::with_capacity(key_columns.len());
                for (id, key) in owner_ids.iter().zip(key_columns) {
                    let key_column = ColumnMapping::new(key.as_str(), id.jdbc_mapping.clone(), attribute.name.clone());
                    pairs.push((
                        column_reference(owner.qualifier_for(id)?, id),
                        column_reference(&target.primary_alias, &key_column),
                    ));
                }
                pairs
            }
            AttributeKind::Basic { .. } | AttributeKind::Embedded { .. } => {
                return Err(LoweringError::conversion(format!(
                    "attribute `{}` of `{}` is not an association",
                    attribute.name, owner_entity.name
                )))
            }
        };
        Ok(conjunction(
            pairs
                .into_iter()
                .map(|(left, right)| Predicate::equal(left.into(), right.into()))
                .collect(),
        ))
    }

    /// Lock modes of the top-level query spec: alias-specific ones first,
    /// then the default for every root still unlocked.
    pub(crate) fn apply_lock_modes(&mut self) -> Result<(), LoweringError> {
        let lock_options = &self.options.lock_options;
        if lock_options.is_empty() {
            return Ok(());
        }
        let mut locked = Vec::new();
        for (alias, lock_mode) in &lock_options.alias_specific {
            match self.from_clause_index.find_local_by_alias(alias) {
                Some(group) => locked.push((group.navigable_path.clone(), *lock_mode)),
                None => log::debug!("Lock mode {} requested for unknown alias `{}`", lock_mode, alias),
            }
        }
        let default_mode = lock_options.lock_mode;

        let query_spec = self.current_query_spec_mut()?;
        for (path, lock_mode) in locked {
            if let Some(group) = query_spec.from_clause.find_table_group_mut(&path) {
                group.lock_mode = lock_mode;
            }
        }
        if !default_mode.is_none() {
            for root in &mut query_spec.from_clause.roots {
                if root.lock_mode.is_none() {
                    root.lock_mode = default_mode;
                }
            }
        }
        Ok(())
    }
}

fn sql_join_type(join_type: SqmJoinType) -> SqlAstJoinType {
    match join_type {
        SqmJoinType::Inner => SqlAstJoinType::Inner,
        SqmJoinType::Left => SqlAstJoinType::Left,
        SqmJoinType::Cross => SqlAstJoinType::Cross,
    }
}

fn entity_restriction(entity: &EntityDescriptor, primary: &TableReference) -> Option<Predicate> {
    entity.restriction.as_ref().map(|sql| Predicate::SqlFragment {
        sql: sql.clone(),
        qualifier: primary.identification_variable.clone(),
    })
}

pub(crate) fn column_reference(qualifier: &str, column: &ColumnMapping) -> ColumnReference {
    ColumnReference {
        qualifier: qualifier.to_string(),
        column_name: column.column_name.clone(),
        jdbc_mapping: column.jdbc_mapping.clone(),
        selectable_path: column.selectable_path.clone(),
        aggregate_column: column.aggregate_column.clone(),
    }
}

/// Identifier columns of `entity`, qualified by `group`.
pub(crate) fn identifier_reference(
    group: &TableGroupRef,
    entity: &EntityDescriptor,
) -> Result<Vec<Expression>, LoweringError> {
    entity
        .identifier_columns()
        .iter()
        .map(|column| Ok(column_reference(group.qualifier_for(column)?, column).into()))
        .collect()
}
