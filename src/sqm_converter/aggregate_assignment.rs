//! UPDATE post-pass merging sub-column assignments of an aggregate column
//! into one composite write.
//!
//! ```text
//! set p.address.city = ?, p.name = ?, p.address.zip = ?
//!   → set address_data = write(city = ?, zip = ?), name = ?
//! ```
//!
//! Collection keys each assignment on the root aggregate owning its first
//! target column. Rewrite emits one `AggregateColumnWrite` per aggregate at
//! the position of its first member and drops the other members.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::domain_catalog::domain_model::EntityDescriptor;
use crate::sql_ast::expression::Expression;
use crate::sql_ast::statement::Assignment;

use super::errors::LoweringError;
use super::from_clause::column_reference;
use super::from_clause_index::TableGroupRef;

pub struct AggregateColumnAssignmentHandler<'e> {
    entity: &'e EntityDescriptor,
    /// root aggregate index → positions of its member assignments
    aggregate_positions: IndexMap<usize, BTreeSet<usize>>,
}

impl<'e> AggregateColumnAssignmentHandler<'e> {
    /// `None` when no assignment targets an aggregate that needs a writer.
    pub fn for_update(entity: &'e EntityDescriptor, assignments: &[Assignment]) -> Option<Self> {
        let aggregates = entity.root_aggregates();
        let mut aggregate_positions: IndexMap<usize, BTreeSet<usize>> = IndexMap::new();

        for (position, assignment) in assignments.iter().enumerate() {
            let Some(first) = assignment.assignable.first() else {
                continue;
            };
            let Some(index) = entity.find_aggregate_index(&first.selectable_path) else {
                continue;
            };
            if aggregates
                .get(index)
                .is_some_and(|aggregate| aggregate.requires_aggregate_column_writer)
            {
                aggregate_positions.entry(index).or_default().insert(position);
            }
        }

        if aggregate_positions.is_empty() {
            None
        } else {
            Some(AggregateColumnAssignmentHandler {
                entity,
                aggregate_positions,
            })
        }
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregate_positions.len()
    }

    /// Assignment positions recorded for each aggregate, in discovery order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeSet<usize>)> {
        let aggregates = self.entity.root_aggregates();
        self.aggregate_positions.iter().filter_map(move |(index, positions)| {
            aggregates
                .get(*index)
                .map(|aggregate| (aggregate.attribute_name.as_str(), positions))
        })
    }

    /// Length of the rewritten assignment list.
    pub fn rewritten_len(&self, original_len: usize) -> usize {
        let merged: usize = self
            .aggregate_positions
            .values()
            .map(|positions| positions.len().saturating_sub(1))
            .sum();
        original_len - merged
    }

    pub fn rewrite(&self, assignments: Vec<Assignment>, target: &TableGroupRef) -> Result<Vec<Assignment>, LoweringError> {
        let original_len = assignments.len();
        let aggregates = self.entity.root_aggregates();
        let mut slots: Vec<Option<Assignment>> = assignments.into_iter().map(Some).collect();
        // first consumed position → synthetic assignment
        let mut replacements: IndexMap<usize, Assignment> = IndexMap::new();

        for (index, positions) in &self.aggregate_positions {
            let aggregate = aggregates.get(*index).ok_or_else(|| {
                LoweringError::internal(format!(
                    "root aggregate {} missing from entity `{}`",
                    index, self.entity.name
                ))
            })?;

            let mut column_references = Vec::new();
            let mut values = Vec::new();
            for position in positions {
                let assignment = slots.get_mut(*position).and_then(Option::take).ok_or_else(|| {
                    LoweringError::internal(format!("assignment {} consumed by more than one aggregate", position))
                })?;
                let assigned_values = assignment.assigned_value.into_columns();
                if assigned_values.len() != assignment.assignable.len() {
                    return Err(LoweringError::conversion(format!(
                        "aggregate `{}` cannot take a value spanning {} column(s) for {} sub-column(s)",
                        aggregate.attribute_name,
                        assigned_values.len(),
                        assignment.assignable.len()
                    )));
                }
                column_references.extend(assignment.assignable);
                values.extend(assigned_values);
            }

            let aggregate_column = column_reference(target.qualifier_for(&aggregate.column)?, &aggregate.column);
            let first = positions
                .first()
                .copied()
                .ok_or_else(|| LoweringError::internal("empty aggregate assignment group"))?;
            log::debug!(
                "Merged {} assignment(s) into a write of aggregate column `{}`",
                positions.len(),
                aggregate_column.column_name
            );
            replacements.insert(
                first,
                Assignment {
                    assignable: vec![aggregate_column.clone()],
                    assigned_value: Expression::AggregateColumnWrite {
                        aggregate_column,
                        column_references,
                        values,
                    },
                },
            );
        }

        let rewritten: Vec<Assignment> = slots
            .into_iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.or_else(|| replacements.swap_remove(&position)))
            .collect();
        debug_assert_eq!(rewritten.len(), self.rewritten_len(original_len));
        Ok(rewritten)
    }
}
