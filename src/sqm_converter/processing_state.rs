//! Context stacks carried through one translation.

use std::collections::HashMap;

use crate::sql_ast::expression::Expression;
use crate::sql_ast::statement::QuerySpec;
use crate::sqm::navigable_path::NavigablePath;

/// Growable stack used for every piece of nested lowering context.
#[derive(Debug, Clone)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Stack { items: Vec::new() }
    }
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn current(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    /// Element by absolute position, 0 being the bottom of the stack
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Where the current expression sits. Anything but `None` means only the
/// identifying columns of an entity are selected and fetches are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shallowness {
    #[default]
    None,
    /// Argument of a dynamic instantiation
    Ctor,
    /// Argument of a function
    Function,
    /// Inside a subquery
    Subquery,
}

/// One frame per query spec being lowered.
#[derive(Debug)]
pub struct ProcessingState {
    pub query_spec: QuerySpec,
    /// Lowered attribute paths of this query spec
    pub expression_cache: HashMap<NavigablePath, Expression>,
    pub deduplicate_selections: bool,
}

impl ProcessingState {
    pub fn new(query_spec: QuerySpec, deduplicate_selections: bool) -> Self {
        ProcessingState {
            query_spec,
            expression_cache: HashMap::new(),
            deduplicate_selections,
        }
    }

    /// Adds a selection, reusing an identical earlier one when
    /// de-duplication is on. Returns the selection position.
    pub fn add_selection(&mut self, expression: Expression, alias: Option<String>) -> usize {
        let select_clause = &mut self.query_spec.select_clause;
        if self.deduplicate_selections {
            if let Some(position) = select_clause.find_selection(&expression) {
                return position;
            }
        }
        select_clause.add_sql_selection(expression, alias)
    }
}

/// Stack depths, for asserting balance around a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextDepths {
    pub processing_states: usize,
    pub clauses: usize,
    pub shallowness: usize,
    pub inferred_types: usize,
}
