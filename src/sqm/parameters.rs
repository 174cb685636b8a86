//! Domain parameters, their bindings and the occurrence cross-reference.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::tree::SqmStatement;
use super::walker;
use crate::domain_catalog::value_mapping::{JdbcType, ValueMapping};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKey {
    Named(String),
    Positional(u32),
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKey::Named(name) => write!(f, ":{}", name),
            ParameterKey::Positional(position) => write!(f, "?{}", position),
        }
    }
}

/// Identity of one parameter occurrence in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqmParameterId(pub u32);

impl fmt::Display for SqmParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One occurrence of a domain parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqmParameter {
    pub id: SqmParameterId,
    pub key: ParameterKey,
    /// Type declared by the query author, e.g. through a cast
    #[serde(default)]
    pub anticipated_type: Option<ValueMapping>,
    #[serde(default)]
    pub allow_multi_valued: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindValue {
    Single(serde_json::Value),
    Multi(Vec<serde_json::Value>),
}

/// User-supplied value(s) for one parameter key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameterBinding {
    /// Type declared when binding, e.g. `setParameter(name, value, type)`
    #[serde(default)]
    pub bind_type: Option<ValueMapping>,
    pub value: BindValue,
}

impl QueryParameterBinding {
    pub fn single(value: serde_json::Value) -> Self {
        QueryParameterBinding {
            bind_type: None,
            value: BindValue::Single(value),
        }
    }

    pub fn multi(values: Vec<serde_json::Value>) -> Self {
        QueryParameterBinding {
            bind_type: None,
            value: BindValue::Multi(values),
        }
    }

    pub fn with_type(mut self, bind_type: ValueMapping) -> Self {
        self.bind_type = Some(bind_type);
        self
    }

    pub fn is_multi_valued(&self) -> bool {
        matches!(self.value, BindValue::Multi(_))
    }

    pub fn values(&self) -> Vec<&serde_json::Value> {
        match &self.value {
            BindValue::Single(value) => vec![value],
            BindValue::Multi(values) => values.iter().collect(),
        }
    }

    /// Declared bind type, else the JSON type of the first non-null value.
    pub fn inferred_mapping(&self) -> Option<ValueMapping> {
        if let Some(bind_type) = &self.bind_type {
            return Some(bind_type.clone());
        }
        self.values()
            .into_iter()
            .find_map(JdbcType::from_json_value)
            .map(ValueMapping::basic)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParameterBindings {
    bindings: HashMap<ParameterKey, QueryParameterBinding>,
}

impl QueryParameterBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, key: ParameterKey, binding: QueryParameterBinding) {
        self.bindings.insert(key, binding);
    }

    pub fn with_named(mut self, name: &str, binding: QueryParameterBinding) -> Self {
        self.bind(ParameterKey::Named(name.to_string()), binding);
        self
    }

    pub fn with_positional(mut self, position: u32, binding: QueryParameterBinding) -> Self {
        self.bind(ParameterKey::Positional(position), binding);
        self
    }

    pub fn binding(&self, key: &ParameterKey) -> Option<&QueryParameterBinding> {
        self.bindings.get(key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// On-disk form of a binding set.
///
/// ```json
/// { "named": { "ids": { "value": { "multi": [1, 2] } } },
///   "positional": { "1": { "value": { "single": "Ann" } } } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsDocument {
    pub named: IndexMap<String, QueryParameterBinding>,
    pub positional: IndexMap<u32, QueryParameterBinding>,
}

impl From<BindingsDocument> for QueryParameterBindings {
    fn from(document: BindingsDocument) -> Self {
        let mut bindings = QueryParameterBindings::new();
        for (name, binding) in document.named {
            bindings.bind(ParameterKey::Named(name), binding);
        }
        for (position, binding) in document.positional {
            bindings.bind(ParameterKey::Positional(position), binding);
        }
        bindings
    }
}

/// Cross-reference of parameter keys to their occurrences in one statement.
///
/// IN-list flattening clones occurrences; clones are registered here as
/// expansions so a re-translation can clear them and expand again for a
/// different collection size.
#[derive(Debug, Clone, Default)]
pub struct DomainParameterXref {
    occurrences: IndexMap<ParameterKey, Vec<SqmParameter>>,
    by_id: HashMap<SqmParameterId, ParameterKey>,
    expansions: IndexMap<SqmParameterId, Vec<SqmParameter>>,
    // u64 so the successor of u32::MAX is representable
    first_free_id: u64,
    next_id: u64,
}

impl DomainParameterXref {
    pub fn from_statement(statement: &SqmStatement) -> Self {
        let mut xref = DomainParameterXref::default();
        let mut max_id = 0u64;
        for parameter in walker::collect_parameters(statement) {
            max_id = max_id.max(u64::from(parameter.id.0) + 1);
            if xref.by_id.insert(parameter.id, parameter.key.clone()).is_some() {
                log::warn!("Parameter occurrence {} appears more than once in the tree", parameter.id);
            }
            xref.occurrences
                .entry(parameter.key.clone())
                .or_default()
                .push(parameter.clone());
        }
        xref.first_free_id = max_id;
        xref.next_id = max_id;
        log::debug!(
            "Parameter xref: {} key(s), {} occurrence(s)",
            xref.occurrences.len(),
            xref.by_id.len()
        );
        xref
    }

    /// Key of a known occurrence (original or expansion)
    pub fn query_parameter(&self, id: SqmParameterId) -> Option<&ParameterKey> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: SqmParameterId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParameterKey> {
        self.occurrences.keys()
    }

    pub fn occurrences(&self, key: &ParameterKey) -> &[SqmParameter] {
        self.occurrences.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn occurrence_count(&self) -> usize {
        self.by_id.len()
    }

    /// Allocate an id for a cloned occurrence; `None` once the id space is
    /// exhausted.
    pub fn next_parameter_id(&mut self) -> Option<SqmParameterId> {
        let id = u32::try_from(self.next_id).ok()?;
        self.next_id += 1;
        Some(SqmParameterId(id))
    }

    pub fn add_expansion(&mut self, original: &SqmParameter, expansion: SqmParameter) {
        self.by_id.insert(expansion.id, original.key.clone());
        self.expansions.entry(original.id).or_default().push(expansion);
    }

    pub fn expansions_of(&self, id: SqmParameterId) -> &[SqmParameter] {
        self.expansions.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_expansions(&self) -> bool {
        !self.expansions.is_empty()
    }

    /// Forget all expansions so the statement can be translated again.
    pub fn clear_expansions(&mut self) {
        for expansion in self.expansions.values().flatten() {
            self.by_id.remove(&expansion.id);
        }
        self.expansions.clear();
        self.next_id = self.first_free_id;
    }
}
