//! Entity and attribute descriptors.
//!
//! [`MetadataResolver`] is the descriptor service the converter consults for
//! relational shapes: tables, columns and join conditions. [`DomainModel`]
//! is the in-memory implementation, usually loaded from YAML (see
//! [`super::config`]).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::errors::DomainModelError;
use super::value_mapping::{JdbcMapping, ValueMapping};

/// One physical column backing (part of) an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Owning table; `None` means the entity's primary table
    #[serde(default)]
    pub table_name: Option<String>,
    pub column_name: String,
    pub jdbc_mapping: JdbcMapping,
    /// Attribute path relative to the entity, e.g. `address.city`
    pub selectable_path: String,
    /// Structured column this value is encoded into, if any
    #[serde(default)]
    pub aggregate_column: Option<String>,
}

impl ColumnMapping {
    pub fn new(
        column_name: impl Into<String>,
        jdbc_mapping: impl Into<JdbcMapping>,
        selectable_path: impl Into<String>,
    ) -> Self {
        ColumnMapping {
            table_name: None,
            column_name: column_name.into(),
            jdbc_mapping: jdbc_mapping.into(),
            selectable_path: selectable_path.into(),
            aggregate_column: None,
        }
    }

    pub fn in_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }
}

/// A structured column that stores an embeddable as one composite value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateColumnDescriptor {
    /// Embedded attribute encoded into this column
    pub attribute_name: String,
    pub column: ColumnMapping,
    /// Whether updates must rewrite the whole column instead of writing
    /// sub-columns individually
    pub requires_aggregate_column_writer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Basic {
        column: ColumnMapping,
    },
    Embedded {
        embeddable: String,
        columns: Vec<ColumnMapping>,
        aggregate: Option<AggregateColumnDescriptor>,
    },
    /// Many-to-one / one-to-one through foreign key columns on the owner
    ToOne {
        target_entity: String,
        fk_columns: Vec<ColumnMapping>,
        optional: bool,
    },
    /// One-to-many through key columns on the target's primary table
    ToMany {
        target_entity: String,
        key_columns: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn basic(name: impl Into<String>, column: impl Into<String>, jdbc: impl Into<JdbcMapping>) -> Self {
        let name = name.into();
        AttributeDescriptor {
            kind: AttributeKind::Basic {
                column: ColumnMapping::new(column, jdbc, name.clone()),
            },
            name,
        }
    }

    /// Embeddable stored as plain columns. `sub_columns` are
    /// `(sub-attribute, column, jdbc)` triples.
    pub fn embedded(
        name: impl Into<String>,
        embeddable: impl Into<String>,
        sub_columns: Vec<(&str, &str, JdbcMapping)>,
    ) -> Self {
        let name = name.into();
        let columns = sub_columns
            .into_iter()
            .map(|(sub, column, jdbc)| ColumnMapping::new(column, jdbc, format!("{}.{}", name, sub)))
            .collect();
        AttributeDescriptor {
            kind: AttributeKind::Embedded {
                embeddable: embeddable.into(),
                columns,
                aggregate: None,
            },
            name,
        }
    }

    /// Embeddable encoded into one structured column.
    pub fn aggregate_embedded(
        name: impl Into<String>,
        embeddable: impl Into<String>,
        aggregate_column: impl Into<String>,
        aggregate_jdbc: impl Into<JdbcMapping>,
        sub_columns: Vec<(&str, JdbcMapping)>,
        requires_aggregate_column_writer: bool,
    ) -> Self {
        let name = name.into();
        let aggregate_column = aggregate_column.into();
        let columns = sub_columns
            .into_iter()
            .map(|(sub, jdbc)| {
                let mut column = ColumnMapping::new(sub, jdbc, format!("{}.{}", name, sub));
                column.aggregate_column = Some(aggregate_column.clone());
                column
            })
            .collect();
        AttributeDescriptor {
            kind: AttributeKind::Embedded {
                embeddable: embeddable.into(),
                columns,
                aggregate: Some(AggregateColumnDescriptor {
                    attribute_name: name.clone(),
                    column: ColumnMapping::new(aggregate_column, aggregate_jdbc, name.clone()),
                    requires_aggregate_column_writer,
                }),
            },
            name,
        }
    }

    pub fn to_one(
        name: impl Into<String>,
        target_entity: impl Into<String>,
        fk_columns: Vec<(&str, JdbcMapping)>,
        optional: bool,
    ) -> Self {
        let name = name.into();
        let fk_columns = fk_columns
            .into_iter()
            .map(|(column, jdbc)| ColumnMapping::new(column, jdbc, name.clone()))
            .collect();
        AttributeDescriptor {
            kind: AttributeKind::ToOne {
                target_entity: target_entity.into(),
                fk_columns,
                optional,
            },
            name,
        }
    }

    pub fn to_many(name: impl Into<String>, target_entity: impl Into<String>, key_columns: Vec<&str>) -> Self {
        AttributeDescriptor {
            name: name.into(),
            kind: AttributeKind::ToMany {
                target_entity: target_entity.into(),
                key_columns: key_columns.into_iter().map(str::to_string).collect(),
            },
        }
    }

    pub fn target_entity(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::ToOne { target_entity, .. } | AttributeKind::ToMany { target_entity, .. } => {
                Some(target_entity)
            }
            _ => None,
        }
    }
}

/// Additional table joined to the primary table by its key columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryTable {
    pub table_name: String,
    /// Key columns referencing the primary table's identifier columns
    pub key_columns: Vec<String>,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EntityDefinition")]
pub struct EntityDescriptor {
    pub name: String,
    pub table_name: String,
    pub identifier: AttributeDescriptor,
    pub attributes: IndexMap<String, AttributeDescriptor>,
    #[serde(default)]
    pub secondary_tables: Vec<SecondaryTable>,
    /// SQL restriction applied wherever the entity is queried, e.g. `deleted = false`
    #[serde(default)]
    pub restriction: Option<String>,
    #[serde(skip)]
    root_aggregates: Vec<AggregateColumnDescriptor>,
    /// selectable path → index into `root_aggregates`
    #[serde(skip)]
    aggregate_index: HashMap<String, usize>,
}

/// Serialized form of an [`EntityDescriptor`]; the aggregate index is
/// derived data and is rebuilt from the attributes.
#[derive(Deserialize)]
struct EntityDefinition {
    name: String,
    table_name: String,
    identifier: AttributeDescriptor,
    attributes: IndexMap<String, AttributeDescriptor>,
    #[serde(default)]
    secondary_tables: Vec<SecondaryTable>,
    #[serde(default)]
    restriction: Option<String>,
}

impl From<EntityDefinition> for EntityDescriptor {
    fn from(definition: EntityDefinition) -> Self {
        let mut entity = EntityDescriptor::new(definition.name, definition.table_name, definition.identifier);
        entity.secondary_tables = definition.secondary_tables;
        entity.restriction = definition.restriction;
        for (_, attribute) in definition.attributes {
            entity.add_attribute(attribute);
        }
        entity
    }
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>, identifier: AttributeDescriptor) -> Self {
        EntityDescriptor {
            name: name.into(),
            table_name: table_name.into(),
            identifier,
            attributes: IndexMap::new(),
            secondary_tables: Vec::new(),
            restriction: None,
            root_aggregates: Vec::new(),
            aggregate_index: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.add_attribute(attribute);
        self
    }

    pub fn with_secondary_table(mut self, secondary: SecondaryTable) -> Self {
        self.secondary_tables.push(secondary);
        self
    }

    pub fn with_restriction(mut self, restriction: impl Into<String>) -> Self {
        self.restriction = Some(restriction.into());
        self
    }

    pub fn add_attribute(&mut self, attribute: AttributeDescriptor) {
        if let AttributeKind::Embedded {
            columns,
            aggregate: Some(aggregate),
            ..
        } = &attribute.kind
        {
            let index = self.root_aggregates.len();
            self.root_aggregates.push(aggregate.clone());
            for column in columns {
                self.aggregate_index.insert(column.selectable_path.clone(), index);
            }
        }
        self.attributes.insert(attribute.name.clone(), attribute);
    }

    pub fn find_attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        if self.identifier.name == name {
            return Some(&self.identifier);
        }
        self.attributes.get(name)
    }

    pub fn attribute(&self, name: &str) -> Result<&AttributeDescriptor, DomainModelError> {
        self.find_attribute(name)
            .ok_or_else(|| DomainModelError::UnknownAttribute {
                entity_name: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    pub fn identifier_columns(&self) -> Vec<ColumnMapping> {
        match &self.identifier.kind {
            AttributeKind::Basic { column } => vec![column.clone()],
            AttributeKind::Embedded { columns, .. } => columns.clone(),
            _ => Vec::new(),
        }
    }

    pub fn identifier_mapping(&self) -> ValueMapping {
        match &self.identifier.kind {
            AttributeKind::Basic { column } => ValueMapping::Basic(column.jdbc_mapping.clone()),
            AttributeKind::Embedded {
                embeddable, columns, ..
            } => embeddable_mapping(embeddable, columns),
            _ => ValueMapping::Embeddable {
                name: self.identifier.name.clone(),
                attributes: Vec::new(),
            },
        }
    }

    pub fn value_mapping(&self) -> ValueMapping {
        ValueMapping::Entity {
            entity_name: self.name.clone(),
            identifier: Box::new(self.identifier_mapping()),
        }
    }

    /// Columns selected for a full (non-shallow) entity reference:
    /// identifier first, then attributes in declaration order. Plural
    /// attributes contribute nothing; aggregate embeddables contribute their
    /// structured column.
    pub fn selectable_columns(&self) -> Vec<ColumnMapping> {
        let mut columns = self.identifier_columns();
        for attribute in self.attributes.values() {
            match &attribute.kind {
                AttributeKind::Basic { column } => columns.push(column.clone()),
                AttributeKind::Embedded {
                    aggregate: Some(aggregate),
                    ..
                } => columns.push(aggregate.column.clone()),
                AttributeKind::Embedded { columns: sub, .. } => columns.extend(sub.iter().cloned()),
                AttributeKind::ToOne { fk_columns, .. } => columns.extend(fk_columns.iter().cloned()),
                AttributeKind::ToMany { .. } => {}
            }
        }
        columns
    }

    pub fn root_aggregates(&self) -> &[AggregateColumnDescriptor] {
        &self.root_aggregates
    }

    /// Index of the root aggregate whose structured column holds the given
    /// selectable path.
    pub fn find_aggregate_index(&self, selectable_path: &str) -> Option<usize> {
        self.aggregate_index.get(selectable_path).copied()
    }

    pub fn has_aggregate_column_writers(&self) -> bool {
        self.root_aggregates
            .iter()
            .any(|aggregate| aggregate.requires_aggregate_column_writer)
    }

    pub fn table_names(&self) -> Vec<&str> {
        std::iter::once(self.table_name.as_str())
            .chain(self.secondary_tables.iter().map(|t| t.table_name.as_str()))
            .collect()
    }
}

pub(crate) fn embeddable_mapping(embeddable: &str, columns: &[ColumnMapping]) -> ValueMapping {
    ValueMapping::Embeddable {
        name: embeddable.to_string(),
        attributes: columns
            .iter()
            .map(|column| {
                let local = column
                    .selectable_path
                    .rsplit('.')
                    .next()
                    .unwrap_or(column.selectable_path.as_str())
                    .to_string();
                (local, ValueMapping::Basic(column.jdbc_mapping.clone()))
            })
            .collect(),
    }
}

/// Descriptor service resolving domain types to their relational shape.
pub trait MetadataResolver {
    fn find_entity(&self, entity_name: &str) -> Option<&EntityDescriptor>;

    fn entity(&self, entity_name: &str) -> Result<&EntityDescriptor, DomainModelError> {
        self.find_entity(entity_name)
            .ok_or_else(|| DomainModelError::unknown_entity(entity_name))
    }

    /// Value mapping of an attribute. Join-producing attributes map to the
    /// target entity (bound through its identifier).
    fn attribute_value_mapping(&self, attribute: &AttributeDescriptor) -> Result<ValueMapping, DomainModelError> {
        match &attribute.kind {
            AttributeKind::Basic { column } => Ok(ValueMapping::Basic(column.jdbc_mapping.clone())),
            AttributeKind::Embedded {
                embeddable, columns, ..
            } => Ok(embeddable_mapping(embeddable, columns)),
            AttributeKind::ToOne { target_entity, .. } | AttributeKind::ToMany { target_entity, .. } => {
                Ok(self.entity(target_entity)?.value_mapping())
            }
        }
    }
}

/// In-memory descriptor service.
#[derive(Debug, Clone, Default)]
pub struct DomainModel {
    entities: HashMap<String, EntityDescriptor>,
}

impl DomainModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityDescriptor) -> Self {
        self.add_entity(entity);
        self
    }

    pub fn add_entity(&mut self, entity: EntityDescriptor) {
        if self.entities.contains_key(&entity.name) {
            log::debug!("Entity descriptor `{}` replaced", entity.name);
        }
        self.entities.insert(entity.name.clone(), entity);
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /// Checks that every join-producing attribute points at a known entity
    /// with a matching number of key columns.
    pub fn validate(&self) -> Result<(), DomainModelError> {
        for entity in self.entities.values() {
            let id_count = entity.identifier_columns().len();
            if id_count == 0 {
                return Err(DomainModelError::invalid_mapping(
                    &entity.name,
                    &entity.identifier.name,
                    "identifier must map to at least one column",
                ));
            }
            for secondary in &entity.secondary_tables {
                if secondary.key_columns.len() != id_count {
                    return Err(DomainModelError::invalid_mapping(
                        &entity.name,
                        &secondary.table_name,
                        "secondary table key columns must match the identifier columns",
                    ));
                }
            }
            for attribute in entity.attributes.values() {
                match &attribute.kind {
                    AttributeKind::ToOne {
                        target_entity,
                        fk_columns,
                        ..
                    } => {
                        let target = self.entity(target_entity)?;
                        if target.identifier_columns().len() != fk_columns.len() {
                            return Err(DomainModelError::invalid_mapping(
                                &entity.name,
                                &attribute.name,
                                format!(
                                    "{} foreign key column(s) for a {}-column identifier of `{}`",
                                    fk_columns.len(),
                                    target.identifier_columns().len(),
                                    target_entity
                                ),
                            ));
                        }
                    }
                    AttributeKind::ToMany {
                        target_entity,
                        key_columns,
                    } => {
                        self.entity(target_entity)?;
                        if key_columns.len() != id_count {
                            return Err(DomainModelError::invalid_mapping(
                                &entity.name,
                                &attribute.name,
                                "collection key columns must match the owner identifier columns",
                            ));
                        }
                    }
                    AttributeKind::Embedded {
                        columns,
                        aggregate: Some(aggregate),
                        ..
                    } => {
                        if !aggregate.column.jdbc_mapping.jdbc_type.is_aggregate() {
                            return Err(DomainModelError::invalid_mapping(
                                &entity.name,
                                &attribute.name,
                                format!(
                                    "aggregate column must be JSON, XML or STRUCT, found {}",
                                    aggregate.column.jdbc_mapping.jdbc_type
                                ),
                            ));
                        }
                        if columns.is_empty() {
                            return Err(DomainModelError::invalid_mapping(
                                &entity.name,
                                &attribute.name,
                                "aggregate embeddable needs at least one sub-column",
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

impl MetadataResolver for DomainModel {
    fn find_entity(&self, entity_name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(entity_name)
    }
}
