//! YAML definition of a domain model.
//!
//! ```yaml
//! entities:
//!   - name: Employee
//!     table: employees
//!     restriction: "deleted = false"
//!     id: { name: id, column: id, type: bigint }
//!     attributes:
//!       - { name: name, column: name, type: varchar }
//!       - { name: manager, to_one: Employee, columns: [manager_id], optional: true }
//!       - { name: reports, to_many: Employee, key_columns: [manager_id] }
//!       - name: address
//!         embeddable: Address
//!         aggregate: { column: address_data, type: json, writer: true }
//!         columns:
//!           - { name: city, type: varchar }
//!           - { name: zip, type: varchar }
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use super::domain_model::{
    AggregateColumnDescriptor, AttributeDescriptor, AttributeKind, ColumnMapping, DomainModel, EntityDescriptor,
    SecondaryTable,
};
use super::errors::DomainModelError;
use super::value_mapping::{JdbcMapping, JdbcType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainModelConfig {
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub table: String,
    pub id: ColumnConfig,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub secondary_tables: Vec<SecondaryTable>,
    #[serde(default)]
    pub restriction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// Defaults to the attribute name
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type", default)]
    pub jdbc_type: Option<JdbcType>,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub table: Option<String>,
}

impl ColumnConfig {
    fn jdbc_mapping(&self) -> JdbcMapping {
        JdbcMapping {
            jdbc_type: self.jdbc_type.unwrap_or(JdbcType::Varchar),
            length: self.length,
        }
    }

    fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub column: String,
    #[serde(rename = "type")]
    pub jdbc_type: JdbcType,
    #[serde(default = "default_true")]
    pub writer: bool,
}

fn default_true() -> bool {
    true
}

/// Flat attribute definition; the populated keys decide the attribute kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type", default)]
    pub jdbc_type: Option<JdbcType>,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub embeddable: Option<String>,
    #[serde(default)]
    pub aggregate: Option<AggregateConfig>,
    #[serde(default)]
    pub to_one: Option<String>,
    #[serde(default)]
    pub to_many: Option<String>,
    /// Sub-columns of an embeddable, or FK column names of a to-one
    #[serde(default)]
    pub columns: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub optional: Option<bool>,
}

impl DomainModelConfig {
    /// Load a domain model definition from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, DomainModelError> {
        let contents = fs::read_to_string(path).map_err(|e| DomainModelError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse a domain model definition from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DomainModelError> {
        serde_yaml::from_str(yaml).map_err(|e| DomainModelError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Build and validate the [`DomainModel`].
    pub fn to_domain_model(&self) -> Result<DomainModel, DomainModelError> {
        if self.entities.is_empty() {
            return Err(DomainModelError::InvalidConfig {
                message: "Domain model must contain at least one entity".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        let mut model = DomainModel::new();
        for entity_config in &self.entities {
            if !seen.insert(&entity_config.name) {
                return Err(DomainModelError::InvalidConfig {
                    message: format!("Duplicate entity name '{}'", entity_config.name),
                });
            }
            model.add_entity(build_entity(entity_config)?);
        }
        model.validate()?;
        log::info!("Loaded domain model with {} entities", self.entities.len());
        Ok(model)
    }
}

fn build_entity(config: &EntityConfig) -> Result<EntityDescriptor, DomainModelError> {
    let id_column = ColumnMapping {
        table_name: None,
        column_name: config.id.column_name().to_string(),
        jdbc_mapping: config.id.jdbc_mapping(),
        selectable_path: config.id.name.clone(),
        aggregate_column: None,
    };
    let identifier = AttributeDescriptor {
        name: config.id.name.clone(),
        kind: AttributeKind::Basic { column: id_column },
    };

    let mut entity = EntityDescriptor::new(&config.name, &config.table, identifier);
    entity.secondary_tables = config.secondary_tables.clone();
    entity.restriction = config.restriction.clone();
    for attribute in &config.attributes {
        entity.add_attribute(build_attribute(&config.name, attribute)?);
    }
    Ok(entity)
}

fn build_attribute(entity_name: &str, config: &AttributeConfig) -> Result<AttributeDescriptor, DomainModelError> {
    let invalid = |message: &str| DomainModelError::invalid_mapping(entity_name, &config.name, message);

    if let Some(target) = &config.to_one {
        let fk_columns = config
            .columns
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .map(|column| {
                        // FK arity is checked against the target identifier in DomainModel::validate
                        let mut mapping = ColumnMapping::new(
                            column,
                            config.jdbc_type.unwrap_or(JdbcType::Bigint),
                            config.name.clone(),
                        );
                        mapping.table_name = config.table.clone();
                        mapping
                    })
                    .ok_or_else(|| invalid("to_one columns must be plain column names"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if fk_columns.is_empty() {
            return Err(invalid("to_one requires at least one foreign key column"));
        }
        return Ok(AttributeDescriptor {
            name: config.name.clone(),
            kind: AttributeKind::ToOne {
                target_entity: target.clone(),
                fk_columns,
                optional: config.optional.unwrap_or(true),
            },
        });
    }

    if let Some(target) = &config.to_many {
        if config.key_columns.is_empty() {
            return Err(invalid("to_many requires key_columns"));
        }
        return Ok(AttributeDescriptor::to_many(
            config.name.clone(),
            target.clone(),
            config.key_columns.iter().map(String::as_str).collect(),
        ));
    }

    if let Some(embeddable) = &config.embeddable {
        let mut columns = Vec::with_capacity(config.columns.len());
        for value in &config.columns {
            let sub: ColumnConfig = serde_yaml::from_value(value.clone())
                .map_err(|e| invalid(&format!("invalid embeddable column: {}", e)))?;
            let mut column = ColumnMapping::new(
                sub.column_name(),
                sub.jdbc_mapping(),
                format!("{}.{}", config.name, sub.name),
            );
            column.table_name = sub.table.clone().or_else(|| config.table.clone());
            column.aggregate_column = config.aggregate.as_ref().map(|a| a.column.clone());
            columns.push(column);
        }
        if columns.is_empty() {
            return Err(invalid("embeddable requires at least one column"));
        }
        let aggregate = config.aggregate.as_ref().map(|aggregate| AggregateColumnDescriptor {
            attribute_name: config.name.clone(),
            column: ColumnMapping {
                table_name: config.table.clone(),
                column_name: aggregate.column.clone(),
                jdbc_mapping: JdbcMapping::new(aggregate.jdbc_type),
                selectable_path: config.name.clone(),
                aggregate_column: None,
            },
            requires_aggregate_column_writer: aggregate.writer,
        });
        return Ok(AttributeDescriptor {
            name: config.name.clone(),
            kind: AttributeKind::Embedded {
                embeddable: embeddable.clone(),
                columns,
                aggregate,
            },
        });
    }

    let mut column = ColumnMapping::new(
        config.column.clone().unwrap_or_else(|| config.name.clone()),
        JdbcMapping {
            jdbc_type: config.jdbc_type.unwrap_or(JdbcType::Varchar),
            length: config.length,
        },
        config.name.clone(),
    );
    column.table_name = config.table.clone();
    Ok(AttributeDescriptor {
        name: config.name.clone(),
        kind: AttributeKind::Basic { column },
    })
}
