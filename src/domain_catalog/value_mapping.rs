//! Value mappings: how a domain value is spread over JDBC columns.
//!
//! A [`ValueMapping`] is the type descriptor carried by SQM nodes and
//! resolved for literals and parameters. Its flattened list of
//! [`JdbcMapping`]s decides how many bind placeholders a parameter needs.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JdbcType {
    Boolean,
    Integer,
    Bigint,
    Double,
    Decimal,
    Varchar,
    Date,
    Timestamp,
    Uuid,
    /// Structured column holding JSON encoded sub-attributes
    Json,
    /// Structured column holding XML encoded sub-attributes
    Xml,
    /// Database STRUCT / composite type
    Struct,
    Object,
}

impl JdbcType {
    /// Structured types that encode several logical sub-attributes in one column.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, JdbcType::Json | JdbcType::Xml | JdbcType::Struct)
    }

    /// Best-effort JDBC type of a bound JSON value. `null` carries no type.
    pub fn from_json_value(value: &serde_json::Value) -> Option<JdbcType> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(_) => Some(JdbcType::Boolean),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(JdbcType::Bigint),
            serde_json::Value::Number(_) => Some(JdbcType::Double),
            serde_json::Value::String(_) => Some(JdbcType::Varchar),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(JdbcType::Json),
        }
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JdbcType::Boolean => "BOOLEAN",
            JdbcType::Integer => "INTEGER",
            JdbcType::Bigint => "BIGINT",
            JdbcType::Double => "DOUBLE",
            JdbcType::Decimal => "DECIMAL",
            JdbcType::Varchar => "VARCHAR",
            JdbcType::Date => "DATE",
            JdbcType::Timestamp => "TIMESTAMP",
            JdbcType::Uuid => "UUID",
            JdbcType::Json => "JSON",
            JdbcType::Xml => "XML",
            JdbcType::Struct => "STRUCT",
            JdbcType::Object => "OBJECT",
        };
        write!(f, "{}", name)
    }
}

/// Mapping of one value onto exactly one JDBC column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JdbcMapping {
    pub jdbc_type: JdbcType,
    /// Column length / precision when the model declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl JdbcMapping {
    pub fn new(jdbc_type: JdbcType) -> Self {
        JdbcMapping {
            jdbc_type,
            length: None,
        }
    }

    pub fn with_length(jdbc_type: JdbcType, length: u32) -> Self {
        JdbcMapping {
            jdbc_type,
            length: Some(length),
        }
    }
}

impl From<JdbcType> for JdbcMapping {
    fn from(jdbc_type: JdbcType) -> Self {
        JdbcMapping::new(jdbc_type)
    }
}

/// Domain type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueMapping {
    /// Single column value
    Basic(JdbcMapping),
    /// Embeddable (composite) value, one entry per sub-attribute
    Embeddable {
        name: String,
        attributes: Vec<(String, ValueMapping)>,
    },
    /// Entity-valued: bound and compared through its identifier
    Entity {
        entity_name: String,
        identifier: Box<ValueMapping>,
    },
}

impl ValueMapping {
    pub fn basic(jdbc_type: JdbcType) -> Self {
        ValueMapping::Basic(JdbcMapping::new(jdbc_type))
    }

    /// Flattened JDBC mappings, in column order.
    pub fn jdbc_mappings(&self) -> Vec<JdbcMapping> {
        let mut mappings = Vec::new();
        self.collect_jdbc_mappings(&mut mappings);
        mappings
    }

    fn collect_jdbc_mappings(&self, into: &mut Vec<JdbcMapping>) {
        match self {
            ValueMapping::Basic(mapping) => into.push(mapping.clone()),
            ValueMapping::Embeddable { attributes, .. } => {
                for (_, attribute) in attributes {
                    attribute.collect_jdbc_mappings(into);
                }
            }
            ValueMapping::Entity { identifier, .. } => identifier.collect_jdbc_mappings(into),
        }
    }

    pub fn jdbc_type_count(&self) -> usize {
        match self {
            ValueMapping::Basic(_) => 1,
            ValueMapping::Embeddable { attributes, .. } => {
                attributes.iter().map(|(_, a)| a.jdbc_type_count()).sum()
            }
            ValueMapping::Entity { identifier, .. } => identifier.jdbc_type_count(),
        }
    }

    /// First JDBC mapping; literals and single-column expressions use this.
    pub fn first_jdbc_mapping(&self) -> Option<JdbcMapping> {
        match self {
            ValueMapping::Basic(mapping) => Some(mapping.clone()),
            ValueMapping::Embeddable { attributes, .. } => attributes
                .first()
                .and_then(|(_, attribute)| attribute.first_jdbc_mapping()),
            ValueMapping::Entity { identifier, .. } => identifier.first_jdbc_mapping(),
        }
    }
}

impl fmt::Display for ValueMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueMapping::Basic(mapping) => write!(f, "{}", mapping.jdbc_type),
            ValueMapping::Embeddable { name, .. } => write!(f, "embeddable {}", name),
            ValueMapping::Entity { entity_name, .. } => write!(f, "entity {}", entity_name),
        }
    }
}
