//! Lowering tests against a small HR-style domain model.
//!
//! ```text
//! Employee(employees) ── manager ──▶ Employee        (manager_id, optional)
//!         │            ── department ─▶ Department   (department_id, restricted: active = true)
//!         └─ reports (one-to-many through employees.manager_id)
//! Customer(customers) + customer_details, address encoded into address_data (JSON)
//! ```

mod select_tests;

use crate::config::LoweringConfig;
use crate::domain_catalog::domain_model::{
    AttributeDescriptor, AttributeKind, ColumnMapping, DomainModel, EntityDescriptor, SecondaryTable,
};
use crate::domain_catalog::value_mapping::{JdbcMapping, JdbcType};
use crate::sql_ast::expression::{ColumnReference, Expression};
use crate::sql_ast::statement::{QuerySpec, SelectStatement, Statement};
use crate::sql_ast::table_group::{TableGroup, TableGroupJoin};
use crate::sqm::parameters::{DomainParameterXref, QueryParameterBindings};
use crate::sqm::query_options::QueryOptions;
use crate::sqm::tree::SqmStatement;

use super::{translate, LoweringError, SqmTranslation};

pub(super) fn employee() -> EntityDescriptor {
    EntityDescriptor::new(
        "Employee",
        "employees",
        AttributeDescriptor::basic("id", "id", JdbcType::Bigint),
    )
    .with_attribute(AttributeDescriptor::basic(
        "name",
        "name",
        JdbcMapping::with_length(JdbcType::Varchar, 255),
    ))
    .with_attribute(AttributeDescriptor::basic("salary", "salary", JdbcType::Decimal))
    .with_attribute(AttributeDescriptor::embedded(
        "address",
        "Address",
        vec![
            ("street", "street", JdbcType::Varchar.into()),
            ("city", "city", JdbcType::Varchar.into()),
        ],
    ))
    .with_attribute(AttributeDescriptor::to_one(
        "manager",
        "Employee",
        vec![("manager_id", JdbcType::Bigint.into())],
        true,
    ))
    .with_attribute(AttributeDescriptor::to_one(
        "department",
        "Department",
        vec![("department_id", JdbcType::Bigint.into())],
        false,
    ))
    .with_attribute(AttributeDescriptor::to_many("reports", "Employee", vec!["manager_id"]))
}

pub(super) fn department() -> EntityDescriptor {
    EntityDescriptor::new(
        "Department",
        "departments",
        AttributeDescriptor::basic("id", "id", JdbcType::Bigint),
    )
    .with_attribute(AttributeDescriptor::basic("name", "name", JdbcType::Varchar))
    .with_restriction("active = true")
}

pub(super) fn customer() -> EntityDescriptor {
    EntityDescriptor::new(
        "Customer",
        "customers",
        AttributeDescriptor::basic("id", "id", JdbcType::Bigint),
    )
    .with_attribute(AttributeDescriptor::basic("name", "name", JdbcType::Varchar))
    .with_attribute(AttributeDescriptor {
        name: "notes".to_string(),
        kind: AttributeKind::Basic {
            column: ColumnMapping::new("notes", JdbcType::Varchar, "notes").in_table("customer_details"),
        },
    })
    .with_attribute(AttributeDescriptor::aggregate_embedded(
        "address",
        "Address",
        "address_data",
        JdbcType::Json,
        vec![("city", JdbcType::Varchar.into()), ("zip", JdbcType::Varchar.into())],
        true,
    ))
    .with_secondary_table(SecondaryTable {
        table_name: "customer_details".to_string(),
        key_columns: vec!["customer_id".to_string()],
        optional: true,
    })
}

pub(super) fn model() -> DomainModel {
    DomainModel::new()
        .with_entity(employee())
        .with_entity(department())
        .with_entity(customer())
}

pub(super) fn lower(statement: &SqmStatement, bindings: &QueryParameterBindings) -> Result<SqmTranslation, LoweringError> {
    lower_with(statement, bindings, &QueryOptions::default(), &LoweringConfig::default()).map(|(translation, _)| translation)
}

pub(super) fn lower_with(
    statement: &SqmStatement,
    bindings: &QueryParameterBindings,
    options: &QueryOptions,
    config: &LoweringConfig,
) -> Result<(SqmTranslation, DomainParameterXref), LoweringError> {
    let model = model();
    translate(statement, &model, bindings, options, config)
}

pub(super) fn select_of(translation: &SqmTranslation) -> &SelectStatement {
    translation
        .statement
        .as_select()
        .expect("expected a select statement")
}

pub(super) fn query_spec_of(translation: &SqmTranslation) -> &QuerySpec {
    &select_of(translation).query_spec
}

pub(super) fn root_group(query_spec: &QuerySpec) -> &TableGroup {
    query_spec.from_clause.roots.first().expect("query spec without roots")
}

/// Joins directly under `group`.
pub(super) fn joins_of(group: &TableGroup) -> &[TableGroupJoin] {
    &group.table_group_joins
}

pub(super) fn column(expression: &Expression) -> &ColumnReference {
    expression
        .as_column_reference()
        .unwrap_or_else(|| panic!("expected a column reference, got {:?}", expression))
}

/// `qualifier.column` of every selection.
pub(super) fn selected_columns(query_spec: &QuerySpec) -> Vec<String> {
    query_spec
        .select_clause
        .sql_selections
        .iter()
        .map(|selection| match &selection.expression {
            Expression::ColumnReference(column) => column.qualified_name(),
            other => format!("{:?}", other),
        })
        .collect()
}

pub(super) fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Select(_) => "select",
        Statement::Update(_) => "update",
        Statement::Delete(_) => "delete",
        Statement::Insert(_) => "insert",
    }
}
