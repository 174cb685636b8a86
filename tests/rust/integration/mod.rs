//! Integration tests - Full lowering runs through the public API
//!
//! Each test loads a YAML domain model, decodes an SQM statement and its
//! bindings from JSON, and lowers them with `sqm_lowering::compile`.

mod dml_lowering_tests;
mod select_lowering_tests;

use sqm_lowering::domain_catalog::config::DomainModelConfig;
use sqm_lowering::domain_catalog::DomainModel;
use sqm_lowering::sql_ast::{ColumnReference, Expression, Predicate};

pub const HR_MODEL: &str = r#"
entities:
  - name: Employee
    table: employees
    id: { name: id, type: bigint }
    attributes:
      - { name: name, type: varchar, length: 255 }
      - { name: salary, type: decimal }
      - { name: manager, to_one: Employee, columns: [manager_id], optional: true }
      - { name: department, to_one: Department, columns: [department_id], optional: false }
      - { name: reports, to_many: Employee, key_columns: [manager_id] }
  - name: Department
    table: departments
    restriction: "active = true"
    id: { name: id, type: bigint }
    attributes:
      - { name: name, type: varchar }
  - name: Customer
    table: customers
    id: { name: id, type: bigint }
    secondary_tables:
      - { table_name: customer_details, key_columns: [customer_id], optional: true }
    attributes:
      - { name: name, type: varchar }
      - { name: notes, type: varchar, table: customer_details }
"#;

pub fn hr_model() -> DomainModel {
    DomainModelConfig::from_yaml_str(HR_MODEL)
        .expect("model parses")
        .to_domain_model()
        .expect("model validates")
}

pub fn column(expression: &Expression) -> &ColumnReference {
    expression
        .as_column_reference()
        .unwrap_or_else(|| panic!("expected a column reference, got {:?}", expression))
}

/// `(left, right)` qualified column names of an equality.
pub fn equality(predicate: &Predicate) -> (String, String) {
    match predicate {
        Predicate::Comparison { left, right, .. } => (column(left).qualified_name(), column(right).qualified_name()),
        other => panic!("expected a comparison, got {:?}", other),
    }
}
