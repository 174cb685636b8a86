//! Domain model definitions loaded from YAML files.

use std::io::Write;

use sqm_lowering::domain_catalog::config::DomainModelConfig;
use sqm_lowering::domain_catalog::{AttributeKind, DomainModelError, JdbcMapping, JdbcType, MetadataResolver};

const MODEL: &str = r#"
entities:
  - name: Department
    table: departments
    restriction: "active = true"
    id: { name: id, type: bigint }
    attributes:
      - { name: name, type: varchar }
  - name: Customer
    table: customers
    id: { name: id, column: customer_id, type: bigint }
    secondary_tables:
      - { table_name: customer_details, key_columns: [customer_id], optional: true }
    attributes:
      - { name: name, type: varchar, length: 120 }
      - { name: notes, type: varchar, table: customer_details }
      - { name: department, to_one: Department, columns: [department_id], optional: false }
      - name: address
        embeddable: Address
        aggregate: { column: address_data, type: json }
        columns:
          - { name: city, type: varchar }
          - { name: zip, column: postal_code, type: varchar }
"#;

fn write_model(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", yaml).unwrap();
    file
}

#[test]
fn test_model_file_loads() {
    let file = write_model(MODEL);
    let model = DomainModelConfig::from_yaml_file(file.path())
        .unwrap()
        .to_domain_model()
        .unwrap();

    let customer = model.entity("Customer").unwrap();
    assert_eq!(customer.table_name, "customers");
    assert_eq!(customer.identifier_columns()[0].column_name, "customer_id");
    assert_eq!(customer.table_names(), vec!["customers", "customer_details"]);

    match &customer.attribute("name").unwrap().kind {
        AttributeKind::Basic { column } => {
            assert_eq!(column.jdbc_mapping, JdbcMapping::with_length(JdbcType::Varchar, 120));
            assert_eq!(column.table_name, None);
        }
        other => panic!("expected a basic attribute, got {:?}", other),
    }
    match &customer.attribute("notes").unwrap().kind {
        AttributeKind::Basic { column } => assert_eq!(column.table_name.as_deref(), Some("customer_details")),
        other => panic!("expected a basic attribute, got {:?}", other),
    }
    assert!(matches!(
        customer.attribute("department").unwrap().kind,
        AttributeKind::ToOne { optional: false, .. }
    ));
}

#[test]
fn test_embeddable_columns_and_aggregate() {
    let model = DomainModelConfig::from_yaml_str(MODEL)
        .unwrap()
        .to_domain_model()
        .unwrap();
    let customer = model.entity("Customer").unwrap();

    match &customer.attribute("address").unwrap().kind {
        AttributeKind::Embedded {
            embeddable,
            columns,
            aggregate,
        } => {
            assert_eq!(embeddable, "Address");
            let names: Vec<_> = columns.iter().map(|c| c.column_name.as_str()).collect();
            assert_eq!(names, vec!["city", "postal_code"]);
            assert_eq!(columns[1].selectable_path, "address.zip");
            assert!(columns.iter().all(|c| c.aggregate_column.as_deref() == Some("address_data")));
            let aggregate = aggregate.as_ref().unwrap();
            assert_eq!(aggregate.column.column_name, "address_data");
            assert!(aggregate.requires_aggregate_column_writer);
        }
        other => panic!("expected an embedded attribute, got {:?}", other),
    }
    assert_eq!(customer.find_aggregate_index("address.city"), Some(0));
}

#[test]
fn test_missing_file_is_read_error() {
    let err = DomainModelConfig::from_yaml_file("/nonexistent/model.yaml").unwrap_err();
    assert!(matches!(err, DomainModelError::ConfigReadError { .. }));
}

#[test]
fn test_foreign_key_arity_checked_against_target() {
    let yaml = r#"
entities:
  - { name: Department, table: departments, id: { name: id, type: bigint } }
  - name: Employee
    table: employees
    id: { name: id, type: bigint }
    attributes:
      - { name: department, to_one: Department, columns: [dept_id, dept_region] }
"#;
    let err = DomainModelConfig::from_yaml_str(yaml)
        .unwrap()
        .to_domain_model()
        .unwrap_err();
    assert!(matches!(
        err,
        DomainModelError::InvalidMapping { ref attribute, .. } if attribute == "department"
    ));
}

#[test]
fn test_unknown_association_target() {
    let yaml = r#"
entities:
  - name: Employee
    table: employees
    id: { name: id, type: bigint }
    attributes:
      - { name: reports, to_many: Person, key_columns: [manager_id] }
"#;
    let err = DomainModelConfig::from_yaml_str(yaml)
        .unwrap()
        .to_domain_model()
        .unwrap_err();
    assert_eq!(err, DomainModelError::unknown_entity("Person"));
}

#[test]
fn test_aggregate_column_must_be_structured() {
    let yaml = r#"
entities:
  - name: Customer
    table: customers
    id: { name: id, type: bigint }
    attributes:
      - name: address
        embeddable: Address
        aggregate: { column: address_data, type: varchar }
        columns:
          - { name: city }
"#;
    let err = DomainModelConfig::from_yaml_str(yaml)
        .unwrap()
        .to_domain_model()
        .unwrap_err();
    assert!(err.to_string().contains("JSON, XML or STRUCT"), "{}", err);
}

#[test]
fn test_empty_model_rejected() {
    let err = DomainModelConfig::from_yaml_str("entities: []")
        .unwrap()
        .to_domain_model()
        .unwrap_err();
    assert!(matches!(err, DomainModelError::InvalidConfig { .. }));
}
