//! UPDATE, DELETE and INSERT statements lowered against the YAML model.

use pretty_assertions::assert_eq;
use serde_json::json;

use sqm_lowering::config::LoweringConfig;
use sqm_lowering::sql_ast::{InsertSource, Predicate, Statement};
use sqm_lowering::sqm::{BindingsDocument, QueryOptions, QueryParameterBindings, SqmStatement};
use sqm_lowering::compile;

use super::{column, hr_model};

fn lower(statement: serde_json::Value, bindings: serde_json::Value) -> sqm_lowering::SqmTranslation {
    let statement: SqmStatement = serde_json::from_value(statement).expect("statement decodes");
    let bindings: QueryParameterBindings = serde_json::from_value::<BindingsDocument>(bindings)
        .expect("bindings decode")
        .into();
    let (translation, _) = compile(
        &statement,
        &hr_model(),
        &bindings,
        &QueryOptions::default(),
        &LoweringConfig::default(),
    )
    .expect("statement lowers");
    translation
}

#[test]
fn test_update_spanning_secondary_table() {
    let translation = lower(
        json!({
            "kind": "update",
            "target": {
                "navigable_path": "Customer(c)",
                "source": { "kind": "entity", "entity_name": "Customer" }
            },
            "assignments": [
                {
                    "target_path": "Customer(c).name",
                    "value": { "kind": "parameter", "id": 0, "key": { "named": "name" } }
                },
                {
                    "target_path": "Customer(c).notes",
                    "value": { "kind": "literal", "value": "vip" }
                }
            ],
            "where_clause": {
                "kind": "comparison",
                "left": { "kind": "path", "navigable_path": "Customer(c).id" },
                "operator": "equal",
                "right": { "kind": "parameter", "id": 1, "key": { "positional": 1 } }
            }
        }),
        json!({
            "named": { "name": { "value": { "single": "ACME" } } },
            "positional": { "1": { "value": { "single": 42 } } }
        }),
    );

    let update = translation.statement.as_update().unwrap();
    assert_eq!(update.target_table.table_expression, "customers");
    assert_eq!(update.target_table.identification_variable, "c1_0");
    let assigned: Vec<_> = update
        .assignments
        .iter()
        .map(|a| a.assignable[0].qualified_name())
        .collect();
    assert_eq!(assigned, vec!["c1_0.name", "c1_1.notes"]);
    assert_eq!(
        translation.affected_table_names.iter().collect::<Vec<_>>(),
        vec!["customer_details", "customers"]
    );
    assert_eq!(translation.jdbc_parameter_count(), 2);
}

#[test]
fn test_delete_keeps_entity_restriction() {
    let translation = lower(
        json!({
            "kind": "delete",
            "target": {
                "navigable_path": "Department(d)",
                "source": { "kind": "entity", "entity_name": "Department" }
            },
            "where_clause": {
                "kind": "comparison",
                "left": { "kind": "path", "navigable_path": "Department(d).name" },
                "operator": "equal",
                "right": { "kind": "literal", "value": "Archive" }
            }
        }),
        json!({}),
    );

    let delete = match &translation.statement {
        Statement::Delete(delete) => delete,
        other => panic!("expected a delete, got {:?}", other),
    };
    assert_eq!(delete.target_table.table_expression, "departments");
    match delete.restriction.as_ref() {
        Some(Predicate::Junction { predicates, .. }) => {
            assert_eq!(predicates.len(), 2);
            assert!(matches!(predicates[0], Predicate::Comparison { .. }));
            assert_eq!(
                predicates[1],
                Predicate::SqlFragment {
                    sql: "active = true".to_string(),
                    qualifier: "d1_0".to_string(),
                }
            );
        }
        other => panic!("unexpected restriction {:?}", other),
    }
    assert_eq!(translation.jdbc_parameter_count(), 0);
}

#[test]
fn test_insert_select_from_other_entity() {
    let translation = lower(
        json!({
            "kind": "insert_select",
            "target": {
                "navigable_path": "Department(d)",
                "source": { "kind": "entity", "entity_name": "Department" }
            },
            "insert_paths": ["Department(d).id", "Department(d).name"],
            "select_query": {
                "kind": "spec",
                "from_clause": {
                    "roots": [{
                        "navigable_path": "Employee(e)",
                        "source": { "kind": "entity", "entity_name": "Employee" }
                    }]
                },
                "select_clause": {
                    "selections": [
                        { "selectable": { "kind": "expression", "expression": { "kind": "path", "navigable_path": "Employee(e).id" } } },
                        { "selectable": { "kind": "expression", "expression": { "kind": "path", "navigable_path": "Employee(e).name" } } }
                    ]
                }
            }
        }),
        json!({}),
    );

    let insert = match &translation.statement {
        Statement::Insert(insert) => insert,
        other => panic!("expected an insert, got {:?}", other),
    };
    let targets: Vec<_> = insert.target_columns.iter().map(|c| c.qualified_name()).collect();
    assert_eq!(targets, vec!["d1_0.id", "d1_0.name"]);
    match &insert.source {
        InsertSource::Select { query_spec } => {
            let selected: Vec<_> = query_spec
                .select_clause
                .sql_selections
                .iter()
                .map(|s| column(&s.expression).qualified_name())
                .collect();
            assert_eq!(selected, vec!["e1_0.id", "e1_0.name"]);
        }
        other => panic!("expected a select source, got {:?}", other),
    }
}

#[test]
fn test_insert_values_with_association() {
    let translation = lower(
        json!({
            "kind": "insert_values",
            "target": {
                "navigable_path": "Employee(e)",
                "source": { "kind": "entity", "entity_name": "Employee" }
            },
            "insert_paths": ["Employee(e).id", "Employee(e).name", "Employee(e).department"],
            "values_list": [
                [
                    { "kind": "literal", "value": 1 },
                    { "kind": "parameter", "id": 0, "key": { "named": "name" } },
                    { "kind": "parameter", "id": 1, "key": { "named": "dept" } }
                ]
            ]
        }),
        json!({ "named": {
            "name": { "value": { "single": "Ann" } },
            "dept": { "value": { "single": 10 } }
        } }),
    );

    let insert = match &translation.statement {
        Statement::Insert(insert) => insert,
        other => panic!("expected an insert, got {:?}", other),
    };
    let targets: Vec<_> = insert.target_columns.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(targets, vec!["id", "name", "department_id"]);
    match &insert.source {
        InsertSource::Values { rows } => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].len(), 3);
        }
        other => panic!("expected a values source, got {:?}", other),
    }
    assert_eq!(translation.jdbc_parameter_count(), 2);
    assert_eq!(translation.affected_table_names.iter().collect::<Vec<_>>(), vec!["employees"]);
}

#[test]
fn test_update_join_predicate_to_department() {
    // association navigation in an UPDATE restriction goes through the FK
    let translation = lower(
        json!({
            "kind": "update",
            "target": {
                "navigable_path": "Employee(e)",
                "source": { "kind": "entity", "entity_name": "Employee" }
            },
            "assignments": [{
                "target_path": "Employee(e).salary",
                "value": { "kind": "literal", "value": 0 }
            }],
            "where_clause": {
                "kind": "comparison",
                "left": { "kind": "path", "navigable_path": "Employee(e).department.id" },
                "operator": "equal",
                "right": { "kind": "literal", "value": 3 }
            }
        }),
        json!({}),
    );

    let update = translation.statement.as_update().unwrap();
    match update.restriction.as_ref() {
        Some(Predicate::Comparison { left, .. }) => assert_eq!(column(left).qualified_name(), "e1_0.department_id"),
        other => panic!("unexpected restriction {:?}", other),
    }
    assert!(update.from_clause.roots[0].table_group_joins.is_empty());
}
