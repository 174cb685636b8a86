//! SQM statements, bindings and query options as JSON documents.

use pretty_assertions::assert_eq;
use serde_json::json;

use sqm_lowering::sqm::builder::*;
use sqm_lowering::sqm::{
    BindingsDocument, DomainParameterXref, LockMode, NavigablePath, ParameterKey, QueryOptions,
    QueryParameterBindings, SqmExpression, SqmParameterId, SqmPredicate, SqmQueryPart, SqmQuerySpec, SqmStatement,
};

fn employees_by_manager() -> serde_json::Value {
    json!({
        "kind": "select",
        "query_part": {
            "kind": "spec",
            "from_clause": {
                "roots": [{
                    "navigable_path": "Employee(e)",
                    "source": { "kind": "entity", "entity_name": "Employee" }
                }]
            },
            "select_clause": {
                "selections": [{
                    "selectable": {
                        "kind": "expression",
                        "expression": { "kind": "path", "navigable_path": "Employee(e).name" }
                    }
                }]
            },
            "where_clause": {
                "kind": "comparison",
                "left": { "kind": "path", "navigable_path": "Employee(e).manager.name" },
                "operator": "equal",
                "right": { "kind": "parameter", "id": 0, "key": { "named": "boss" } }
            }
        }
    })
}

#[test]
fn test_select_document_matches_builder() {
    let statement: SqmStatement = serde_json::from_value(employees_by_manager()).unwrap();

    let mut b = SqmBuilder::new();
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let built = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path, "name")))
            .with_where(eq(attr(&e_path.append("manager"), "name"), b.named_parameter("boss"))),
    );

    assert_eq!(statement, built);
    assert_eq!(statement.kind_name(), "select");
}

#[test]
fn test_navigable_path_text_form() {
    let path: NavigablePath = serde_json::from_value(json!("Employee(e).manager(m).name")).unwrap();
    let expected = NavigablePath::root("Employee", Some("e"))
        .append_with_alias("manager", "m")
        .append("name");
    assert_eq!(path, expected);
    assert_eq!(serde_json::to_value(&path).unwrap(), json!("Employee(e).manager(m).name"));
    assert_eq!(path.parent(), Some(NavigablePath::root("Employee", Some("e")).append_with_alias("manager", "m")));

    assert!(serde_json::from_value::<NavigablePath>(json!("Employee(e")).is_err());
}

#[test]
fn test_parameter_occurrences_cross_referenced() {
    let mut document = employees_by_manager();
    document["query_part"]["where_clause"] = json!({
        "kind": "junction",
        "operator": "or",
        "predicates": [
            document["query_part"]["where_clause"].clone(),
            {
                "kind": "in_list",
                "test_expression": { "kind": "path", "navigable_path": "Employee(e).id" },
                "list_expressions": [
                    { "kind": "parameter", "id": 1, "key": { "positional": 1 }, "allow_multi_valued": true }
                ]
            },
            {
                "kind": "comparison",
                "left": { "kind": "path", "navigable_path": "Employee(e).name" },
                "operator": "not_equal",
                "right": { "kind": "parameter", "id": 2, "key": { "named": "boss" } }
            }
        ]
    });
    let statement: SqmStatement = serde_json::from_value(document).unwrap();

    let xref = DomainParameterXref::from_statement(&statement);
    assert_eq!(xref.occurrence_count(), 3);
    assert_eq!(xref.occurrences(&ParameterKey::Named("boss".into())).len(), 2);
    assert_eq!(xref.query_parameter(SqmParameterId(1)), Some(&ParameterKey::Positional(1)));
    assert!(xref.occurrences(&ParameterKey::Positional(1))[0].allow_multi_valued);

    match &statement {
        SqmStatement::Select(select) => match &select.query_part {
            SqmQueryPart::Spec(spec) => {
                assert!(matches!(spec.where_clause, Some(SqmPredicate::Junction { .. })))
            }
            other => panic!("expected a query spec, got {:?}", other),
        },
        other => panic!("expected a select, got {:?}", other),
    }
}

#[test]
fn test_dml_document() {
    let statement: SqmStatement = serde_json::from_value(json!({
        "kind": "update",
        "target": {
            "navigable_path": "Employee(e)",
            "source": { "kind": "entity", "entity_name": "Employee" }
        },
        "assignments": [{
            "target_path": "Employee(e).salary",
            "value": { "kind": "literal", "value": 1000 }
        }]
    }))
    .unwrap();

    match statement {
        SqmStatement::Update(update) => {
            assert_eq!(update.target.navigable_path, NavigablePath::root("Employee", Some("e")));
            assert_eq!(update.assignments[0].target_path.local_name(), "salary");
            assert_eq!(
                update.assignments[0].value,
                SqmExpression::Literal {
                    value: json!(1000),
                    value_mapping: None,
                }
            );
            assert_eq!(update.where_clause, None);
        }
        other => panic!("expected an update, got {}", other.kind_name()),
    }
}

#[test]
fn test_bindings_and_options_documents() {
    let document: BindingsDocument = serde_json::from_value(json!({
        "named": {
            "ids": { "value": { "multi": [3, 5, 8] } },
            "since": { "bind_type": { "basic": { "jdbc_type": "date" } }, "value": { "single": "2024-01-01" } }
        }
    }))
    .unwrap();
    let bindings = QueryParameterBindings::from(document);
    assert_eq!(bindings.len(), 2);
    let since = bindings.binding(&ParameterKey::Named("since".into())).unwrap();
    assert!(since.bind_type.is_some());
    assert!(!since.is_multi_valued());

    let options: QueryOptions = serde_json::from_value(json!({
        "lock_options": { "lock_mode": "pessimistic_write", "alias_specific": { "d": "read" } }
    }))
    .unwrap();
    assert_eq!(options.lock_options.lock_mode, LockMode::PessimisticWrite);
    assert_eq!(options.lock_options.alias_specific.get("d"), Some(&LockMode::Read));
    assert!(options.lock_options.lock_mode.is_pessimistic());

    let defaults: QueryOptions = serde_json::from_value(json!({})).unwrap();
    assert_eq!(defaults, QueryOptions::default());
}
