//! SELECT statements decoded from JSON and lowered end to end.

use pretty_assertions::assert_eq;
use serde_json::json;

use sqm_lowering::config::LoweringConfig;
use sqm_lowering::domain_catalog::{JdbcMapping, JdbcType};
use sqm_lowering::sql_ast::{Expression, JdbcParameter, Predicate, SqlAstJoinType};
use sqm_lowering::sqm::builder::{eq, SqmBuilder};
use sqm_lowering::sqm::{
    BindingsDocument, LockMode, QueryOptions, QueryParameterBindings, SqmQueryPart, SqmStatement,
};
use sqm_lowering::{compile, LoweringError};

use super::{column, equality, hr_model};

fn employees_managed_by() -> SqmStatement {
    serde_json::from_value(json!({
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
    }))
    .expect("statement decodes")
}

fn bindings(document: serde_json::Value) -> QueryParameterBindings {
    serde_json::from_value::<BindingsDocument>(document)
        .expect("bindings decode")
        .into()
}

#[test]
fn test_implicit_join_and_parameter_typing() {
    let model = hr_model();
    let statement = employees_managed_by();
    let bindings = bindings(json!({ "named": { "boss": { "value": { "single": "Grace" } } } }));

    let (translation, xref) = compile(
        &statement,
        &model,
        &bindings,
        &QueryOptions::default(),
        &LoweringConfig::default(),
    )
    .unwrap();

    let query_spec = &translation.statement.as_select().unwrap().query_spec;
    let root = &query_spec.from_clause.roots[0];
    assert_eq!(root.primary_table_reference.table_expression, "employees");
    assert_eq!(root.primary_table_reference.identification_variable, "e1_0");

    let manager = &root.table_group_joins[0];
    assert!(manager.implicit);
    assert_eq!(manager.join_type, SqlAstJoinType::Inner);
    assert_eq!(manager.joined_group.primary_table_reference.identification_variable, "m1_0");
    assert_eq!(
        equality(manager.predicate.as_ref().unwrap()),
        ("e1_0.manager_id".to_string(), "m1_0.id".to_string())
    );

    match query_spec.where_clause.as_ref() {
        Some(Predicate::Comparison { left, right, .. }) => {
            assert_eq!(column(left).qualified_name(), "m1_0.name");
            assert_eq!(
                *right,
                Expression::Parameter(JdbcParameter {
                    index: 0,
                    jdbc_mapping: JdbcMapping::with_length(JdbcType::Varchar, 255),
                })
            );
        }
        other => panic!("unexpected where clause {:?}", other),
    }
    assert_eq!(xref.occurrence_count(), 1);
    assert_eq!(translation.jdbc_parameter_count(), 1);
}

#[test]
fn test_translation_serializes_to_json() {
    let model = hr_model();
    let bindings = bindings(json!({ "named": { "boss": { "value": { "single": "Grace" } } } }));
    let (translation, _) = compile(
        &employees_managed_by(),
        &model,
        &bindings,
        &QueryOptions::default(),
        &LoweringConfig::default(),
    )
    .unwrap();

    let value = serde_json::to_value(&translation).unwrap();
    assert_eq!(value["statement"]["kind"], json!("select"));
    assert_eq!(value["affected_table_names"], json!(["employees"]));
    assert_eq!(value["jdbc_parameters"]["0"][0]["jdbc_mapping"]["jdbc_type"], json!("varchar"));
    assert_eq!(
        value["statement"]["query_spec"]["where_clause"]["left"]["qualifier"],
        json!("m1_0")
    );
    assert_eq!(value["fetched_paths"], json!([]));
}

#[test]
fn test_multi_valued_in_list_padded() {
    let model = hr_model();
    let statement: SqmStatement = serde_json::from_value(json!({
        "kind": "select",
        "query_part": {
            "kind": "spec",
            "from_clause": {
                "roots": [{
                    "navigable_path": "Employee(e)",
                    "source": { "kind": "entity", "entity_name": "Employee" }
                }]
            },
            "where_clause": {
                "kind": "in_list",
                "test_expression": { "kind": "path", "navigable_path": "Employee(e).id" },
                "list_expressions": [
                    { "kind": "parameter", "id": 0, "key": { "named": "ids" }, "allow_multi_valued": true }
                ]
            }
        }
    }))
    .unwrap();
    let bindings = bindings(json!({ "named": { "ids": { "value": { "multi": [3, 5, 8] } } } }));
    let config = LoweringConfig {
        in_clause_parameter_padding: true,
        ..LoweringConfig::default()
    };

    let (translation, xref) = compile(&statement, &model, &bindings, &QueryOptions::default(), &config).unwrap();

    let query_spec = &translation.statement.as_select().unwrap().query_spec;
    match query_spec.where_clause.as_ref() {
        Some(Predicate::InList { list_expressions, negated, .. }) => {
            assert!(!negated);
            let indexes: Vec<_> = list_expressions
                .iter()
                .flat_map(|e| e.jdbc_parameters())
                .map(|p| p.index)
                .collect();
            assert_eq!(indexes, vec![0, 1, 2, 2]);
            assert!(list_expressions
                .iter()
                .flat_map(|e| e.jdbc_parameters())
                .all(|p| p.jdbc_mapping == JdbcMapping::new(JdbcType::Bigint)));
        }
        other => panic!("unexpected where clause {:?}", other),
    }
    assert_eq!(translation.jdbc_parameter_count(), 3);
    assert_eq!(xref.occurrence_count(), 1);
}

#[test]
fn test_lock_options_from_json() {
    let model = hr_model();
    let options: QueryOptions = serde_json::from_value(json!({
        "lock_options": { "lock_mode": "pessimistic_write" }
    }))
    .unwrap();
    let bindings = bindings(json!({ "named": { "boss": { "value": { "single": "Grace" } } } }));

    let (translation, _) = compile(
        &employees_managed_by(),
        &model,
        &bindings,
        &options,
        &LoweringConfig::default(),
    )
    .unwrap();

    let root = &translation.statement.as_select().unwrap().query_spec.from_clause.roots[0];
    assert_eq!(root.lock_mode, LockMode::PessimisticWrite);
    assert_eq!(root.table_group_joins[0].joined_group.lock_mode, LockMode::None);
}

#[test]
fn test_untypeable_parameter_fails_compilation() {
    let model = hr_model();
    let mut statement = employees_managed_by();
    let mut b = SqmBuilder::new();
    if let SqmStatement::Select(select) = &mut statement {
        if let SqmQueryPart::Spec(spec) = &mut select.query_part {
            spec.where_clause = Some(eq(b.named_parameter("boss"), b.named_parameter("deputy")));
        }
    }

    let err = compile(
        &statement,
        &model,
        &QueryParameterBindings::new(),
        &QueryOptions::default(),
        &LoweringConfig::default(),
    )
    .unwrap_err();

    assert!(err.to_string().starts_with("Query compilation failed"));
    match &err.cause {
        LoweringError::Conversion(message) => assert!(message.contains(":boss"), "{}", message),
        other => panic!("expected a conversion error, got {:?}", other),
    }
}
