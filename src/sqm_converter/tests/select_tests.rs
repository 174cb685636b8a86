//! Top-level SELECT lowering: clause order, select list shapes, selection
//! de-duplication, fetches, lock modes and query transformers.

use std::cell::RefCell;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::sql_ast::expression::{JdbcParameter, QueryLiteral};
use crate::sql_ast::predicate::Predicate;
use crate::sql_ast::statement::{Clause, DomainResult};
use crate::sql_ast::table_group::SqlAstJoinType;
use crate::sqm::builder::*;
use crate::sqm::parameters::QueryParameterBinding;
use crate::sqm::query_options::{LockMode, LockOptions};
use crate::sqm::tree::{ComparisonOperator, SortOrder, SqmJoinType, SqmQuerySpec};
use crate::sqm_converter::{ClauseTransition, ContextDepths, SqmToSqlAstConverter};

#[test]
fn test_simple_filtered_selection() {
    let mut b = SqmBuilder::new();
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path, "name")))
            .with_where(comparison(
                attr(&e_path, "salary"),
                ComparisonOperator::GreaterThan,
                b.named_parameter("minSalary"),
            )),
    );
    let bindings = QueryParameterBindings::new().with_named("minSalary", QueryParameterBinding::single(json!(50000)));

    let translation = lower(&statement, &bindings).unwrap();
    let query_spec = query_spec_of(&translation);

    assert!(query_spec.is_root);
    assert_eq!(root_group(query_spec).primary_table_reference.table_expression, "employees");
    assert_eq!(root_group(query_spec).primary_table_reference.identification_variable, "e1_0");
    assert_eq!(selected_columns(query_spec), vec!["e1_0.name"]);

    match query_spec.where_clause.as_ref().unwrap() {
        Predicate::Comparison { left, operator, right } => {
            assert_eq!(column(left).qualified_name(), "e1_0.salary");
            assert_eq!(*operator, ComparisonOperator::GreaterThan);
            assert_eq!(
                *right,
                Expression::Parameter(JdbcParameter {
                    index: 0,
                    jdbc_mapping: JdbcMapping::new(JdbcType::Decimal),
                })
            );
        }
        other => panic!("unexpected predicate {:?}", other),
    }

    assert_eq!(translation.jdbc_parameters.len(), 1);
    assert_eq!(translation.jdbc_parameter_count(), 1);
    assert_eq!(
        translation.affected_table_names.iter().collect::<Vec<_>>(),
        vec!["employees"]
    );
}

#[test]
fn test_clauses_entered_in_order_and_stacks_balanced() {
    let mut b = SqmBuilder::new();
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path, "name")))
            .with_where(eq(attr(&e_path, "name"), b.named_parameter("name")))
            .with_group_by(attr(&e_path, "name"))
            .with_having(comparison(
                function("count", vec![attr(&e_path, "id")]),
                ComparisonOperator::GreaterThan,
                literal(json!(1)),
            ))
            .with_order_by(attr(&e_path, "name"), SortOrder::Ascending)
            .with_fetch(literal(json!(10)))
            .with_offset(literal(json!(20))),
    );
    let bindings = QueryParameterBindings::new().with_named("name", QueryParameterBinding::single(json!("Ann")));
    let model = model();
    let options = QueryOptions::default();
    let config = LoweringConfig::default();
    let mut xref = DomainParameterXref::from_statement(&statement);
    let entered = RefCell::new(Vec::new());

    {
        let mut converter = SqmToSqlAstConverter::new(&model, &bindings, &mut xref, &options, &config)
            .with_clause_listener(|clause, transition| {
                if transition == ClauseTransition::Enter {
                    entered.borrow_mut().push(clause);
                }
            });
        converter.translate(&statement).unwrap();
        assert_eq!(converter.context_depths(), ContextDepths::default());
        assert_eq!(converter.current_clause(), None);
    }

    assert_eq!(
        entered.into_inner(),
        vec![
            Clause::From,
            Clause::Select,
            Clause::Where,
            Clause::GroupBy,
            Clause::Having,
            Clause::OrderBy,
            Clause::Fetch,
            Clause::Offset,
        ]
    );
}

#[test]
fn test_row_count_literals_are_integers() {
    let e = entity_root("Employee", "e");
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_fetch(literal(json!(10)))
            .with_offset(literal(json!(5))),
    );
    let translation = lower(&statement, &QueryParameterBindings::new()).unwrap();
    let query_spec = query_spec_of(&translation);
    assert_eq!(
        query_spec.fetch,
        Some(Expression::Literal(QueryLiteral {
            value: json!(10),
            jdbc_mapping: JdbcMapping::new(JdbcType::Integer),
        }))
    );
    assert!(matches!(
        query_spec.offset,
        Some(Expression::Literal(QueryLiteral { ref jdbc_mapping, .. })) if jdbc_mapping.jdbc_type == JdbcType::Integer
    ));
}

#[test]
fn test_roots_selected_when_select_list_is_missing() {
    let statement = SqmStatement::select(SqmQuerySpec::from_root(entity_root("Employee", "e")));
    let translation = lower(&statement, &QueryParameterBindings::new()).unwrap();
    let query_spec = query_spec_of(&translation);

    assert_eq!(
        selected_columns(query_spec),
        vec![
            "e1_0.id",
            "e1_0.name",
            "e1_0.salary",
            "e1_0.street",
            "e1_0.city",
            "e1_0.manager_id",
            "e1_0.department_id",
        ]
    );
    match &query_spec.select_clause.domain_results[..] {
        [DomainResult::Entity {
            entity_name, positions, ..
        }] => {
            assert_eq!(entity_name, "Employee");
            assert_eq!(positions, &vec![0, 1, 2, 3, 4, 5, 6]);
        }
        other => panic!("unexpected domain results {:?}", other),
    }
}

#[test]
fn test_repeated_selection_is_deduplicated() {
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path, "name")))
            .with_selection(aliased_item(attr(&e_path, "name"), "again")),
    );

    let translation = lower(&statement, &QueryParameterBindings::new()).unwrap();
    let query_spec = query_spec_of(&translation);
    assert_eq!(query_spec.select_clause.sql_selections.len(), 1);
    assert_eq!(query_spec.select_clause.domain_results.len(), 2);
    assert!(matches!(
        &query_spec.select_clause.domain_results[1],
        DomainResult::Basic { alias: Some(alias), positions } if alias == "again" && positions == &vec![0]
    ));

    // Turned off per execution
    let options = QueryOptions {
        deduplicate_results: Some(false),
        ..QueryOptions::default()
    };
    let (translation, _) =
        lower_with(&statement, &QueryParameterBindings::new(), &options, &LoweringConfig::default()).unwrap();
    assert_eq!(query_spec_of(&translation).select_clause.sql_selections.len(), 2);
}

#[test]
fn test_embeddable_and_instantiation_results() {
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path, "address")))
            .with_selection(instantiation(
                "EmployeeSummary",
                vec![select_item(path(&e_path)), select_item(attr(&e_path, "name"))],
            )),
    );

    let translation = lower(&statement, &QueryParameterBindings::new()).unwrap();
    let query_spec = query_spec_of(&translation);
    assert_eq!(
        selected_columns(query_spec),
        vec!["e1_0.street", "e1_0.city", "e1_0.id", "e1_0.name"]
    );

    let results = &query_spec.select_clause.domain_results;
    assert!(matches!(
        &results[0],
        DomainResult::Embeddable { embeddable, positions, .. } if embeddable == "Address" && positions == &vec![0, 1]
    ));
    match &results[1] {
        DomainResult::Instantiation { target, arguments, .. } => {
            assert_eq!(target, "EmployeeSummary");
            // an entity inside a constructor is passed by identifier only
            assert!(matches!(&arguments[0], DomainResult::Basic { positions, .. } if positions == &vec![2]));
            assert!(matches!(&arguments[1], DomainResult::Basic { positions, .. } if positions == &vec![3]));
        }
        other => panic!("unexpected domain result {:?}", other),
    }
}

#[test]
fn test_grouping_by_association_uses_foreign_key() {
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path.append("department"), "id")))
            .with_selection(select_item(function("count", vec![attr(&e_path, "id")])))
            .with_group_by(attr(&e_path, "department"))
            .with_having(comparison(
                function("count", vec![attr(&e_path, "id")]),
                ComparisonOperator::GreaterThan,
                literal(json!(1)),
            ))
            .with_order_by(attr(&e_path, "department"), SortOrder::Descending),
    );

    let translation = lower(&statement, &QueryParameterBindings::new()).unwrap();
    let query_spec = query_spec_of(&translation);

    // no join: the foreign key on the owner is enough
    assert!(joins_of(root_group(query_spec)).is_empty());
    assert_eq!(selected_columns(query_spec)[0], "e1_0.department_id");
    assert_eq!(column(&query_spec.group_by[0]).qualified_name(), "e1_0.department_id");
    assert_eq!(
        column(&query_spec.sort_specifications[0].expression).qualified_name(),
        "e1_0.department_id"
    );
    assert_eq!(query_spec.sort_specifications[0].order, SortOrder::Descending);

    match query_spec.having.as_ref().unwrap() {
        Predicate::Comparison { left, right, .. } => {
            assert!(matches!(left, Expression::Function { name, aggregate: true, .. } if name == "count"));
            assert_eq!(right.jdbc_mapping(), Some(&JdbcMapping::new(JdbcType::Bigint)));
        }
        other => panic!("unexpected having {:?}", other),
    }
}

#[test]
fn test_fetch_join_appends_fetch_selections() {
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let department = attribute_join(&e_path, "department", Some("d"), SqmJoinType::Inner).fetch();
    let d_path = department.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e.with_join(department)).with_selection(select_item(path(&e_path))),
    );

    let translation = lower(&statement, &QueryParameterBindings::new()).unwrap();
    let query_spec = query_spec_of(&translation);
    let join = &joins_of(root_group(query_spec))[0];

    assert_eq!(join.join_type, SqlAstJoinType::Inner);
    assert!(join.joined_group.fetched);
    assert_eq!(join.joined_group.primary_table_reference.identification_variable, "d1_0");
    assert_eq!(translation.fetched_paths, vec![d_path.clone()]);

    let results = &query_spec.select_clause.domain_results;
    assert_eq!(results.len(), 2);
    match &results[1] {
        DomainResult::Fetch {
            navigable_path,
            entity_name,
            positions,
        } => {
            assert_eq!(navigable_path, &d_path);
            assert_eq!(entity_name, "Department");
            assert_eq!(positions, &vec![7, 8]);
        }
        other => panic!("unexpected domain result {:?}", other),
    }

    // the department restriction filters the inner join from WHERE
    assert_eq!(
        query_spec.where_clause,
        Some(Predicate::SqlFragment {
            sql: "active = true".to_string(),
            qualifier: "d1_0".to_string(),
        })
    );
    assert_eq!(
        translation.affected_table_names.iter().collect::<Vec<_>>(),
        vec!["departments", "employees"]
    );
}

#[test]
fn test_lock_modes_applied_to_top_level_roots() {
    let e = entity_root("Employee", "e");
    let d = entity_root("Department", "d");
    let statement = SqmStatement::select(SqmQuerySpec::from_root(e).with_root(d));
    let options = QueryOptions {
        lock_options: LockOptions {
            lock_mode: LockMode::PessimisticRead,
            ..LockOptions::default()
        }
        .with_alias_lock_mode("e", LockMode::PessimisticWrite),
        ..QueryOptions::default()
    };

    let (translation, _) =
        lower_with(&statement, &QueryParameterBindings::new(), &options, &LoweringConfig::default()).unwrap();
    let roots = &query_spec_of(&translation).from_clause.roots;
    assert_eq!(roots[0].lock_mode, LockMode::PessimisticWrite);
    assert_eq!(roots[1].lock_mode, LockMode::PessimisticRead);
}

#[test]
fn test_query_transformers_run_on_lowered_spec() {
    let statement = SqmStatement::select(SqmQuerySpec::from_root(entity_root("Employee", "e")));
    let model = model();
    let bindings = QueryParameterBindings::new();
    let options = QueryOptions::default();
    let config = LoweringConfig::default();
    let mut xref = DomainParameterXref::from_statement(&statement);

    let mut converter = SqmToSqlAstConverter::new(&model, &bindings, &mut xref, &options, &config)
        .with_query_transformer(|query_spec: &mut QuerySpec| {
            query_spec.select_clause.distinct = true;
            Ok::<(), LoweringError>(())
        });
    let translation = converter.translate(&statement).unwrap();
    assert!(query_spec_of(&translation).select_clause.distinct);
}

#[test]
fn test_failing_query_transformer_leaves_stacks_balanced() {
    let e = entity_root("Employee", "e");
    let e_path = e.navigable_path.clone();
    let inner = entity_root("Employee", "r");
    let r_path = inner.navigable_path.clone();
    let statement = SqmStatement::select(
        SqmQuerySpec::from_root(e)
            .with_selection(select_item(attr(&e_path, "name")))
            .with_where(exists(
                SqmQuerySpec::from_root(inner).with_selection(select_item(attr(&r_path, "id"))),
            )),
    );
    let model = model();
    let bindings = QueryParameterBindings::new();
    let options = QueryOptions::default();
    let config = LoweringConfig::default();
    let mut xref = DomainParameterXref::from_statement(&statement);
    let seen = RefCell::new(Vec::new());

    {
        let mut converter = SqmToSqlAstConverter::new(&model, &bindings, &mut xref, &options, &config)
            .with_query_transformer(|query_spec: &mut QuerySpec| {
                seen.borrow_mut().push(query_spec.is_root);
                if query_spec.is_root {
                    Ok(())
                } else {
                    Err(LoweringError::internal("subqueries are not supported here"))
                }
            });
        let err = converter.translate(&statement).unwrap_err();
        assert!(matches!(err, LoweringError::Internal(_)));
        assert_eq!(converter.context_depths(), ContextDepths::default());
    }
    // the failure in the subquery stops lowering before the root spec
    assert_eq!(seen.into_inner(), vec![false]);
}
