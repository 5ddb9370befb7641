//! QueryManager against a mocked executor: compile, execute, decode, resolve computed fields

#[cfg(test)]
mod query_manager_tests {
    use std::sync::Arc;

    use serde_json::json;
    use test_case::test_case;

    use crate::{middle_earth, row, MockExecutor};
    use nestql::config::CompilerConfig;
    use nestql::query_compiler::{
        build_query_and_bindings_for, CompileError, CustomField, CustomFieldRegistry,
        FieldSelection, QueryInput,
    };
    use nestql::query_manager::{QueryError, QueryManager, QueryRequest, SelectionSource};

    fn manager(executor: MockExecutor) -> QueryManager {
        QueryManager::new(middle_earth(), Arc::new(executor), CompilerConfig::default())
    }

    fn request(entity: &str, fields: serde_json::Value) -> QueryRequest {
        QueryRequest {
            entity: Some(entity.to_string()),
            fields,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_executor_receives_compiled_statement() {
        let metadata = middle_earth();
        let config = CompilerConfig::default();
        let fields = FieldSelection::from_value(&json!({ "name": {} })).unwrap();
        let filter = json!({ "name_like": "F%" });
        let expected = build_query_and_bindings_for(
            metadata.as_ref(),
            &config,
            &QueryInput::new("Person", &fields).with_filter(filter.as_object().unwrap()),
        )
        .unwrap();

        let mut executor = MockExecutor::new();
        let (expected_sql, expected_bindings) = (expected.sql.clone(), expected.bindings.clone());
        executor
            .expect_execute_query()
            .withf(move |sql, bindings| sql == expected_sql && bindings == &expected_bindings)
            .times(1)
            .returning(|_, _| Ok(vec![row(json!("{\"name\": \"Frodo\"}"))]));

        let manager = QueryManager::new(metadata, Arc::new(executor), config);
        let mut source = request("Person", json!({ "name": {} }));
        source.filter = filter.as_object().cloned();

        assert_eq!(manager.build_query(&source).unwrap(), expected);
        let records = manager.get_query_results_for(&source).await.unwrap();
        assert_eq!(records, vec![json!({ "name": "Frodo" })]);
    }

    #[tokio::test]
    async fn test_rows_decode_in_executor_order() {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().returning(|_, _| {
            Ok(vec![
                row(json!({ "name": "Company", "members": [{ "name": "Sam" }] })),
                row(json!("{\"name\": \"Fellowship\", \"members\": []}")),
            ])
        });

        let fields = json!({ "name": {}, "members": { "name": {} } });
        let records = manager(executor)
            .get_query_results_for(&request("Fellowship", fields))
            .await
            .unwrap();
        assert_eq!(
            records,
            vec![
                json!({ "name": "Company", "members": [{ "name": "Sam" }] }),
                json!({ "name": "Fellowship", "members": [] }),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_rows_is_empty_result() {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().returning(|_, _| Ok(vec![]));
        let records = manager(executor)
            .get_query_results_for(&request("Ring", json!({ "id": {} })))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_computed_fields_resolve_at_every_level() {
        let mut computed = CustomFieldRegistry::new();
        computed.register(
            "Person",
            CustomField::new("title", ["name", "born_year"], |raw| {
                json!(format!(
                    "{} of {}",
                    raw.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
                    raw.get("born_year").cloned().unwrap_or_default()
                ))
            }),
        );

        let mut executor = MockExecutor::new();
        executor
            .expect_execute_query()
            .withf(|sql, _| {
                sql.contains("'title', NULL") && sql.contains("'__raw', json_build_object(")
            })
            .returning(|_, _| {
                Ok(vec![row(json!({
                    "name": "Company",
                    "members": [
                        { "title": null, "__raw": { "name": "Frodo", "born_year": 2968 } },
                        { "title": null, "__raw": { "name": "Sam", "born_year": 2980 } }
                    ]
                }))])
            });

        let manager = manager(executor).with_custom_fields(computed);
        let records = manager
            .get_query_results_for(&request(
                "Fellowship",
                json!({ "name": {}, "members": { "title": {} } }),
            ))
            .await
            .unwrap();

        assert_eq!(
            records,
            vec![json!({
                "name": "Company",
                "members": [{ "title": "Frodo of 2968" }, { "title": "Sam of 2980" }]
            })]
        );
    }

    #[tokio::test]
    async fn test_executor_failure_propagates() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute_query()
            .returning(|_, _| Err("connection reset by peer".into()));

        let err = manager(executor)
            .get_query_results_for(&request("Person", json!({ "id": {} })))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
        assert_eq!(err.to_string(), "connection reset by peer");
    }

    #[tokio::test]
    async fn test_row_without_value_column_is_rejected() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute_query()
            .returning(|_, _| Ok(vec![row(json!({ "id": 1 })), Default::default()]));

        let err = manager(executor)
            .get_query_results_for(&request("Person", json!({ "id": {} })))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRow { index: 1, .. }));
    }

    #[test_case(None ; "entity missing")]
    #[test_case(Some("") ; "entity blank")]
    #[tokio::test]
    async fn test_request_without_entity_never_executes(entity: Option<&str>) {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().never();

        let source = QueryRequest {
            entity: entity.map(str::to_string),
            fields: json!({ "id": {} }),
            ..Default::default()
        };
        let err = manager(executor).get_query_results_for(&source).await.unwrap_err();
        assert!(matches!(err, QueryError::MissingEntity));
    }

    #[tokio::test]
    async fn test_unknown_entity_never_executes() {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().never();

        let err = manager(executor)
            .get_query_results_for(&request("Dragon", json!({ "id": {} })))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownEntity(ref name) if name == "Dragon"));
    }

    #[tokio::test]
    async fn test_compile_errors_surface_before_execution() {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().never();

        let err = manager(executor)
            .get_query_results_for(&request("Person", json!({ "height": {} })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Compile(CompileError::UnresolvedField { ref key, .. }) if key == "height"
        ));
    }

    #[tokio::test]
    async fn test_get_many_runs_every_request() {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().times(2).returning(|sql, _| {
            if sql.contains("FROM \"ring\"") {
                Ok(vec![row(json!({ "name": "The One Ring" }))])
            } else {
                Ok(vec![row(json!({ "name": "Frodo" })), row(json!({ "name": "Sam" }))])
            }
        });

        let rings = request("Ring", json!({ "name": {} }));
        let people = request("Person", json!({ "name": {} }));
        let sources: Vec<&dyn SelectionSource> = vec![&rings, &people];
        let results = manager(executor).get_many(&sources).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], vec![json!({ "name": "The One Ring" })]);
        assert_eq!(results[1].len(), 2);
    }

    #[tokio::test]
    async fn test_get_many_fails_on_first_error() {
        let mut executor = MockExecutor::new();
        executor.expect_execute_query().returning(|_, _| Ok(vec![]));

        let good = request("Ring", json!({ "name": {} }));
        let bad = request("Dragon", json!({ "name": {} }));
        let sources: Vec<&dyn SelectionSource> = vec![&good, &bad];
        let err = manager(executor).get_many(&sources).await.unwrap_err();
        assert!(matches!(err, QueryError::UnknownEntity(_)));
    }
}
