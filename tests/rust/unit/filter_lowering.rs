//! Filter expressions: operators, combinators and relation existence tests

#[cfg(test)]
mod filter_lowering_tests {
    use serde_json::json;

    use crate::fixtures::compile;
    use nestql::config::CompilerConfig;
    use nestql::entity_catalog::{EntityMetadata, EntityProperty, MetadataRegistry};
    use nestql::query_compiler::{CompileError, FieldSelection, Mapper, QueryInput};

    fn person_where(filter: serde_json::Value) -> nestql::CompiledQuery {
        compile("Person", json!({ "id": {} }), Some(filter), None).unwrap()
    }

    fn where_clause(sql: &str) -> &str {
        let start = sql.find(" WHERE ").expect("statement should have a WHERE clause");
        &sql[start + " WHERE ".len()..]
    }

    #[test]
    fn test_join_free_or_keeps_every_branch() {
        let query = person_where(json!({ "_or": [{ "name": "Frodo" }, { "name": "Sam" }] }));

        assert_eq!(
            where_clause(&query.sql),
            "(t_e1.name = :t_e1_name_1) OR (t_e1.name = :t_e1_name_2)"
        );
        assert_eq!(query.bindings["t_e1_name_1"], json!("Frodo"));
        assert_eq!(query.bindings["t_e1_name_2"], json!("Sam"));
    }

    #[test]
    fn test_or_with_relation_branch_becomes_key_union() {
        let query = person_where(json!({
            "_or": [{ "name": "Frodo" }, { "fellowship": { "name": "Company" } }]
        }));

        assert_eq!(
            where_clause(&query.sql),
            "t_e1.id IN (SELECT t_e1.id FROM \"person\" AS t_e1 WHERE t_e1.name = :t_e1_name_1 \
             UNION ALL SELECT t_e1.id FROM \"person\" AS t_e1 INNER JOIN LATERAL \
             (SELECT 1 AS matched FROM \"fellowship\" AS t_e2 WHERE (t_e2.id = t_e1.fellowship_id) \
             AND (t_e2.name = :t_e2_name_2) LIMIT 1) AS t_f1 ON TRUE)"
        );
        assert_eq!(query.bindings.len(), 2);
    }

    #[test]
    fn test_and_distributes_over_or() {
        let query = person_where(json!({
            "_and": [
                { "born_gte": 2900 },
                { "_or": [{ "name": "Frodo" }, { "name": "Sam" }] }
            ]
        }));

        assert_eq!(
            where_clause(&query.sql),
            "(t_e1.born_year >= :t_e1_born_1) AND ((t_e1.name = :t_e1_name_2) OR (t_e1.name = :t_e1_name_3))"
        );
    }

    #[test]
    fn test_not_negates_any_of_its_children() {
        let query = person_where(json!({ "_not": [{ "name": "Gollum" }, { "name": "Smeagol" }] }));
        assert_eq!(
            where_clause(&query.sql),
            "NOT ((t_e1.name = :t_e1_name_1) OR (t_e1.name = :t_e1_name_2))"
        );
    }

    const FELLOWSHIP_JOIN: &str = "INNER JOIN LATERAL (SELECT 1 AS matched FROM \"fellowship\" AS t_e2 \
         WHERE (t_e2.id = t_e1.fellowship_id) AND (t_e2.name = :t_e2_name_2) LIMIT 1) AS t_f1 ON TRUE";

    #[test]
    fn test_not_over_relation_uses_key_membership() {
        let query = person_where(json!({ "_not": { "fellowship": { "name": "Mordor" } } }));
        assert_eq!(
            where_clause(&query.sql),
            "NOT (t_e1.id IN (SELECT t_e1.id FROM \"person\" AS t_e1 INNER JOIN LATERAL \
             (SELECT 1 AS matched FROM \"fellowship\" AS t_e2 WHERE (t_e2.id = t_e1.fellowship_id) \
             AND (t_e2.name = :t_e2_name_1) LIMIT 1) AS t_f1 ON TRUE))"
        );
        assert_eq!(query.bindings["t_e2_name_1"], json!("Mordor"));
    }

    #[test]
    fn test_not_over_mixed_children_unions_every_child() {
        let query = person_where(json!({
            "_not": [{ "name": "Gollum" }, { "fellowship": { "name": "Company" } }]
        }));
        assert_eq!(
            where_clause(&query.sql),
            format!(
                "NOT (t_e1.id IN (SELECT t_e1.id FROM \"person\" AS t_e1 WHERE t_e1.name = :t_e1_name_1 \
                 UNION ALL SELECT t_e1.id FROM \"person\" AS t_e1 {}))",
                FELLOWSHIP_JOIN
            )
        );
    }

    #[test]
    fn test_and_of_joined_or_groups_takes_every_combination() {
        let query = person_where(json!({
            "_and": [
                { "_or": [{ "name": "Frodo" }, { "fellowship": { "name": "Company" } }] },
                { "_or": [{ "born_gte": 2900 }, { "ring": { "name": "Nenya" } }] }
            ]
        }));

        let ring_join = "INNER JOIN LATERAL (SELECT 1 AS matched FROM \"ring\" AS t_e3 \
             WHERE (t_e3.bearer_id = t_e1.id) AND (t_e3.name = :t_e3_name_4) LIMIT 1) AS t_f2 ON TRUE";
        let keys = "SELECT t_e1.id FROM \"person\" AS t_e1";
        let expected = format!(
            "t_e1.id IN ({keys} WHERE (t_e1.name = :t_e1_name_1) AND (t_e1.born_year >= :t_e1_born_3) \
             UNION ALL {keys} {ring} WHERE t_e1.name = :t_e1_name_1 \
             UNION ALL {keys} {fellowship} WHERE t_e1.born_year >= :t_e1_born_3 \
             UNION ALL {keys} {fellowship} {ring})",
            keys = keys,
            fellowship = FELLOWSHIP_JOIN,
            ring = ring_join
        );
        assert_eq!(where_clause(&query.sql), expected);
        assert_eq!(query.bindings.len(), 4);
        assert_eq!(query.to_positional().unwrap().values.len(), 4);
    }

    #[test]
    fn test_null_in_lists_is_tested_separately() {
        let query = person_where(json!({ "name_in": [null, "Frodo"] }));
        assert_eq!(
            where_clause(&query.sql),
            "(t_e1.name IN (:t_e1_name_1) OR t_e1.name IS NULL)"
        );
        assert_eq!(query.bindings.len(), 1);

        let query = person_where(json!({ "name_nin": [null, "Gollum"] }));
        assert_eq!(
            where_clause(&query.sql),
            "(t_e1.name NOT IN (:t_e1_name_1) AND t_e1.name IS NOT NULL)"
        );
    }

    #[test]
    fn test_operator_object_ands_each_operator() {
        let query = person_where(json!({ "born": { "_gte": 2900, "_lt": 3000 } }));
        assert_eq!(
            where_clause(&query.sql),
            "(t_e1.born_year >= :t_e1_born_1) AND (t_e1.born_year < :t_e1_born_2)"
        );
        assert_eq!(query.bindings["t_e1_born_2"], json!(3000));
    }

    #[test]
    fn test_operator_suffixes() {
        let query = person_where(json!({ "name_like": "F%", "id_in": [1, 2, 3] }));
        assert_eq!(
            where_clause(&query.sql),
            "(t_e1.name LIKE :t_e1_name_1) AND (t_e1.id IN (:t_e1_id_2, :t_e1_id_3, :t_e1_id_4))"
        );
        assert_eq!(query.bindings.len(), 4);
    }

    #[test]
    fn test_empty_in_lists_stay_valid() {
        let none = person_where(json!({ "id_in": [] }));
        assert!(none.sql.ends_with("WHERE FALSE"));
        assert!(none.bindings.is_empty());

        let all = person_where(json!({ "id_nin": [] }));
        assert!(all.sql.ends_with("WHERE TRUE"));
        assert!(all.bindings.is_empty());
    }

    #[test]
    fn test_null_comparison_binds_nothing() {
        let query = person_where(json!({ "name": null }));
        assert_eq!(where_clause(&query.sql), "t_e1.name IS NULL");
        assert!(query.bindings.is_empty());
    }

    #[test]
    fn test_relation_filter_is_existence_join() {
        let query = person_where(json!({ "fellowship": { "name": "Company" } }));
        assert_eq!(
            query.sql,
            "SELECT json_build_object('id', t_e1.id) AS val FROM \"person\" AS t_e1 \
             INNER JOIN LATERAL (SELECT 1 AS matched FROM \"fellowship\" AS t_e2 \
             WHERE (t_e2.id = t_e1.fellowship_id) AND (t_e2.name = :t_e2_name_1) LIMIT 1) AS t_f1 ON TRUE"
        );
    }

    #[test]
    fn test_relation_filter_through_pivot() {
        let query = compile(
            "Battle",
            json!({ "name": {} }),
            Some(json!({ "warriors": { "name": "Aragorn" } })),
            None,
        )
        .unwrap();
        assert!(query.sql.contains(
            "INNER JOIN LATERAL (SELECT 1 AS matched FROM \"person\" AS t_e2 \
             WHERE (t_e2.id IN (SELECT t_j1.warrior_id FROM \"battle_warriors\" AS t_j1 WHERE t_j1.battle_id = t_e1.id)) \
             AND (t_e2.name = :t_e2_name_1) LIMIT 1) AS t_f1 ON TRUE"
        ));
    }

    #[test]
    fn test_filtered_and_displayed_relation_get_separate_joins() {
        let query = compile(
            "Fellowship",
            json!({ "members": { "name": {} } }),
            Some(json!({ "members": { "name": "Frodo" } })),
            None,
        )
        .unwrap();

        assert!(query.sql.contains("INNER JOIN LATERAL (SELECT 1 AS matched FROM \"person\" AS t_e3"));
        assert!(query.sql.contains("LEFT OUTER JOIN LATERAL (SELECT coalesce(json_agg("));
        assert!(query.sql.contains("AS t_s1 ON TRUE"));
        assert!(query.sql.contains("AS t_f1 ON TRUE"));
    }

    #[test]
    fn test_relation_scoped_filter_from_arguments() {
        let query = compile(
            "Fellowship",
            json!({ "members": { "name": {}, "__arguments": { "filter": { "name_like": "F%" } } } }),
            None,
            None,
        )
        .unwrap();
        assert!(query
            .sql
            .contains("WHERE (t_e2.fellowship_id = t_e1.id) AND (t_e2.name LIKE :t_e2_name_1)"));
        assert!(!query.sql.contains("INNER JOIN"));
    }

    #[test]
    fn test_parameter_names_are_unique() {
        let query = person_where(json!({
            "name": "Frodo",
            "_or": [{ "name": "Sam" }, { "fellowship": { "name": "Company", "members": { "name": "Pippin" } } }],
            "_not": { "name": "Gollum" }
        }));
        assert_eq!(query.bindings.len(), 5);
        // Every placeholder has a binding and every binding is used
        let positional = query.to_positional().unwrap();
        assert_eq!(positional.values.len(), 5);
    }

    #[test]
    fn test_filter_errors() {
        assert!(matches!(
            compile("Person", json!({ "id": {} }), Some(json!({ "born": { "_near": 3 } })), None),
            Err(CompileError::UnknownOperator { .. })
        ));
        assert!(matches!(
            compile("Person", json!({ "id": {} }), Some(json!({ "_or": 3 })), None),
            Err(CompileError::InvalidFilter { .. })
        ));
        assert!(matches!(
            compile("Person", json!({ "id": {} }), Some(json!({ "fellowship": 3 })), None),
            Err(CompileError::InvalidFilter { .. })
        ));
        assert!(matches!(
            compile("Person", json!({ "id": {} }), Some(json!({ "born_between": [1] })), None),
            Err(CompileError::InvalidOperatorValue { .. })
        ));
        assert!(matches!(
            compile("Person", json!({ "id": {} }), Some(json!({ "height_gt": 1 })), None),
            Err(CompileError::UnresolvedField { .. })
        ));
    }

    #[test]
    fn test_empty_combinators_are_ignored() {
        let query = person_where(json!({ "_or": [], "_and": [], "_not": [] }));
        assert!(!query.sql.contains("WHERE"));
    }

    fn region_registry() -> MetadataRegistry {
        let key = EntityProperty {
            columns: vec!["realm".to_string(), "code".to_string()],
            ..EntityProperty::scalar("key", "composite", "realm")
        };
        MetadataRegistry::new(vec![EntityMetadata::new("Region", "region", ["realm", "code"])
            .with_property(key)
            .with_property(EntityProperty::scalar("name", "string", "name"))])
        .unwrap()
    }

    #[test]
    fn test_multi_column_field() {
        let registry = region_registry();
        let config = CompilerConfig::default();
        let mapper = Mapper::new(&registry, &config);
        let fields = FieldSelection::new().field("key");

        let in_filter = json!({ "key_in": [[1, "sh"], [2, "gd"]] });
        let filter = in_filter.as_object().unwrap();
        let query = mapper
            .build_query_and_bindings_for(&QueryInput::new("Region", &fields).with_filter(filter))
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT json_build_object('key', json_build_array(t_e1.realm, t_e1.code)) AS val FROM \"region\" AS t_e1 \
             WHERE (t_e1.realm, t_e1.code) IN ((:t_e1_key_1, :t_e1_key_2), (:t_e1_key_3, :t_e1_key_4))"
        );

        let eq_filter = json!({ "key_ne": 7 });
        let query = mapper
            .build_query_and_bindings_for(
                &QueryInput::new("Region", &fields).with_filter(eq_filter.as_object().unwrap()),
            )
            .unwrap();
        assert!(query
            .sql
            .ends_with("WHERE (t_e1.realm <> :t_e1_key_1) AND (t_e1.code <> :t_e1_key_2)"));

        let bad = json!({ "key_in": [[1]] });
        let input = QueryInput::new("Region", &fields).with_filter(bad.as_object().unwrap());
        let result = mapper.build_query_and_bindings_for(&input);
        assert_eq!(
            result,
            Err(CompileError::ColumnArityMismatch {
                field: "key".to_string(),
                columns: 2,
                values: 1
            })
        );
    }
}
