//! Shapes of rendered relations: singular objects, plural arrays and nested pagination

#[cfg(test)]
mod relation_shapes_tests {
    use std::collections::HashSet;

    use regex::Regex;
    use serde_json::json;

    use crate::fixtures::{compile, middle_earth};
    use nestql::config::CompilerConfig;
    use nestql::query_compiler::{FieldSelection, Mapper, QueryInput};

    #[test]
    fn test_singular_relations_render_object_or_null() {
        let query = compile(
            "Person",
            json!({ "fellowship": { "name": {} }, "ring": { "name": {} } }),
            None,
            None,
        )
        .unwrap();

        assert!(!query.sql.contains("json_agg"));
        assert!(query.sql.contains(
            "LEFT OUTER JOIN LATERAL (SELECT json_build_object('name', t_e2.name) AS value FROM \"fellowship\" AS t_e2 WHERE t_e2.id = t_e1.fellowship_id) AS t_s1 ON TRUE"
        ));
        // Inverse one-to-one keeps at most one row
        assert!(query.sql.contains(
            "LEFT OUTER JOIN LATERAL (SELECT json_build_object('name', t_e3.name) AS value FROM \"ring\" AS t_e3 WHERE t_e3.bearer_id = t_e1.id LIMIT 1) AS t_s2 ON TRUE"
        ));
        assert!(query.sql.starts_with(
            "SELECT json_build_object('fellowship', t_s1.value, 'ring', t_s2.value) AS val"
        ));
    }

    #[test]
    fn test_owning_one_to_one() {
        let query = compile("Ring", json!({ "bearer": { "name": {} } }), None, None).unwrap();
        assert!(query
            .sql
            .contains("FROM \"person\" AS t_e2 WHERE t_e2.id = t_e1.bearer_id) AS t_s1 ON TRUE"));
        assert!(!query.sql.contains("LIMIT"));
    }

    #[test]
    fn test_plural_relations_always_aggregate_to_arrays() {
        let relations = [
            ("Fellowship", "members"),
            ("Battle", "warriors"),
            ("Person", "battles"),
        ];
        for (entity, relation) in relations {
            let query = compile(entity, json!({ relation: { "id": {} } }), None, None).unwrap();
            assert!(
                query.sql.contains("coalesce(json_agg(json_build_object('id', t_e2.id)), '[]'::json)"),
                "{}.{}: {}",
                entity,
                relation,
                query.sql
            );
        }
    }

    #[test]
    fn test_inverse_many_to_many_swaps_pivot_columns() {
        let query = compile("Person", json!({ "battles": { "name": {} } }), None, None).unwrap();
        assert!(query.sql.contains(
            "WHERE t_e2.id IN (SELECT t_j1.battle_id FROM \"battle_warriors\" AS t_j1 WHERE t_j1.warrior_id = t_e1.id)"
        ));
    }

    #[test]
    fn test_relation_pagination_nests_before_aggregation() {
        let query = compile(
            "Fellowship",
            json!({
                "name": {},
                "members": {
                    "name": {},
                    "__arguments": { "pagination": { "limit": 2, "offset": 1, "orderBy": [{ "name": "desc" }] } }
                }
            }),
            None,
            None,
        )
        .unwrap();

        assert!(query.sql.contains(
            "LEFT OUTER JOIN LATERAL (SELECT coalesce(json_agg(t_p1.value ORDER BY t_p1.row_index), '[]'::json) AS value FROM \
             (SELECT json_build_object('name', t_e2.name) AS value, row_number() OVER (ORDER BY t_e2.name desc) AS row_index \
             FROM \"person\" AS t_e2 WHERE t_e2.fellowship_id = t_e1.id ORDER BY t_e2.name desc LIMIT 2 OFFSET 1) AS t_p1) AS t_s1 ON TRUE"
        ));
        // The root statement itself stays unpaginated
        assert!(query.sql.ends_with("AS t_s1 ON TRUE"));
    }

    #[test]
    fn test_unordered_page_aggregates_without_position() {
        let query = compile(
            "Fellowship",
            json!({ "members": { "name": {}, "__arguments": { "pagination": { "limit": 2 } } } }),
            None,
            None,
        )
        .unwrap();
        assert!(query.sql.contains(
            "SELECT coalesce(json_agg(t_p1.value), '[]'::json) AS value FROM \
             (SELECT json_build_object('name', t_e2.name) AS value FROM \"person\" AS t_e2 \
             WHERE t_e2.fellowship_id = t_e1.id LIMIT 2) AS t_p1"
        ));
        assert!(!query.sql.contains("row_number()"));
    }

    #[test]
    fn test_singular_relation_ignores_limit() {
        let query = compile(
            "Person",
            json!({ "fellowship": { "name": {}, "__arguments": { "pagination": { "limit": 3 } } } }),
            None,
            None,
        )
        .unwrap();
        assert!(!query.sql.contains("LIMIT"));
    }

    #[test]
    fn test_relation_without_subfields_selects_primary_key() {
        let query = compile("Person", json!({ "fellowship": {} }), None, None).unwrap();
        assert!(query
            .sql
            .contains("SELECT json_build_object('id', t_e2.id) AS value FROM \"fellowship\" AS t_e2"));
    }

    #[test]
    fn test_deep_nesting_keeps_aliases_unique() {
        let query = compile(
            "Fellowship",
            json!({
                "members": {
                    "name": {},
                    "ring": { "name": {} },
                    "battles": { "warriors": { "fellowship": { "name": {} } } }
                }
            }),
            None,
            None,
        )
        .unwrap();

        let declared = Regex::new(r"AS (t_[espjf]\d+)").unwrap();
        let mut seen = HashSet::new();
        for capture in declared.captures_iter(&query.sql) {
            let alias = capture[1].to_string();
            assert!(seen.insert(alias.clone()), "alias {} declared twice", alias);
        }
        assert!(seen.contains("t_e6"));
        assert!(seen.contains("t_j2"));
    }

    #[test]
    fn test_wide_objects_are_chunked() {
        let registry = middle_earth();
        let config = CompilerConfig {
            json_chunk_size: 2,
            ..Default::default()
        };
        let fields = FieldSelection::new().field("id").field("name").field("born");
        let query = Mapper::new(&registry, &config)
            .build_query_and_bindings_for(&QueryInput::new("Person", &fields))
            .unwrap();
        assert!(query.sql.starts_with(
            "SELECT (json_build_object('id', t_e1.id, 'name', t_e1.name)::jsonb || json_build_object('born', t_e1.born_year)::jsonb)::json AS val"
        ));
    }
}
