// These tests run whole statements through the parser, the binder and the
// transformer, and check the shape of the resulting operator trees through
// their explain output.

#[cfg(test)]
mod tests {
    use crate::config::PlannerConfig;
    use crate::predicate::decompose_conjuncts;
    use crate::query_to_operator::QueryToOperatorTransformer;
    use common::ast::*;
    use common::database::Database;
    use common::ids::TransactionId;
    use common::logical_plan::*;
    use common::sql_parser::SQLParser;
    use common::testutil::*;
    use common::{Attribute, CrustyError, DataType, TableSchema};
    use std::sync::Arc;
    use std::thread;

    fn test_db() -> Database {
        init();
        let db = create_test_database(&[
            ("a", &["id", "x", "z"]),
            ("b", &["id", "y"]),
            ("c", &["id", "w"]),
            ("t", &["id", "a", "b", "x"]),
            ("e", &["id", "k", "j"]),
        ]);
        let schema = TableSchema::new(vec![
            Attribute::new_not_null(String::from("id"), DataType::Int),
            Attribute::new(String::from("v"), DataType::Int),
        ]);
        db.create_table("n", schema).unwrap();
        db
    }

    fn parse(sql: &str) -> Statement {
        SQLParser::new().parse_one(sql).unwrap()
    }

    fn transform_with(
        db: &Database,
        config: PlannerConfig,
        sql: &str,
    ) -> Result<Option<OperatorExpression>, CrustyError> {
        let mut transformer = QueryToOperatorTransformer::with_config(db, TransactionId::new(), config);
        transformer.transform(&parse(sql))
    }

    fn plan(db: &Database, sql: &str) -> OperatorExpression {
        transform_with(db, PlannerConfig::default(), sql)
            .unwrap()
            .unwrap()
    }

    fn explain(db: &Database, sql: &str) -> String {
        plan(db, sql).explain()
    }

    fn transform_err(db: &Database, sql: &str) -> CrustyError {
        match transform_with(db, PlannerConfig::default(), sql) {
            Err(e) => e,
            Ok(tree) => panic!("expected an error, got {:?}", tree),
        }
    }

    /// Every predicate attached anywhere in the tree, split into conjuncts.
    fn attached_conjuncts(tree: &OperatorExpression) -> Vec<String> {
        let mut conjuncts = Vec::new();
        for node in tree.nodes() {
            let predicate = match node.op() {
                LogicalOp::Get(get) => get.predicate.as_ref(),
                LogicalOp::Filter(filter) => Some(&filter.predicate),
                op => op.join_predicate().flatten(),
            };
            if let Some(predicate) = predicate {
                conjuncts.extend(decompose_conjuncts(predicate).iter().map(|c| c.to_string()));
            }
        }
        conjuncts.sort();
        conjuncts
    }

    #[test]
    fn test_implicit_join_pushes_single_table_predicates() {
        let db = test_db();
        let expected = "\
InnerJoin [a.x = b.y]
  Get#0 a [a.z = 1]
  Get#1 b
";
        assert_eq!(
            explain(&db, "SELECT * FROM a, b WHERE a.x = b.y AND a.z = 1"),
            expected
        );
    }

    #[test]
    fn test_unqualified_columns_are_bound() {
        let db = test_db();
        assert_eq!(
            explain(&db, "SELECT * FROM a, b WHERE x = y AND z = 1"),
            explain(&db, "SELECT * FROM a, b WHERE a.x = b.y AND a.z = 1")
        );
    }

    #[test]
    fn test_ambiguous_column() {
        let db = test_db();
        let err = transform_err(&db, "SELECT * FROM a, b WHERE id = 1");
        assert!(matches!(err, CrustyError::ValidationError(_)));
    }

    #[test]
    fn test_count_star_is_plain_aggregate() {
        let db = test_db();
        let tree = plan(&db, "SELECT count(*) FROM t");
        assert_eq!(tree.op(), &LogicalOp::Aggregate);
        assert_eq!(tree.explain(), "Aggregate\n  Get#0 t\n");
    }

    #[test]
    fn test_mixed_aggregate_is_semantic_error() {
        let db = test_db();
        let err = transform_err(&db, "SELECT a, count(*) FROM t");
        assert!(matches!(err, CrustyError::SemanticError(_)));
        let err = transform_err(&db, "SELECT 1, count(*) FROM t");
        assert!(matches!(err, CrustyError::SemanticError(_)));
    }

    #[test]
    fn test_group_by_keeps_having() {
        let db = test_db();
        let tree = plan(
            &db,
            "SELECT a, count(*) FROM t GROUP BY a HAVING count(*) > 1",
        );
        assert_eq!(
            tree.explain(),
            "GroupBy (t.a) HAVING count(*) > 1\n  Get#0 t\n"
        );
    }

    #[test]
    fn test_derived_table_predicate_is_pushed_inside() {
        let db = test_db();
        let tree = plan(&db, "SELECT * FROM (SELECT id AS k FROM t) d WHERE d.k = 1");
        let expected = "\
QueryDerivedGet#1 d (k := t.id)
  Get#0 t [t.id = 1]
";
        assert_eq!(tree.explain(), expected);
        match tree.op() {
            LogicalOp::QueryDerivedGet(get) => {
                assert_eq!(get.alias, "d");
                assert_eq!(
                    get.alias_to_expr_map.get("k"),
                    Some(&Expression::column(Some("t"), "id"))
                );
            }
            op => panic!("unexpected root {}", op),
        }
    }

    #[test]
    fn test_derived_table_with_grouping_keeps_outer_filter() {
        let db = test_db();
        let expected = "\
Filter [d.n > 1]
  QueryDerivedGet#1 d (n := count(*), x := a.x)
    GroupBy (a.x)
      Get#0 a
";
        assert_eq!(
            explain(
                &db,
                "SELECT * FROM (SELECT x, count(*) AS n FROM a GROUP BY x) d WHERE d.n > 1"
            ),
            expected
        );
    }

    #[test]
    fn test_derived_table_joined_with_base_table() {
        let db = test_db();
        let expected = "\
InnerJoin [d.k = b.id]
  QueryDerivedGet#1 d (k := a.id, z := a.z)
    Get#0 a [a.z = 3 AND a.x > 1]
  Get#2 b
";
        assert_eq!(
            explain(
                &db,
                "SELECT d.k FROM (SELECT id AS k, z FROM a WHERE x > 1) d \
                 JOIN b ON d.k = b.id WHERE d.z = 3"
            ),
            expected
        );
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        let tree = plan(&db, "DELETE FROM t WHERE t.x > 5");
        assert_eq!(tree.explain(), "Delete t\n  Get#0 t [t.x > 5]\n");
        assert_eq!(tree.children().len(), 1);
    }

    #[test]
    fn test_update_scans_for_update() {
        let db = test_db();
        let tree = plan(&db, "UPDATE t SET x = 1 WHERE id = 2");
        assert_eq!(
            tree.explain(),
            "Update t SET x = 1\n  Get#0 t FOR UPDATE [t.id = 2]\n"
        );
        let err = transform_err(&db, "UPDATE t SET nope = 1");
        assert!(matches!(err, CrustyError::ValidationError(_)));
    }

    #[test]
    fn test_insert_values() {
        let db = test_db();
        let tree = plan(&db, "INSERT INTO t (a,b) VALUES (1,2)");
        assert!(tree.children().is_empty());
        match tree.op() {
            LogicalOp::Insert(insert) => {
                assert_eq!(insert.table.name, "t");
                assert_eq!(insert.columns, vec![String::from("a"), String::from("b")]);
                assert_eq!(insert.values, vec![vec![Expression::int(1), Expression::int(2)]]);
            }
            op => panic!("unexpected root {}", op),
        }
    }

    #[test]
    fn test_insert_values_validation() {
        let db = test_db();
        for sql in &[
            "INSERT INTO b VALUES (1, 2, 3)",
            "INSERT INTO b (id, y) VALUES (1)",
            "INSERT INTO b (id, nope) VALUES (1, 2)",
            "INSERT INTO n (v) VALUES (1)",
            "INSERT INTO n VALUES (NULL, 1)",
        ] {
            let err = transform_err(&db, sql);
            assert!(matches!(err, CrustyError::ValidationError(_)), "{}", sql);
        }
        assert!(transform_with(&db, PlannerConfig::default(), "INSERT INTO n VALUES (1)").is_ok());
    }

    #[test]
    fn test_insert_select() {
        let db = test_db();
        assert_eq!(
            explain(&db, "INSERT INTO b SELECT id, x FROM a WHERE z = 3"),
            "InsertSelect b\n  Get#0 a [a.z = 3]\n"
        );
    }

    #[test]
    fn test_implicit_join_list_is_left_deep() {
        let db = test_db();
        let expected = "\
InnerJoin [b.id = c.id AND a.x = c.w]
  InnerJoin [a.id = b.id]
    Get#0 a
    Get#1 b
  Get#2 c
";
        assert_eq!(
            explain(
                &db,
                "SELECT * FROM a, b, c WHERE a.id = b.id AND b.id = c.id AND a.x = c.w"
            ),
            expected
        );
    }

    #[test]
    fn test_join_scope_isolation() {
        let db = test_db();
        let expected = "\
InnerJoin [a.x = c.w]
  Get#0 a
  InnerJoin [b.y = c.w]
    Get#1 b
    Get#2 c
";
        assert_eq!(
            explain(&db, "SELECT * FROM a, b JOIN c ON b.y = c.w WHERE a.x = c.w"),
            expected
        );
    }

    #[test]
    fn test_explicit_inner_join_collects_where_and_on() {
        let db = test_db();
        let expected = "\
InnerJoin [a.z = b.y AND a.id = b.id]
  Get#0 a [a.x > 1]
  Get#1 b [b.y < 5]
";
        assert_eq!(
            explain(
                &db,
                "SELECT * FROM a JOIN b ON a.id = b.id WHERE a.x > 1 AND b.y < 5 AND a.z = b.y"
            ),
            expected
        );
    }

    #[test]
    fn test_left_join_keeps_null_side_predicates_above() {
        let db = test_db();
        let expected = "\
Filter [b.y = 2]
  LeftJoin [a.id = b.id]
    Get#0 a [a.x = 1]
    Get#1 b
";
        assert_eq!(
            explain(
                &db,
                "SELECT * FROM a LEFT JOIN b ON a.id = b.id WHERE a.x = 1 AND b.y = 2"
            ),
            expected
        );
    }

    #[test]
    fn test_full_outer_join_pushes_nothing() {
        let db = test_db();
        let expected = "\
Filter [a.x = 1 AND b.y = 2]
  OuterJoin [a.id = b.id]
    Get#0 a
    Get#1 b
";
        assert_eq!(
            explain(
                &db,
                "SELECT * FROM a FULL OUTER JOIN b ON a.id = b.id WHERE a.x = 1 AND b.y = 2"
            ),
            expected
        );
    }

    #[test]
    fn test_invalid_join_type() {
        let db = test_db();
        let select = SelectStatement {
            select_list: vec![SelectItem::new(Expression::Star)],
            from_table: Some(TableRef::Join(Box::new(JoinDefinition {
                join_type: JoinType::Invalid,
                left: TableRef::table("a", None),
                right: TableRef::table("b", None),
                condition: None,
            }))),
            ..Default::default()
        };
        let mut transformer = QueryToOperatorTransformer::new(&db, TransactionId::new());
        let err = transformer
            .transform(&Statement::Select(Box::new(select)))
            .unwrap_err();
        assert!(matches!(err, CrustyError::UnsupportedConstruct(_)));
    }

    #[test]
    fn test_missing_table_is_catalog_error() {
        let db = test_db();
        let err = transform_err(&db, "SELECT * FROM nope");
        assert_eq!(
            err,
            CrustyError::CatalogError(String::from("relation \"nope\" does not exist"))
        );
    }

    #[test]
    fn test_constant_row_select() {
        let db = test_db();
        assert_eq!(explain(&db, "SELECT 1"), "Get#0 <constant row>\n");
    }

    #[test]
    fn test_distinct_and_limit() {
        let db = test_db();
        assert_eq!(
            explain(&db, "SELECT DISTINCT x FROM a LIMIT 5"),
            "Limit 5 OFFSET 0\n  Distinct\n    Get#0 a\n"
        );
    }

    fn unsupported(db: &Database, sql: &str) -> String {
        match transform_err(db, sql) {
            CrustyError::UnsupportedConstruct(msg) => msg,
            other => panic!("expected UnsupportedConstruct, got {:?}", other),
        }
    }

    #[test]
    fn test_exists_becomes_mark_join() {
        let db = test_db();
        assert_eq!(
            explain(&db, "SELECT * FROM a WHERE EXISTS (SELECT * FROM b WHERE b.y = a.x)"),
            "Filter [b.id IS NOT NULL]\n  MarkJoin\n    Get#0 a\n    Filter [b.y = a.x]\n      Get#1 b\n"
        );
    }

    #[test]
    fn test_correlated_exists_joins_above_all_tables() {
        let db = test_db();
        assert_eq!(
            explain(&db, "SELECT * FROM a, b, c WHERE EXISTS (SELECT * FROM e WHERE e.k = c.w)"),
            "Filter [e.id IS NOT NULL]\n  MarkJoin\n    InnerJoin\n      InnerJoin\n        Get#0 a\n        Get#1 b\n      Get#2 c\n    Filter [e.k = c.w]\n      Get#3 e\n"
        );
    }

    #[test]
    fn test_correlated_in_subquery() {
        let db = test_db();
        let tree = plan(&db, "SELECT * FROM a, b WHERE a.x IN (SELECT e.k FROM e WHERE e.j = b.y)");
        assert_eq!(
            tree.explain(),
            "Filter [a.x = e.k]\n  MarkJoin\n    InnerJoin\n      Get#0 a\n      Get#1 b\n    Filter [e.j = b.y]\n      Get#2 e\n"
        );
        // The correlated conjunct is not attached to the join of a and b.
        let join = &tree.children()[0].children()[0];
        assert!(attached_conjuncts(join).is_empty());
    }

    #[test]
    fn test_scalar_subquery_becomes_single_join() {
        let db = test_db();
        assert_eq!(
            explain(&db, "SELECT * FROM a WHERE a.z = 1 AND a.x > (SELECT max(k) FROM e)"),
            "Filter [a.x > max(e.k)]\n  SingleJoin\n    Get#0 a [a.z = 1]\n    Aggregate\n      Get#1 e\n"
        );
        assert_eq!(
            explain(&db, "SELECT * FROM a WHERE a.x = (SELECT count(*) FROM e WHERE e.j = a.id)"),
            "Filter [a.x = count(*)]\n  SingleJoin\n    Get#0 a\n    Aggregate\n      Filter [e.j = a.id]\n        Get#1 e\n"
        );
    }

    #[test]
    fn test_unsupported_subqueries() {
        let db = test_db();
        assert_eq!(
            unsupported(&db, "SELECT * FROM a WHERE a.x = (SELECT count(*) FROM e WHERE e.j > a.id)"),
            "Sub-select not supported"
        );
        assert_eq!(
            unsupported(&db, "SELECT * FROM a WHERE a.x IN (SELECT e.k, e.j FROM e)"),
            "Array in predicates not supported"
        );
        assert_eq!(
            unsupported(&db, "SELECT * FROM a WHERE a.x = 1 OR a.z IN (SELECT k FROM e)"),
            "Predicate type not supported yet"
        );
        assert_eq!(
            unsupported(&db, "SELECT * FROM a WHERE NOT EXISTS (SELECT k FROM e)"),
            "Predicate type not supported yet"
        );
    }

    #[test]
    fn test_push_down_disabled() {
        let db = test_db();
        let config = PlannerConfig {
            predicate_push_down: false,
        };
        let tree = transform_with(&db, config, "SELECT * FROM a, b WHERE a.x = b.y AND a.z = 1")
            .unwrap()
            .unwrap();
        let expected = "\
Filter [a.x = b.y AND a.z = 1]
  InnerJoin
    Get#0 a
    Get#1 b
";
        assert_eq!(tree.explain(), expected);
    }

    #[test]
    fn test_every_conjunct_lands_exactly_once() {
        let db = test_db();
        let tree = plan(
            &db,
            "SELECT * FROM a, b JOIN c ON b.id = c.id AND c.w > 0 \
             WHERE a.x = b.y AND a.z = 1 AND b.y < 4 AND (a.id = 1 OR c.w = 2) AND 1 = 1",
        );
        let mut expected: Vec<String> = vec![
            "b.id = c.id",
            "c.w > 0",
            "a.x = b.y",
            "a.z = 1",
            "b.y < 4",
            "a.id = 1 OR c.w = 2",
            "1 = 1",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        expected.sort();
        assert_eq!(attached_conjuncts(&tree), expected);
    }

    #[test]
    fn test_scan_ids_are_unique() {
        let db = test_db();
        let tree = plan(
            &db,
            "SELECT * FROM a, (SELECT id FROM b) d, c JOIN t ON c.id = t.id WHERE a.id = d.id",
        );
        let mut ids = tree.scan_ids();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_transformer_resets_between_statements() {
        let db = test_db();
        let mut transformer = QueryToOperatorTransformer::new(&db, TransactionId::new());
        let first = transformer
            .transform(&parse("SELECT * FROM a, b WHERE a.x = b.y"))
            .unwrap();
        let second = transformer
            .transform(&parse("SELECT * FROM a, b WHERE a.x = b.y"))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_statements_without_operator_tree() {
        let db = test_db();
        for sql in &["CREATE TABLE q (id INT)", "DROP TABLE a"] {
            assert_eq!(transform_with(&db, PlannerConfig::default(), sql).unwrap(), None);
        }
        let begin = Statement::Transaction(TransactionStatement {
            kind: TransactionKind::Begin,
        });
        let mut transformer = QueryToOperatorTransformer::new(&db, TransactionId::new());
        assert_eq!(transformer.transform(&begin).unwrap(), None);
    }

    #[test]
    fn test_json_round_trip_of_plan() {
        let db = test_db();
        let tree = plan(&db, "SELECT * FROM a LEFT JOIN b ON a.id = b.id WHERE b.y = 2");
        let json = tree.to_json().to_string();
        assert_eq!(OperatorExpression::from_json(&json).unwrap(), tree);
    }

    #[test]
    fn test_concurrent_transforms_share_catalog() {
        let db = Arc::new(test_db());
        let expected = explain(&db, "SELECT * FROM a, b WHERE a.x = b.y AND a.z = 1");
        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = Arc::clone(&db);
            let expected = expected.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..20 {
                    assert_eq!(
                        explain(&db, "SELECT * FROM a, b WHERE a.x = b.y AND a.z = 1"),
                        expected
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
