mod common;

use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::DataType;

use common::{eval_plan, MergeableLookup, PlainLookup, TestIndex};
use riffle_analyzer::rules::{get_indexes, IndexCandidate};
use riffle_analyzer::{rule, Analyzer};
use riffle_sql::{
    Capability, Catalog, Column, Context, Expression, FilterSupport, IndexRef, LookupRef,
    MemTable, Plan, ReleasingLookup, TableRef, Value,
};

fn three_col_table(name: &str, prefix: &str) -> Vec<Column> {
    vec![
        Column::new(format!("i{prefix}"), DataType::Int32, name, false),
        Column::new(format!("f{prefix}"), DataType::Float64, name, false),
        Column::new(format!("t{prefix}"), DataType::Utf8, name, false),
    ]
}

fn filter_over_cross_join(table: TableRef, table2: TableRef) -> Plan {
    // SELECT mytable.i FROM mytable, mytable2
    // WHERE mytable.f = 3.14 AND mytable.f > 3.0 AND mytable2.i2 IS NULL
    Plan::Project {
        exprs: vec![Expression::qualified_column("mytable", "i")],
        child: Box::new(Plan::Filter {
            predicate: Expression::and(
                Expression::and(
                    Expression::equals(
                        Expression::qualified_column("mytable", "f"),
                        Expression::literal(Value::Float64(3.14)),
                    ),
                    Expression::compare(
                        riffle_sql::CompareOp::Gt,
                        Expression::qualified_column("mytable", "f"),
                        Expression::literal(Value::Float64(3.0)),
                    ),
                ),
                Expression::is_null(Expression::qualified_column("mytable2", "i2")),
            ),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::Table { table }),
                right: Box::new(Plan::Table { table: table2 }),
            }),
        }),
    }
}

fn expected_residual_filter() -> Expression {
    Expression::and(
        Expression::compare(
            riffle_sql::CompareOp::Gt,
            Expression::field_with_table(1, DataType::Float64, "mytable", "f", false),
            Expression::literal(Value::Float64(3.0)),
        ),
        Expression::is_null(Expression::field_with_table(
            3,
            DataType::Int32,
            "mytable2",
            "i2",
            false,
        )),
    )
}

#[test]
fn pushdown_wraps_projection_only_tables_with_column_lists() {
    let table = TableRef::new(
        MemTable::new("mytable", three_col_table("mytable", ""))
            .with_capability(Capability::ProjectionPushdown),
    );
    let table2 = TableRef::new(
        MemTable::new("mytable2", three_col_table("mytable2", "2"))
            .with_capability(Capability::ProjectionPushdown),
    );
    let a = Analyzer::new(Arc::new(Catalog::new()));

    let node = Plan::Project {
        exprs: vec![Expression::field_with_table(
            0,
            DataType::Int32,
            "mytable",
            "i",
            false,
        )],
        child: Box::new(Plan::Filter {
            predicate: Expression::and(
                Expression::equals(
                    Expression::field_with_table(1, DataType::Float64, "mytable", "f", false),
                    Expression::literal(Value::Float64(3.14)),
                ),
                Expression::is_null(Expression::field_with_table(
                    3,
                    DataType::Int32,
                    "mytable2",
                    "i2",
                    false,
                )),
            ),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::Table {
                    table: table.clone(),
                }),
                right: Box::new(Plan::Table {
                    table: table2.clone(),
                }),
            }),
        }),
    };

    let expected = Plan::Project {
        exprs: vec![Expression::field_with_table(
            0,
            DataType::Int32,
            "mytable",
            "i",
            false,
        )],
        child: Box::new(Plan::Filter {
            predicate: Expression::and(
                Expression::equals(
                    Expression::field_with_table(1, DataType::Float64, "mytable", "f", false),
                    Expression::literal(Value::Float64(3.14)),
                ),
                Expression::is_null(Expression::field_with_table(
                    3,
                    DataType::Int32,
                    "mytable2",
                    "i2",
                    false,
                )),
            ),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::ProjectedTable {
                    columns: vec!["i".to_string(), "f".to_string()],
                    table,
                }),
                right: Box::new(Plan::ProjectedTable {
                    columns: vec!["i2".to_string()],
                    table: table2,
                }),
            }),
        }),
    };

    let pushdown = rule("pushdown").expect("rule registered");
    let result = (pushdown.apply)(&Context::new(), &a, node).expect("pushdown");
    assert_eq!(expected, result);
}

#[test]
fn pushdown_partitions_filters_by_table_capability() {
    let table = TableRef::new(
        MemTable::new("mytable", three_col_table("mytable", ""))
            .with_filter_support(FilterSupport::EqualityOnly),
    );
    let table2 = TableRef::new(
        MemTable::new("mytable2", three_col_table("mytable2", "2"))
            .with_filter_support(FilterSupport::EqualityOnly),
    );
    let a = Analyzer::new(Arc::new(Catalog::new()));

    let node = filter_over_cross_join(table.clone(), table2.clone());

    let expected = Plan::Project {
        exprs: vec![Expression::field_with_table(
            0,
            DataType::Int32,
            "mytable",
            "i",
            false,
        )],
        child: Box::new(Plan::Filter {
            predicate: expected_residual_filter(),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::FilteredTable {
                    columns: vec![
                        Expression::field_with_table(0, DataType::Int32, "mytable", "i", false),
                        Expression::field_with_table(
                            1,
                            DataType::Float64,
                            "mytable",
                            "f",
                            false,
                        ),
                    ],
                    filters: vec![Expression::equals(
                        Expression::field_with_table(
                            1,
                            DataType::Float64,
                            "mytable",
                            "f",
                            false,
                        ),
                        Expression::literal(Value::Float64(3.14)),
                    )],
                    table,
                }),
                right: Box::new(Plan::FilteredTable {
                    columns: vec![Expression::field_with_table(
                        0,
                        DataType::Int32,
                        "mytable2",
                        "i2",
                        false,
                    )],
                    filters: vec![],
                    table: table2,
                }),
            }),
        }),
    };

    let result = a.analyze(&Context::new(), node).expect("analyze");
    assert_eq!(expected, result);
}

#[test]
fn pushdown_attaches_assigned_index_lookups() {
    let table = TableRef::new(
        MemTable::new("mytable", three_col_table("mytable", ""))
            .with_capability(Capability::Indexable)
            .with_filter_support(FilterSupport::EqualityOnly),
    );
    let table2 = TableRef::new(
        MemTable::new("mytable2", three_col_table("mytable2", "2"))
            .with_capability(Capability::Indexable)
            .with_filter_support(FilterSupport::EqualityOnly),
    );
    let a = Analyzer::new(Arc::new(Catalog::new()));

    let lookup1 = LookupRef::new(MergeableLookup::id("l1"));
    let lookup2 = LookupRef::new(MergeableLookup::id("l2"));

    let node = Plan::Project {
        exprs: vec![Expression::qualified_column("mytable", "i")],
        child: Box::new(Plan::Filter {
            predicate: Expression::and(
                Expression::and(
                    Expression::equals(
                        Expression::qualified_column("mytable", "f"),
                        Expression::literal(Value::Float64(3.14)),
                    ),
                    Expression::compare(
                        riffle_sql::CompareOp::Gt,
                        Expression::qualified_column("mytable", "f"),
                        Expression::literal(Value::Float64(3.0)),
                    ),
                ),
                Expression::is_null(Expression::qualified_column("mytable2", "i2")),
            ),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::IndexHint {
                    lookup: lookup1.clone(),
                    indexes: vec![],
                    child: Box::new(Plan::Table {
                        table: table.clone(),
                    }),
                }),
                right: Box::new(Plan::IndexHint {
                    lookup: lookup2.clone(),
                    indexes: vec![],
                    child: Box::new(Plan::Table {
                        table: table2.clone(),
                    }),
                }),
            }),
        }),
    };

    let expected = Plan::Project {
        exprs: vec![Expression::field_with_table(
            0,
            DataType::Int32,
            "mytable",
            "i",
            false,
        )],
        child: Box::new(Plan::Filter {
            predicate: expected_residual_filter(),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::IndexedTable {
                    columns: vec![
                        Expression::field_with_table(0, DataType::Int32, "mytable", "i", false),
                        Expression::field_with_table(
                            1,
                            DataType::Float64,
                            "mytable",
                            "f",
                            false,
                        ),
                    ],
                    filters: vec![Expression::equals(
                        Expression::field_with_table(
                            1,
                            DataType::Float64,
                            "mytable",
                            "f",
                            false,
                        ),
                        Expression::literal(Value::Float64(3.14)),
                    )],
                    lookup: LookupRef::new(ReleasingLookup::without_release(lookup1)),
                    table,
                }),
                right: Box::new(Plan::IndexedTable {
                    columns: vec![Expression::field_with_table(
                        0,
                        DataType::Int32,
                        "mytable2",
                        "i2",
                        false,
                    )],
                    filters: vec![],
                    lookup: LookupRef::new(ReleasingLookup::without_release(lookup2)),
                    table: table2,
                }),
            }),
        }),
    };

    let result = a.analyze(&Context::new(), node).expect("analyze");
    assert_eq!(expected, result);
}

#[test]
fn pushdown_preserves_the_emitted_row_set() {
    let rows = vec![
        vec![
            Value::Int64(1),
            Value::Float64(3.14),
            Value::Utf8("a".to_string()),
        ],
        vec![
            Value::Int64(2),
            Value::Float64(3.5),
            Value::Utf8("b".to_string()),
        ],
        vec![
            Value::Int64(3),
            Value::Float64(3.14),
            Value::Utf8("c".to_string()),
        ],
    ];
    let rows2 = vec![
        vec![
            Value::Null,
            Value::Float64(1.1),
            Value::Utf8("x".to_string()),
        ],
        vec![
            Value::Int64(20),
            Value::Float64(2.2),
            Value::Utf8("y".to_string()),
        ],
    ];
    let table = TableRef::new(
        MemTable::new("mytable", three_col_table("mytable", ""))
            .with_rows(rows)
            .with_filter_support(FilterSupport::EqualityOnly),
    );
    let table2 = TableRef::new(
        MemTable::new("mytable2", three_col_table("mytable2", "2"))
            .with_rows(rows2)
            .with_filter_support(FilterSupport::EqualityOnly),
    );
    let a = Analyzer::new(Arc::new(Catalog::new()));

    let node = filter_over_cross_join(table.clone(), table2.clone());
    let analyzed = a.analyze(&Context::new(), node).expect("analyze");

    // reference plan: same query with nothing pushed down
    let reference = Plan::Project {
        exprs: vec![Expression::field_with_table(
            0,
            DataType::Int32,
            "mytable",
            "i",
            false,
        )],
        child: Box::new(Plan::Filter {
            predicate: Expression::and(
                Expression::and(
                    Expression::equals(
                        Expression::field_with_table(
                            1,
                            DataType::Float64,
                            "mytable",
                            "f",
                            false,
                        ),
                        Expression::literal(Value::Float64(3.14)),
                    ),
                    Expression::compare(
                        riffle_sql::CompareOp::Gt,
                        Expression::field_with_table(
                            1,
                            DataType::Float64,
                            "mytable",
                            "f",
                            false,
                        ),
                        Expression::literal(Value::Float64(3.0)),
                    ),
                ),
                Expression::is_null(Expression::field_with_table(
                    3,
                    DataType::Int32,
                    "mytable2",
                    "i2",
                    false,
                )),
            ),
            child: Box::new(Plan::CrossJoin {
                left: Box::new(Plan::Table { table }),
                right: Box::new(Plan::Table { table: table2 }),
            }),
        }),
    };

    assert_eq!(
        eval_plan(&reference).expect("reference rows"),
        eval_plan(&analyzed).expect("analyzed rows")
    );
}

#[test]
fn assign_indexes_marks_each_covered_table() {
    let catalog = Arc::new(Catalog::new());
    let idx1 = IndexRef::new(TestIndex::new(
        "bar_idx",
        "t2",
        Expression::field_with_table(0, DataType::Int64, "t2", "bar", false),
    ));
    catalog.add_index(idx1.clone()).expect("add").complete();
    let idx2 = IndexRef::new(TestIndex::new(
        "foo_idx",
        "t1",
        Expression::field_with_table(0, DataType::Int64, "t1", "foo", false),
    ));
    catalog.add_index(idx2.clone()).expect("add").complete();

    let mut a = Analyzer::new(catalog);
    a.current_database = "mydb".to_string();

    let t1 = TableRef::new(
        MemTable::new("t1", vec![Column::new("foo", DataType::Int64, "t1", false)])
            .with_capability(Capability::Indexable),
    );
    let t2 = TableRef::new(
        MemTable::new(
            "t2",
            vec![
                Column::new("bar", DataType::Int64, "t2", false),
                Column::new("baz", DataType::Int64, "t2", false),
            ],
        )
        .with_capability(Capability::Indexable),
    );

    let predicate = Expression::or(
        Expression::equals(
            Expression::field_with_table(1, DataType::Int64, "t2", "bar", false),
            Expression::literal(Value::Int64(1)),
        ),
        Expression::equals(
            Expression::field_with_table(0, DataType::Int64, "t1", "foo", false),
            Expression::literal(Value::Int64(2)),
        ),
    );
    let join_predicate = Expression::equals(
        Expression::field_with_table(0, DataType::Int64, "t1", "foo", false),
        Expression::field_with_table(2, DataType::Int64, "t2", "baz", false),
    );

    let node = Plan::Project {
        exprs: vec![],
        child: Box::new(Plan::Filter {
            predicate: predicate.clone(),
            child: Box::new(Plan::InnerJoin {
                left: Box::new(Plan::Table { table: t1.clone() }),
                right: Box::new(Plan::Table { table: t2.clone() }),
                predicate: join_predicate.clone(),
            }),
        }),
    };

    let expected = Plan::Project {
        exprs: vec![],
        child: Box::new(Plan::Filter {
            predicate,
            child: Box::new(Plan::InnerJoin {
                left: Box::new(Plan::IndexHint {
                    lookup: LookupRef::new(MergeableLookup::id("2")),
                    indexes: vec![idx2],
                    child: Box::new(Plan::Table { table: t1 }),
                }),
                right: Box::new(Plan::IndexHint {
                    lookup: LookupRef::new(MergeableLookup::id("1")),
                    indexes: vec![idx1],
                    child: Box::new(Plan::Table { table: t2 }),
                }),
                predicate: join_predicate,
            }),
        }),
    };

    let assign = rule("assign_indexes").expect("rule registered");
    let result = (assign.apply)(&Context::new(), &a, node).expect("assign");
    assert_eq!(expected, result);
}

#[test]
fn analyze_assigns_catalog_indexes_and_elides_empty_filters() {
    let catalog = Arc::new(Catalog::new());
    let idx = IndexRef::new(TestIndex::new(
        "foo_idx",
        "t1",
        Expression::field_with_table(0, DataType::Int64, "t1", "foo", false),
    ));
    catalog.add_index(idx).expect("add").complete();

    let t1 = TableRef::new(
        MemTable::new("t1", vec![Column::new("foo", DataType::Int64, "t1", false)])
            .with_capability(Capability::Indexable),
    );
    let mut a = Analyzer::new(catalog);
    a.current_database = "mydb".to_string();

    let node = Plan::Project {
        exprs: vec![Expression::qualified_column("t1", "foo")],
        child: Box::new(Plan::Filter {
            predicate: Expression::equals(
                Expression::qualified_column("t1", "foo"),
                Expression::literal(Value::Int64(2)),
            ),
            child: Box::new(Plan::Table { table: t1.clone() }),
        }),
    };

    // the only conjunct is accepted by the scan, so the filter vanishes
    // and the projection collapses into the indexed scan
    let expected = Plan::IndexedTable {
        columns: vec![Expression::field_with_table(
            0,
            DataType::Int64,
            "t1",
            "foo",
            false,
        )],
        filters: vec![Expression::equals(
            Expression::field_with_table(0, DataType::Int64, "t1", "foo", false),
            Expression::literal(Value::Int64(2)),
        )],
        lookup: LookupRef::new(ReleasingLookup::without_release(LookupRef::new(
            MergeableLookup::id("2"),
        ))),
        table: t1,
    };

    let result = a.analyze(&Context::new(), node).expect("analyze");
    assert_eq!(expected, result);
}

#[test]
fn assign_indexes_without_indexable_predicate_is_identity() {
    let catalog = Arc::new(Catalog::new());
    let mut a = Analyzer::new(catalog);
    a.current_database = "mydb".to_string();

    let t1 = TableRef::new(
        MemTable::new("t1", vec![Column::new("foo", DataType::Int64, "t1", false)])
            .with_capability(Capability::Indexable),
    );
    let node = Plan::Filter {
        predicate: Expression::compare(
            riffle_sql::CompareOp::Gt,
            Expression::field_with_table(0, DataType::Int64, "t1", "foo", false),
            Expression::literal(Value::Int64(10)),
        ),
        child: Box::new(Plan::Table { table: t1 }),
    };

    let assign = rule("assign_indexes").expect("rule registered");
    let result = (assign.apply)(&Context::new(), &a, node.clone()).expect("assign");
    assert_eq!(node, result);
}

fn bar_field() -> Expression {
    Expression::field_with_table(0, DataType::Int64, "foo", "bar", false)
}

fn eq_lit(field: Expression, v: i64) -> Expression {
    Expression::equals(field, Expression::literal(Value::Int64(v)))
}

fn single_index_analyzer() -> (Analyzer, IndexRef) {
    let catalog = Arc::new(Catalog::new());
    let idx = IndexRef::new(TestIndex::new("bar_idx", "t1", bar_field()));
    catalog.add_index(idx.clone()).expect("add").complete();
    let mut a = Analyzer::new(catalog);
    a.current_database = "mydb".to_string();
    (a, idx)
}

fn candidate(lookup: MergeableLookup, indexes: Vec<IndexRef>) -> IndexCandidate {
    IndexCandidate {
        lookup: LookupRef::new(lookup),
        indexes,
    }
}

#[test]
fn get_indexes_ignores_field_to_field_comparisons() {
    let (a, _idx) = single_index_analyzer();
    let expr = Expression::equals(
        bar_field(),
        Expression::field_with_table(1, DataType::Int64, "foo", "baz", false),
    );
    assert!(get_indexes(&expr, &a).expect("get").is_empty());
}

#[test]
fn get_indexes_builds_single_key_lookups() {
    let (a, idx) = single_index_analyzer();
    let result = get_indexes(&eq_lit(bar_field(), 1), &a).expect("get");

    let mut expected = HashMap::new();
    expected.insert(
        "t1".to_string(),
        candidate(MergeableLookup::id("1"), vec![idx]),
    );
    assert_eq!(expected, result);
}

#[test]
fn get_indexes_unions_or_branches() {
    let (a, idx) = single_index_analyzer();
    let expr = Expression::or(eq_lit(bar_field(), 1), eq_lit(bar_field(), 2));
    let result = get_indexes(&expr, &a).expect("get");

    let mut expected = HashMap::new();
    expected.insert(
        "t1".to_string(),
        candidate(
            MergeableLookup::id("1").with_unions(&["2"]),
            vec![idx.clone(), idx],
        ),
    );
    assert_eq!(expected, result);
}

#[test]
fn get_indexes_intersects_and_branches() {
    let (a, idx) = single_index_analyzer();
    let expr = Expression::and(eq_lit(bar_field(), 1), eq_lit(bar_field(), 2));
    let result = get_indexes(&expr, &a).expect("get");

    let mut expected = HashMap::new();
    expected.insert(
        "t1".to_string(),
        candidate(
            MergeableLookup::id("1").with_intersections(&["2"]),
            vec![idx.clone(), idx],
        ),
    );
    assert_eq!(expected, result);
}

#[test]
fn get_indexes_combines_nested_boolean_trees() {
    let (a, idx) = single_index_analyzer();

    let and_of_ors = Expression::and(
        Expression::or(eq_lit(bar_field(), 1), eq_lit(bar_field(), 2)),
        Expression::or(eq_lit(bar_field(), 3), eq_lit(bar_field(), 4)),
    );
    let result = get_indexes(&and_of_ors, &a).expect("get");
    let mut expected = HashMap::new();
    expected.insert(
        "t1".to_string(),
        candidate(
            MergeableLookup::id("1")
                .with_unions(&["2", "4"])
                .with_intersections(&["3"]),
            vec![idx.clone(), idx.clone(), idx.clone(), idx.clone()],
        ),
    );
    assert_eq!(expected, result);

    // the indexed-expression match goes by rendered name, not position
    let or_of_ors = Expression::or(
        Expression::or(
            eq_lit(
                Expression::field_with_table(1, DataType::Int64, "foo", "bar", false),
                1,
            ),
            eq_lit(bar_field(), 2),
        ),
        Expression::or(eq_lit(bar_field(), 3), eq_lit(bar_field(), 4)),
    );
    let result = get_indexes(&or_of_ors, &a).expect("get");
    let mut expected = HashMap::new();
    expected.insert(
        "t1".to_string(),
        candidate(
            MergeableLookup::id("1").with_unions(&["2", "3", "4"]),
            vec![idx.clone(), idx.clone(), idx.clone(), idx],
        ),
    );
    assert_eq!(expected, result);
}

#[test]
fn get_indexes_turns_in_lists_into_unions() {
    let (a, idx) = single_index_analyzer();
    let expr = Expression::in_list(
        bar_field(),
        vec![
            Expression::literal(Value::Int64(1)),
            Expression::literal(Value::Int64(2)),
            Expression::literal(Value::Int64(3)),
            Expression::literal(Value::Int64(4)),
        ],
    );
    let result = get_indexes(&expr, &a).expect("get");

    let mut expected = HashMap::new();
    expected.insert(
        "t1".to_string(),
        candidate(
            MergeableLookup::id("1").with_unions(&["2", "3", "4"]),
            vec![idx],
        ),
    );
    assert_eq!(expected, result);
}

#[test]
fn get_indexes_drops_tables_with_unmergeable_lookups() {
    let catalog = Arc::new(Catalog::new());
    let idx = IndexRef::new(TestIndex::new("bar_idx", "t1", bar_field()).unmergeable());
    catalog.add_index(idx.clone()).expect("add").complete();
    let mut a = Analyzer::new(catalog);
    a.current_database = "mydb".to_string();

    // each side alone still produces a lookup
    let single = get_indexes(&eq_lit(bar_field(), 1), &a).expect("get");
    assert_eq!(single.len(), 1);
    assert_eq!(single["t1"].lookup, LookupRef::new(PlainLookup));

    // combined, the backend cannot merge, so the table drops
    let expr = Expression::and(eq_lit(bar_field(), 1), eq_lit(bar_field(), 2));
    assert!(get_indexes(&expr, &a).expect("get").is_empty());
}

#[test]
fn get_indexes_skips_pending_indexes() {
    let catalog = Arc::new(Catalog::new());
    let idx = IndexRef::new(TestIndex::new("bar_idx", "t1", bar_field()));
    let registration = catalog.add_index(idx).expect("add");
    let mut a = Analyzer::new(catalog);
    a.current_database = "mydb".to_string();

    assert!(get_indexes(&eq_lit(bar_field(), 1), &a)
        .expect("get")
        .is_empty());

    registration.complete();
    assert_eq!(get_indexes(&eq_lit(bar_field(), 1), &a).expect("get").len(), 1);
}
