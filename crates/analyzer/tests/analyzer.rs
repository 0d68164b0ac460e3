use std::sync::Arc;

use arrow_schema::DataType;

use riffle_analyzer::rules::dual_table;
use riffle_analyzer::{rule, Analyzer, Rule};
use riffle_common::{AnalyzerConfig, Result, RiffleError};
use riffle_sql::{
    Catalog, Column, Context, Database, Expression, FilterSupport, MemTable, Plan, TableRef,
    Value,
};

fn analyzer_with_table(table: TableRef) -> Analyzer {
    let catalog = Catalog::new();
    let mut db = Database::new("mydb");
    db.add_table(table);
    catalog.add_database(db);
    let mut a = Analyzer::new(Arc::new(catalog));
    a.current_database = "mydb".to_string();
    a
}

fn mytable() -> TableRef {
    TableRef::new(MemTable::new(
        "mytable",
        vec![
            Column::new("i", DataType::Int64, "mytable", false),
            Column::new("f", DataType::Float64, "mytable", false),
        ],
    ))
}

#[test]
fn analyze_collapses_select_star_into_a_pushdown_scan() {
    let table = mytable();
    let a = analyzer_with_table(table.clone());

    let plan = Plan::Project {
        exprs: vec![Expression::star()],
        child: Box::new(Plan::UnresolvedTable {
            name: "mytable".to_string(),
        }),
    };
    let result = a.analyze(&Context::new(), plan).expect("analyze");

    let expected = Plan::FilteredTable {
        columns: vec![
            Expression::field_with_table(0, DataType::Int64, "mytable", "i", false),
            Expression::field_with_table(1, DataType::Float64, "mytable", "f", false),
        ],
        filters: vec![],
        table,
    };
    assert_eq!(expected, result);
    assert!(result.resolved());
}

#[test]
fn analyze_resolves_dual_to_the_builtin_table() {
    let a = Analyzer::new(Arc::new(Catalog::new()));
    let plan = Plan::Project {
        exprs: vec![Expression::star()],
        child: Box::new(Plan::UnresolvedTable {
            name: "dual".to_string(),
        }),
    };
    let result = a.analyze(&Context::new(), plan).expect("analyze");
    assert_eq!(
        Plan::Table {
            table: dual_table()
        },
        result
    );
}

#[test]
fn analyze_is_idempotent() {
    let table = TableRef::new(
        MemTable::new(
            "mytable",
            vec![
                Column::new("i", DataType::Int64, "mytable", false),
                Column::new("f", DataType::Float64, "mytable", false),
            ],
        )
        .with_filter_support(FilterSupport::EqualityOnly),
    );
    let a = analyzer_with_table(table.clone());

    let plan = Plan::Project {
        exprs: vec![Expression::qualified_column("mytable", "i")],
        child: Box::new(Plan::Filter {
            predicate: Expression::equals(
                Expression::qualified_column("mytable", "f"),
                Expression::literal(Value::Float64(3.14)),
            ),
            child: Box::new(Plan::UnresolvedTable {
                name: "mytable".to_string(),
            }),
        }),
    };

    let once = a.analyze(&Context::new(), plan).expect("first analysis");
    let twice = a
        .analyze(&Context::new(), once.clone())
        .expect("second analysis");
    assert_eq!(once, twice);
}

#[test]
fn analyze_rejects_plans_with_unresolved_residue() {
    let a = analyzer_with_table(mytable());
    let plan = Plan::Project {
        exprs: vec![Expression::column("nope")],
        child: Box::new(Plan::UnresolvedTable {
            name: "mytable".to_string(),
        }),
    };
    let err = a.analyze(&Context::new(), plan).expect_err("residue");
    assert!(matches!(err, RiffleError::InvalidPlan(_)));
}

#[test]
fn analyze_surfaces_missing_tables() {
    let a = analyzer_with_table(mytable());
    let plan = Plan::Project {
        exprs: vec![Expression::star()],
        child: Box::new(Plan::UnresolvedTable {
            name: "missing".to_string(),
        }),
    };
    let err = a.analyze(&Context::new(), plan).expect_err("missing");
    assert!(matches!(err, RiffleError::TableNotFound(_)));
}

fn wrap_in_distinct(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    Ok(Plan::Distinct {
        child: Box::new(plan),
    })
}

#[test]
fn analyze_fails_when_no_fixed_point_is_reached() {
    let mut a = Analyzer::with_config(
        Arc::new(Catalog::new()),
        AnalyzerConfig {
            max_iterations: 5,
            current_database: String::new(),
        },
    );
    a.rules = vec![Rule {
        name: "wrap_in_distinct",
        apply: wrap_in_distinct,
    }];

    let table = mytable();
    let err = a
        .analyze(&Context::new(), Plan::Table { table })
        .expect_err("diverging rule");
    assert!(matches!(err, RiffleError::MaxAnalysisIters(5)));
}

#[test]
fn analyze_aborts_on_cancelled_context() {
    let a = analyzer_with_table(mytable());
    let ctx = Context::new();
    ctx.cancel();

    let err = a
        .analyze(
            &ctx,
            Plan::UnresolvedTable {
                name: "mytable".to_string(),
            },
        )
        .expect_err("cancelled");
    assert!(matches!(err, RiffleError::Cancelled));
}

#[test]
fn rule_pipeline_is_overrideable() {
    let table = mytable();
    let mut a = analyzer_with_table(table.clone());
    a.rules = vec![rule("resolve_tables").expect("rule registered")];

    let result = a
        .analyze(
            &Context::new(),
            Plan::UnresolvedTable {
                name: "mytable".to_string(),
            },
        )
        .expect("analyze");
    assert_eq!(Plan::Table { table }, result);
}
