use pivot_query::expr::{and, col, eq, gt, is_null, lit, not, row_number, sub, typed_lit};
use pivot_query::sql::QueryCompiler;
use pivot_query::{AggFn, ColumnDef, ColumnMapping, DataType, PivotError, QueryExp, Schema, SortKey};

const COLS: &str = r#""Name", "Title", "Base", "TCOE", "JobFamily", "Union""#;

fn bart() -> QueryExp {
    let schema = Schema::new(vec![
        ColumnDef::new("Name", DataType::Utf8),
        ColumnDef::new("Title", DataType::Utf8),
        ColumnDef::new("Base", DataType::Int64),
        ColumnDef::new("TCOE", DataType::Int64),
        ColumnDef::new("JobFamily", DataType::Utf8),
        ColumnDef::new("Union", DataType::Utf8),
    ])
    .unwrap();
    QueryExp::table("barttest", schema).unwrap()
}

fn compile(q: &QueryExp) -> String {
    QueryCompiler::compile(q).unwrap()
}

#[test]
fn test_table_scan() {
    assert_eq!(compile(&bart()), format!(r#"SELECT {} FROM "barttest""#, COLS));
}

#[test]
fn test_filter() {
    let q = bart().filter(eq(col("JobFamily"), lit("Executive Management"))).unwrap();
    assert_eq!(
        compile(&q),
        format!(r#"SELECT {} FROM "barttest" AS "t0" WHERE ("JobFamily" = 'Executive Management')"#, COLS)
    );
}

#[test]
fn test_compound_predicate() {
    let q = bart()
        .filter(and(vec![
            gt(col("TCOE"), lit(200000i64)),
            not(eq(col("Union"), lit("AFSCME"))),
        ]))
        .unwrap()
        .filter(is_null(col("Title")))
        .unwrap();
    let sql = compile(&q);
    assert!(sql.ends_with(r#"WHERE ("Title" IS NULL)"#), "{}", sql);
    assert!(sql.contains(r#"WHERE (("TCOE" > 200000) AND (NOT ("Union" = 'AFSCME')))"#), "{}", sql);
}

#[test]
fn test_group_by_default_aggs() {
    let q = bart().group_by(&["JobFamily"], ["TCOE", "Title"]).unwrap();
    assert_eq!(
        compile(&q),
        concat!(
            r#"SELECT "JobFamily", sum("TCOE") AS "TCOE", "#,
            r#"CASE WHEN (min("Title") = max("Title")) THEN min("Title") ELSE NULL END AS "Title" "#,
            r#"FROM "barttest" AS "t0" GROUP BY "JobFamily""#
        )
    );
}

#[test]
fn test_group_by_explicit_aggs() {
    let q = bart()
        .group_by(&["Union"], [(AggFn::Avg, "Base"), (AggFn::Count, "Name"), (AggFn::Null, "Title")])
        .unwrap();
    assert_eq!(
        compile(&q),
        concat!(
            r#"SELECT "Union", avg("Base") AS "Base", count("Name") AS "Name", "#,
            r#"CAST(NULL AS TEXT) AS "Title" FROM "barttest" AS "t0" GROUP BY "Union""#
        )
    );
}

#[test]
fn test_sort_over_project() {
    let q = bart()
        .project(&["JobFamily", "TCOE"])
        .unwrap()
        .sort([("JobFamily", true), ("TCOE", false)])
        .unwrap();
    assert_eq!(
        compile(&q),
        concat!(
            r#"SELECT "JobFamily", "TCOE" FROM (SELECT "JobFamily", "TCOE" FROM "barttest" AS "t1") AS "t0" "#,
            r#"ORDER BY "JobFamily" ASC, "TCOE" DESC"#
        )
    );
}

#[test]
fn test_concat_is_union_all() {
    let exec = bart().filter(eq(col("JobFamily"), lit("Executive Management"))).unwrap();
    let safety = bart().filter(eq(col("JobFamily"), lit("Safety"))).unwrap();
    let expected = format!(
        concat!(
            r#"SELECT {c} FROM (SELECT {c} FROM "barttest" AS "t1" WHERE ("JobFamily" = 'Executive Management')) AS "t0" "#,
            r#"UNION ALL "#,
            r#"SELECT {c} FROM (SELECT {c} FROM "barttest" AS "t3" WHERE ("JobFamily" = 'Safety')) AS "t2""#
        ),
        c = COLS
    );
    assert_eq!(compile(&exec.concat(&safety).unwrap()), expected);
}

#[test]
fn test_join() {
    let people = bart().project(&["JobFamily", "Name"]).unwrap();
    let totals = bart().group_by(&["JobFamily"], ["TCOE"]).unwrap();
    let q = people.join(&totals, &["JobFamily"]).unwrap();
    assert_eq!(
        compile(&q),
        concat!(
            r#"SELECT "t0"."JobFamily", "t0"."Name", "t2"."TCOE" "#,
            r#"FROM (SELECT "JobFamily", "Name" FROM "barttest" AS "t1") AS "t0" "#,
            r#"LEFT OUTER JOIN (SELECT "JobFamily", sum("TCOE") AS "TCOE" FROM "barttest" AS "t3" GROUP BY "JobFamily") AS "t2" "#,
            r#"ON ("t0"."JobFamily" = "t2"."JobFamily")"#
        )
    );
    let inner = people.join_with(&totals, &["JobFamily"], pivot_query::JoinType::Inner).unwrap();
    assert!(compile(&inner).contains(" INNER JOIN "));
    let null_safe = people.join_null_safe(&totals, &["JobFamily"]).unwrap();
    assert!(compile(&null_safe).ends_with(r#"ON ("t0"."JobFamily" IS "t2"."JobFamily")"#));
}

#[test]
fn test_extend_casts_and_arithmetic() {
    let q = bart()
        .extend("ExtraComp", DataType::Int64, sub(col("TCOE"), col("Base")))
        .unwrap();
    assert_eq!(
        compile(&q),
        format!(r#"SELECT {}, ("TCOE" - "Base") AS "ExtraComp" FROM "barttest" AS "t0""#, COLS)
    );

    let q = bart().extend("TCOEReal", DataType::Float64, col("TCOE")).unwrap();
    assert!(compile(&q).contains(r#"CAST("TCOE" AS REAL) AS "TCOEReal""#));

    let q = bart().extend("Three", DataType::Float64, typed_lit(3i64, DataType::Float64).unwrap()).unwrap();
    assert!(compile(&q).contains(r#"3.0 AS "Three""#));

    let q = bart().extend("Flag", DataType::Boolean, lit(true)).unwrap();
    assert!(compile(&q).contains(r#"1 AS "Flag""#));
}

#[test]
fn test_row_number() {
    let q = bart()
        .extend("Rank", DataType::Int64, row_number(vec![SortKey::desc("TCOE"), SortKey::asc("Name")]))
        .unwrap();
    assert!(compile(&q).contains(r#"row_number() OVER (ORDER BY "TCOE" DESC, "Name" ASC) AS "Rank""#));
}

#[test]
fn test_map_columns_aliases() {
    let q = bart()
        .map_columns([
            ("Name", ColumnMapping::rename("EmpName")),
            ("Title", ColumnMapping::display("Job Title")),
        ])
        .unwrap();
    assert_eq!(
        compile(&q),
        r#"SELECT "Name" AS "EmpName", "Title", "Base", "TCOE", "JobFamily", "Union" FROM "barttest" AS "t0""#
    );
}

#[test]
fn test_quoting() {
    let schema = Schema::new(vec![ColumnDef::new("Emp \"Nick\"", DataType::Utf8)]).unwrap();
    let q = QueryExp::table("o'hare", schema)
        .unwrap()
        .filter(eq(col("Emp \"Nick\""), lit("O'Brien")))
        .unwrap();
    assert_eq!(
        compile(&q),
        r#"SELECT "Emp ""Nick""" FROM "o'hare" AS "t0" WHERE ("Emp ""Nick""" = 'O''Brien')"#
    );
}

#[test]
fn test_row_count_statement() {
    assert_eq!(
        QueryCompiler::compile_row_count(&bart()).unwrap(),
        format!(r#"SELECT count(*) AS "rowCount" FROM (SELECT {} FROM "barttest") AS "t0""#, COLS)
    );
}

#[test]
fn test_compile_errors() {
    let schema = Schema::new(vec![ColumnDef::new("x", DataType::Int64)]).unwrap();
    let bad_table = QueryExp::table("bad\0name", schema).unwrap();
    assert!(matches!(QueryCompiler::compile(&bad_table), Err(PivotError::CompileError(_))));

    let nan = bart().extend("Bad", DataType::Float64, lit(f64::NAN)).unwrap();
    assert!(matches!(QueryCompiler::compile(&nan), Err(PivotError::CompileError(_))));
}

#[test]
fn test_deserialized_query_compiles_identically() {
    let q = bart()
        .filter(gt(col("TCOE"), lit(150000i64)))
        .unwrap()
        .group_by(&["JobFamily", "Union"], [(AggFn::Max, "Base")])
        .unwrap()
        .sort([SortKey::desc("Base")])
        .unwrap();
    let back = QueryExp::from_json(&q.to_json().unwrap()).unwrap();
    assert_eq!(compile(&back), compile(&q));
}
