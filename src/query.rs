//! Immutable relational query expressions.
//!
//! Every builder method validates its parameters against the child schema
//! and returns a new node; nothing is deferred to compile or evaluation time.
//! Nodes are reference counted, so derived trees share their common subtrees.

use crate::error::{PivotError, Result};
use crate::expr::Expr;
use crate::schema::{ColumnDef, DataType, Schema};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggFn {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    /// The group's value when every member agrees, else null.
    Uniq,
    Null,
}

impl AggFn {
    pub fn default_for(data_type: &DataType) -> AggFn {
        if data_type.is_numeric() { AggFn::Sum } else { AggFn::Uniq }
    }

    pub fn output_type(&self, input: &DataType) -> Result<DataType> {
        match self {
            AggFn::Sum if input.is_numeric() => Ok(*input),
            AggFn::Avg if input.is_numeric() => Ok(DataType::Float64),
            AggFn::Sum | AggFn::Avg => Err(PivotError::QueryBuildError(format!(
                "Cannot apply {:?} to a {} column", self, input
            ))),
            AggFn::Count => Ok(DataType::Int64),
            AggFn::Min | AggFn::Max | AggFn::Uniq | AggFn::Null => Ok(*input),
        }
    }
}

/// A normalized aggregate: every `GroupBy` stores explicit pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggColumn {
    pub func: AggFn,
    pub column: String,
}

/// Aggregate as given by a caller; a bare column takes the default function.
#[derive(Debug, Clone, PartialEq)]
pub enum AggSpec {
    Default(String),
    Explicit(AggFn, String),
}

impl From<&str> for AggSpec {
    fn from(column: &str) -> Self { AggSpec::Default(column.to_string()) }
}

impl From<String> for AggSpec {
    fn from(column: String) -> Self { AggSpec::Default(column) }
}

impl From<(AggFn, &str)> for AggSpec {
    fn from((func, column): (AggFn, &str)) -> Self { AggSpec::Explicit(func, column.to_string()) }
}

impl From<AggColumn> for AggSpec {
    fn from(agg: AggColumn) -> Self { AggSpec::Explicit(agg.func, agg.column) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(rename = "asc")]
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(column: &str) -> Self { Self { column: column.to_string(), ascending: true } }
    pub fn desc(column: &str) -> Self { Self { column: column.to_string(), ascending: false } }
}

impl From<(&str, bool)> for SortKey {
    fn from((column, ascending): (&str, bool)) -> Self {
        Self { column: column.to_string(), ascending }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinType {
    Inner,
    LeftOuter,
}

/// New id and/or display name for a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ColumnMapping {
    pub fn rename(id: &str) -> Self {
        Self { id: Some(id.to_string()), display_name: None }
    }

    pub fn display(display_name: &str) -> Self {
        Self { id: None, display_name: Some(display_name.to_string()) }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "camelCase")]
pub enum QueryOp {
    Table {
        #[serde(rename = "tableName")]
        table_name: String,
        schema: Schema,
    },
    Project {
        from: QueryExp,
        columns: Vec<String>,
    },
    Filter {
        from: QueryExp,
        predicate: Expr,
    },
    GroupBy {
        from: QueryExp,
        columns: Vec<String>,
        aggs: Vec<AggColumn>,
    },
    Sort {
        from: QueryExp,
        keys: Vec<SortKey>,
    },
    Extend {
        from: QueryExp,
        column: String,
        #[serde(rename = "type")]
        data_type: DataType,
        value: Expr,
    },
    MapColumns {
        from: QueryExp,
        mapping: BTreeMap<String, ColumnMapping>,
    },
    MapColumnsByIndex {
        from: QueryExp,
        #[serde(with = "index_keys")]
        mapping: BTreeMap<usize, ColumnMapping>,
    },
    Concat {
        from: QueryExp,
        target: QueryExp,
    },
    Join {
        from: QueryExp,
        target: QueryExp,
        on: Vec<String>,
        #[serde(rename = "joinType")]
        join_type: JoinType,
        /// Keys compare with `IS`, so NULL matches NULL.
        #[serde(default, rename = "nullSafe", skip_serializing_if = "std::ops::Not::not")]
        null_safe: bool,
    },
}

/// Index-keyed mappings travel with string keys, as JSON object keys must.
mod index_keys {
    use super::ColumnMapping;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        mapping: &BTreeMap<usize, ColumnMapping>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        mapping.iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<usize, ColumnMapping>, D::Error> {
        BTreeMap::<String, ColumnMapping>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                k.parse::<usize>()
                    .map(|idx| (idx, v))
                    .map_err(|_| D::Error::custom(format!("invalid column index '{}'", k)))
            })
            .collect()
    }
}

#[derive(Debug)]
struct QueryNode {
    op: QueryOp,
    schema: Schema,
}

/// Handle to an immutable query tree. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct QueryExp {
    node: Arc<QueryNode>,
}

fn build_error(msg: String) -> PivotError {
    PivotError::QueryBuildError(msg)
}

fn lookup<'a>(schema: &'a Schema, column: &str, context: &str) -> Result<&'a ColumnDef> {
    schema.find_column(column)
        .ok_or_else(|| build_error(format!("{}: unknown column '{}'", context, column)))
}

fn build_schema(columns: Vec<ColumnDef>, context: &str) -> Result<Schema> {
    Schema::new(columns).map_err(|e| build_error(format!("{}: {}", context, e)))
}

impl QueryExp {
    /// Leaf over a table registered in the backing engine.
    pub fn table(table_name: &str, schema: Schema) -> Result<QueryExp> {
        Self::build(QueryOp::Table { table_name: table_name.to_string(), schema })
    }

    pub fn schema(&self) -> &Schema { &self.node.schema }
    pub fn op(&self) -> &QueryOp { &self.node.op }

    pub fn project(&self, columns: &[&str]) -> Result<QueryExp> {
        Self::build(QueryOp::Project {
            from: self.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn filter(&self, predicate: Expr) -> Result<QueryExp> {
        Self::build(QueryOp::Filter { from: self.clone(), predicate })
    }

    /// Groups by `columns`. Bare aggregate columns are expanded here to
    /// their default function (sum for numeric columns, uniq otherwise).
    pub fn group_by<A>(&self, columns: &[&str], aggs: impl IntoIterator<Item = A>) -> Result<QueryExp>
    where
        A: Into<AggSpec>,
    {
        let aggs = aggs.into_iter()
            .map(|spec| match spec.into() {
                AggSpec::Explicit(func, column) => Ok(AggColumn { func, column }),
                AggSpec::Default(column) => {
                    let def = lookup(self.schema(), &column, "groupBy")?;
                    Ok(AggColumn { func: AggFn::default_for(&def.data_type), column: def.id.clone() })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::build(QueryOp::GroupBy {
            from: self.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            aggs,
        })
    }

    pub fn sort<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<QueryExp>
    where
        K: Into<SortKey>,
    {
        Self::build(QueryOp::Sort {
            from: self.clone(),
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }

    pub fn extend(&self, column: &str, data_type: DataType, value: Expr) -> Result<QueryExp> {
        Self::build(QueryOp::Extend {
            from: self.clone(),
            column: column.to_string(),
            data_type,
            value,
        })
    }

    pub fn map_columns<S>(&self, mapping: impl IntoIterator<Item = (S, ColumnMapping)>) -> Result<QueryExp>
    where
        S: Into<String>,
    {
        Self::build(QueryOp::MapColumns {
            from: self.clone(),
            mapping: mapping.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    pub fn map_columns_by_index(
        &self,
        mapping: impl IntoIterator<Item = (usize, ColumnMapping)>,
    ) -> Result<QueryExp> {
        Self::build(QueryOp::MapColumnsByIndex {
            from: self.clone(),
            mapping: mapping.into_iter().collect(),
        })
    }

    /// Union of all rows of both queries, duplicates kept.
    pub fn concat(&self, other: &QueryExp) -> Result<QueryExp> {
        Self::build(QueryOp::Concat { from: self.clone(), target: other.clone() })
    }

    /// Left outer equi-join on the shared key columns.
    pub fn join(&self, other: &QueryExp, on: &[&str]) -> Result<QueryExp> {
        self.join_with(other, on, JoinType::LeftOuter)
    }

    pub fn join_with(&self, other: &QueryExp, on: &[&str], join_type: JoinType) -> Result<QueryExp> {
        Self::build(QueryOp::Join {
            from: self.clone(),
            target: other.clone(),
            on: on.iter().map(|c| c.to_string()).collect(),
            join_type,
            null_safe: false,
        })
    }

    /// Left outer join where a NULL key matches a NULL key.
    pub fn join_null_safe(&self, other: &QueryExp, on: &[&str]) -> Result<QueryExp> {
        Self::build(QueryOp::Join {
            from: self.clone(),
            target: other.clone(),
            on: on.iter().map(|c| c.to_string()).collect(),
            join_type: JoinType::LeftOuter,
            null_safe: true,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<QueryExp> {
        Ok(serde_json::from_str(s)?)
    }

    /// Validates `op` and derives its schema. Every node, whether built by
    /// a method above or by deserialization, passes through here.
    pub fn build(op: QueryOp) -> Result<QueryExp> {
        let schema = derive_schema(&op)?;
        Ok(QueryExp { node: Arc::new(QueryNode { op, schema }) })
    }
}

fn derive_schema(op: &QueryOp) -> Result<Schema> {
    match op {
        QueryOp::Table { table_name, schema } => {
            if table_name.is_empty() {
                return Err(build_error("table: empty table name".to_string()));
            }
            Ok(schema.clone())
        }
        QueryOp::Project { from, columns } => {
            if columns.is_empty() {
                return Err(build_error("project: empty column list".to_string()));
            }
            let defs = columns.iter()
                .map(|c| lookup(from.schema(), c, "project").cloned())
                .collect::<Result<Vec<_>>>()?;
            build_schema(defs, "project")
        }
        QueryOp::Filter { from, predicate } => {
            if predicate.contains_row_number() {
                return Err(build_error("filter: row_number is not allowed in a predicate".to_string()));
            }
            let t = predicate.data_type(from.schema())?;
            if t != DataType::Boolean {
                return Err(PivotError::TypeError(format!("filter: predicate has type {}", t)));
            }
            Ok(from.schema().clone())
        }
        QueryOp::GroupBy { from, columns, aggs } => {
            if columns.is_empty() && aggs.is_empty() {
                return Err(build_error("groupBy: no group or aggregate columns".to_string()));
            }
            let mut defs = columns.iter()
                .map(|c| lookup(from.schema(), c, "groupBy").cloned())
                .collect::<Result<Vec<_>>>()?;
            for agg in aggs {
                let input = lookup(from.schema(), &agg.column, "groupBy")?;
                defs.push(ColumnDef {
                    id: input.id.clone(),
                    data_type: agg.func.output_type(&input.data_type)?,
                    display_name: input.display_name.clone(),
                });
            }
            build_schema(defs, "groupBy")
        }
        QueryOp::Sort { from, keys } => {
            if keys.is_empty() {
                return Err(build_error("sort: empty sort key".to_string()));
            }
            for key in keys {
                lookup(from.schema(), &key.column, "sort")?;
            }
            Ok(from.schema().clone())
        }
        QueryOp::Extend { from, column, data_type, value } => {
            if from.schema().has_column(column) {
                return Err(build_error(format!("extend: column '{}' already exists", column)));
            }
            let value_type = value.data_type(from.schema())?;
            if !value_type.casts_to(data_type) {
                return Err(PivotError::TypeError(format!(
                    "extend: value of type {} cannot be stored in {} column '{}'",
                    value_type, data_type, column
                )));
            }
            let mut defs = from.schema().columns().to_vec();
            defs.push(ColumnDef::new(column, *data_type));
            build_schema(defs, "extend")
        }
        QueryOp::MapColumns { from, mapping } => {
            let mut defs = from.schema().columns().to_vec();
            for (column, cm) in mapping {
                let idx = from.schema().find_column_index(column)
                    .ok_or_else(|| build_error(format!("mapColumns: unknown column '{}'", column)))?;
                apply_mapping(&mut defs[idx], cm);
            }
            build_schema(defs, "mapColumns")
        }
        QueryOp::MapColumnsByIndex { from, mapping } => {
            let mut defs = from.schema().columns().to_vec();
            for (idx, cm) in mapping {
                let def = defs.get_mut(*idx).ok_or_else(|| {
                    build_error(format!("mapColumnsByIndex: index {} out of range", idx))
                })?;
                apply_mapping(def, cm);
            }
            build_schema(defs, "mapColumnsByIndex")
        }
        QueryOp::Concat { from, target } => {
            let (lhs, rhs) = (from.schema().columns(), target.schema().columns());
            if lhs.len() != rhs.len() {
                return Err(build_error(format!(
                    "concat: column counts differ ({} vs {})", lhs.len(), rhs.len()
                )));
            }
            let defs = lhs.iter().zip(rhs)
                .map(|(l, r)| {
                    if !l.id.eq_ignore_ascii_case(&r.id) {
                        return Err(build_error(format!("concat: column '{}' vs '{}'", l.id, r.id)));
                    }
                    let data_type = l.data_type.widen(&r.data_type).ok_or_else(|| {
                        build_error(format!(
                            "concat: column '{}' has types {} and {}", l.id, l.data_type, r.data_type
                        ))
                    })?;
                    Ok(ColumnDef { data_type, ..l.clone() })
                })
                .collect::<Result<Vec<_>>>()?;
            build_schema(defs, "concat")
        }
        QueryOp::Join { from, target, on, .. } => {
            if on.is_empty() {
                return Err(build_error("join: no key columns".to_string()));
            }
            let mut defs = Vec::new();
            for key in on {
                let l = lookup(from.schema(), key, "join")?;
                let r = lookup(target.schema(), key, "join")?;
                if l.data_type.widen(&r.data_type).is_none() {
                    return Err(build_error(format!(
                        "join: key '{}' has types {} and {}", key, l.data_type, r.data_type
                    )));
                }
                defs.push(l.clone());
            }
            let is_key = |id: &str| on.iter().any(|k| k.eq_ignore_ascii_case(id));
            defs.extend(from.schema().columns().iter().filter(|c| !is_key(&c.id)).cloned());
            defs.extend(target.schema().columns().iter().filter(|c| !is_key(&c.id)).cloned());
            build_schema(defs, "join")
        }
    }
}

fn apply_mapping(def: &mut ColumnDef, cm: &ColumnMapping) {
    if let Some(id) = &cm.id {
        def.id = id.clone();
    }
    if let Some(name) = &cm.display_name {
        def.display_name = name.clone();
    }
}

impl PartialEq for QueryExp {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node) || self.node.op == other.node.op
    }
}

impl Serialize for QueryExp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.node.op.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QueryExp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let op = QueryOp::deserialize(deserializer)?;
        QueryExp::build(op).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, eq, lit, sub};

    fn base() -> QueryExp {
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

    #[test]
    fn project_reorders() {
        let q = base().project(&["JobFamily", "Name"]).unwrap();
        assert_eq!(q.schema().column_ids(), vec!["JobFamily", "Name"]);
        assert!(matches!(base().project(&["Salary"]), Err(PivotError::QueryBuildError(_))));
    }

    #[test]
    fn group_by_normalizes_default_aggs() {
        let q = base().group_by(&["JobFamily"], ["TCOE", "Title"]).unwrap();
        assert_eq!(q.schema().column_ids(), vec!["JobFamily", "TCOE", "Title"]);
        match q.op() {
            QueryOp::GroupBy { aggs, .. } => {
                assert_eq!(aggs[0], AggColumn { func: AggFn::Sum, column: "TCOE".to_string() });
                assert_eq!(aggs[1], AggColumn { func: AggFn::Uniq, column: "Title".to_string() });
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn group_by_rejects_sum_of_text() {
        let err = base().group_by(&["JobFamily"], [(AggFn::Sum, "Name")]).unwrap_err();
        assert!(matches!(err, PivotError::QueryBuildError(_)));
    }

    #[test]
    fn group_by_avg_is_real() {
        let q = base().group_by(&["JobFamily"], [(AggFn::Avg, "Base"), (AggFn::Count, "Name")]).unwrap();
        assert_eq!(q.schema().column_type("Base"), Some(DataType::Float64));
        assert_eq!(q.schema().column_type("Name"), Some(DataType::Int64));
    }

    #[test]
    fn filter_requires_boolean() {
        assert!(base().filter(eq(col("JobFamily"), lit("Safety"))).is_ok());
        assert!(matches!(base().filter(col("Base")), Err(PivotError::TypeError(_))));
        assert!(matches!(
            base().filter(eq(col("Job"), lit("Safety"))),
            Err(PivotError::QueryBuildError(_))
        ));
    }

    #[test]
    fn extend_rejects_collision() {
        let q = base().extend("ExtraComp", DataType::Int64, sub(col("TCOE"), col("Base"))).unwrap();
        assert_eq!(q.schema().column_ids().last().map(String::as_str), Some("ExtraComp"));
        assert!(matches!(
            q.extend("Base", DataType::Int64, lit(1i64)),
            Err(PivotError::QueryBuildError(_))
        ));
        assert!(matches!(
            base().extend("Flag", DataType::Int64, lit("x")),
            Err(PivotError::TypeError(_))
        ));
    }

    #[test]
    fn map_columns_updates_metadata() {
        let q = base()
            .map_columns([("Name", ColumnMapping::rename("EmpName").with_display_name("Employee Name"))])
            .unwrap();
        assert_eq!(q.schema().column_ids()[0], "EmpName");
        let md = q.schema().column_metadata("EmpName").unwrap();
        assert_eq!(md.display_name, "Employee Name");
        assert_eq!(md.data_type, DataType::Utf8);

        let q = base().map_columns_by_index([(0, ColumnMapping::rename("EmpName"))]).unwrap();
        assert_eq!(q.schema().column_ids()[0], "EmpName");
        assert!(base().map_columns_by_index([(6, ColumnMapping::rename("X"))]).is_err());
        assert!(base().map_columns([("Name", ColumnMapping::rename("Title"))]).is_err());
    }

    #[test]
    fn concat_requires_matching_schemas() {
        let a = base().project(&["Name", "Base"]).unwrap();
        let b = base().project(&["Name", "TCOE"]).unwrap();
        assert!(a.concat(&a).is_ok());
        assert!(matches!(a.concat(&b), Err(PivotError::QueryBuildError(_))));
    }

    #[test]
    fn concat_widens_numeric() {
        let a = base().group_by(&["JobFamily"], [(AggFn::Avg, "Base")]).unwrap();
        let b = base().project(&["JobFamily", "Base"]).unwrap();
        let q = a.concat(&b).unwrap();
        assert_eq!(q.schema().column_type("Base"), Some(DataType::Float64));
    }

    #[test]
    fn join_schema_order() {
        let a = base().project(&["JobFamily", "Name", "Base"]).unwrap();
        let b = base().group_by(&["JobFamily"], [(AggFn::Count, "TCOE")]).unwrap();
        let q = a.join(&b, &["JobFamily"]).unwrap();
        assert_eq!(q.schema().column_ids(), vec!["JobFamily", "Name", "Base", "TCOE"]);
        assert!(matches!(a.join(&a, &["JobFamily"]), Err(PivotError::QueryBuildError(_))));
        assert!(a.join(&b, &["Title"]).is_err());
    }

    #[test]
    fn serialized_form_is_tagged() {
        let q = base()
            .filter(eq(col("JobFamily"), lit("Executive Management")))
            .unwrap()
            .sort([("Name", true)])
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&q.to_json().unwrap()).unwrap();
        assert_eq!(json["operator"], "sort");
        assert_eq!(json["from"]["operator"], "filter");
        assert_eq!(json["from"]["from"]["operator"], "table");
        assert_eq!(json["from"]["from"]["tableName"], "barttest");
        assert_eq!(json["keys"], serde_json::json!([{"column": "Name", "asc": true}]));
    }

    #[test]
    fn round_trip_preserves_structure() {
        let shared = base().project(&["JobFamily", "Base", "TCOE"]).unwrap();
        let q = shared
            .group_by(&["JobFamily"], ["TCOE"])
            .unwrap()
            .join(&shared.group_by(&["JobFamily"], [(AggFn::Max, "Base")]).unwrap(), &["JobFamily"])
            .unwrap();
        let text = q.to_json().unwrap();
        let back = QueryExp::from_json(&text).unwrap();
        assert_eq!(back, q);
        assert_eq!(back.schema(), q.schema());
        assert_eq!(back.to_json().unwrap(), text);
    }

    #[test]
    fn index_mapping_round_trip() {
        let defs = (0..13).map(|i| ColumnDef::new(&format!("c{}", i), DataType::Int64)).collect();
        let wide = QueryExp::table("wide", Schema::new(defs).unwrap()).unwrap();
        let q = wide
            .map_columns_by_index([(12, ColumnMapping::rename("last")), (3, ColumnMapping::display("Three"))])
            .unwrap();
        let text = q.to_json().unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["mapping"]["12"]["id"], "last");
        assert!(json["mapping"]["3"].is_object());

        let back = QueryExp::from_json(&text).unwrap();
        assert_eq!(back, q);
        assert_eq!(back.schema().column_ids()[12], "last");
        assert_eq!(back.schema().column_metadata("c3").unwrap().display_name, "Three");
        assert_eq!(back.to_json().unwrap(), text);

        let bad = text.replace("\"12\"", "\"x12\"");
        assert!(matches!(QueryExp::from_json(&bad), Err(PivotError::SerializationError(_))));
    }

    #[test]
    fn null_safe_join_round_trip() {
        let a = base().project(&["JobFamily", "Name"]).unwrap();
        let b = base().group_by(&["JobFamily"], ["TCOE"]).unwrap();
        let plain = a.join(&b, &["JobFamily"]).unwrap();
        assert!(!plain.to_json().unwrap().contains("nullSafe"));

        let q = a.join_null_safe(&b, &["JobFamily"]).unwrap();
        let text = q.to_json().unwrap();
        assert!(text.contains(r#""nullSafe":true"#));
        let back = QueryExp::from_json(&text).unwrap();
        assert_eq!(back, q);
        assert_ne!(back, plain);
    }

    #[test]
    fn deserialization_revalidates() {
        let q = base().project(&["Name"]).unwrap();
        let text = q.to_json().unwrap().replace("\"columns\":[\"Name\"]", "\"columns\":[\"Nope\"]");
        assert!(matches!(QueryExp::from_json(&text), Err(PivotError::SerializationError(_))));
    }
}
