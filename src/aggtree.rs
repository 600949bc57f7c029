//! Hierarchical pivot trees over a base query.
//!
//! An `AggTree` holds no rows. It synthesizes queries that, once evaluated,
//! produce the rows of a pivot tree: one synthetic root row, one aggregate
//! row per group node at each pivot depth, and optionally the base rows
//! under the deepest groups. Every row shares one flat schema made of the
//! base columns, a `Rec` leaf count, and the bookkeeping columns below.

use crate::column::ScalarValue;
use crate::error::{PivotError, Result};
use crate::expr::{and, col, eq, ge, is_null, lit, null, row_number, typed_lit, Expr};
use crate::query::{AggColumn, AggFn, QueryExp, SortKey};
use crate::schema::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Number of base rows under a node.
pub const REC_COLUMN: &str = "Rec";
/// 0 for the root, d for groups at pivot level d, k+1 for base rows.
pub const DEPTH_COLUMN: &str = "_depth";
/// Label of the row: the value of the pivot column grouped at its depth.
pub const PIVOT_COLUMN: &str = "_pivot";
pub const IS_ROOT_COLUMN: &str = "_isRoot";

/// Path value at pivot level `level`, null below the row's own depth.
pub fn path_column(level: usize) -> String {
    format!("_path{}", level)
}

/// Rank of a node among its siblings at `depth`.
pub fn sort_column(depth: usize) -> String {
    format!("_sortVal_{}", depth)
}

/// True on rows at or below `depth`, the rows that carry a rank for it.
fn level_column(depth: usize) -> String {
    format!("_inLevel_{}", depth)
}

fn is_reserved(id: &str) -> bool {
    [REC_COLUMN, DEPTH_COLUMN, PIVOT_COLUMN, IS_ROOT_COLUMN]
        .iter()
        .any(|r| id.eq_ignore_ascii_case(r))
        || id.starts_with("_path")
        || id.starts_with("_sortVal_")
        || id.starts_with("_inLevel_")
}

fn strs(ids: &[String]) -> Vec<&str> {
    ids.iter().map(String::as_str).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PivotSpec {
    pub pivot_columns: Vec<String>,
    /// Column shown as the label of base rows.
    pub leaf_column: Option<String>,
    pub show_root: bool,
    pub show_leaf_rows: bool,
    /// Sibling order at every depth.
    pub sort_key: Vec<SortKey>,
    /// Aggregation overrides; other columns use the default for their type.
    pub aggregations: BTreeMap<String, AggFn>,
}

impl Default for PivotSpec {
    fn default() -> Self {
        Self {
            pivot_columns: Vec::new(),
            leaf_column: None,
            show_root: true,
            show_leaf_rows: false,
            sort_key: Vec::new(),
            aggregations: BTreeMap::new(),
        }
    }
}

impl PivotSpec {
    pub fn new(pivot_columns: &[&str]) -> Self {
        Self {
            pivot_columns: pivot_columns.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_leaf_column(mut self, column: &str) -> Self {
        self.leaf_column = Some(column.to_string());
        self
    }

    pub fn with_show_root(mut self, show_root: bool) -> Self {
        self.show_root = show_root;
        self
    }

    pub fn with_show_leaf_rows(mut self, show_leaf_rows: bool) -> Self {
        self.show_leaf_rows = show_leaf_rows;
        self
    }

    pub fn with_sort_key<K: Into<SortKey>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.sort_key = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_aggregation(mut self, column: &str, func: AggFn) -> Self {
        self.aggregations.insert(column.to_string(), func);
        self
    }
}

/// Nested set of expanded nodes, keyed by pivot value at each level. A
/// `None` key names the node grouping NULL pivot values.
///
/// Serialized as a list of `{"value", "children"}` entries, since JSON
/// object keys cannot be null:
/// `[{"value": "Legal"}, {"value": null, "children": [{"value": "Clerk"}]}]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<OpenEntry>", into = "Vec<OpenEntry>")]
pub struct OpenPaths(BTreeMap<Option<String>, OpenPaths>);

#[derive(Serialize, Deserialize)]
struct OpenEntry {
    value: Option<String>,
    #[serde(default, skip_serializing_if = "OpenPaths::is_empty")]
    children: OpenPaths,
}

impl From<Vec<OpenEntry>> for OpenPaths {
    fn from(entries: Vec<OpenEntry>) -> Self {
        OpenPaths(entries.into_iter().map(|e| (e.value, e.children)).collect())
    }
}

impl From<OpenPaths> for Vec<OpenEntry> {
    fn from(paths: OpenPaths) -> Self {
        paths.0.into_iter().map(|(value, children)| OpenEntry { value, children }).collect()
    }
}

/// Node key for a pivot value. Non-text values use their display form,
/// which `apply_path` coerces back to the column type.
fn node_key(value: &ScalarValue) -> Option<String> {
    match value {
        ScalarValue::Null => None,
        ScalarValue::Utf8(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn text_keys(path: &[&str]) -> Vec<Option<String>> {
    path.iter().map(|s| Some(s.to_string())).collect()
}

fn value_keys(path: &[ScalarValue]) -> Vec<Option<String>> {
    path.iter().map(node_key).collect()
}

impl OpenPaths {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn children(&self) -> impl Iterator<Item = (Option<&str>, &OpenPaths)> {
        self.0.iter().map(|(k, v)| (k.as_deref(), v))
    }

    /// Opens the node at `path` and every ancestor on the way to it.
    pub fn open(&mut self, path: &[&str]) {
        self.open_keys(text_keys(path));
    }

    /// As `open`, naming nodes by pivot value; `Null` is the NULL group.
    pub fn open_values(&mut self, path: &[ScalarValue]) {
        self.open_keys(value_keys(path));
    }

    /// Closes the node at `path` along with everything below it.
    pub fn close(&mut self, path: &[&str]) {
        self.close_keys(&text_keys(path));
    }

    pub fn close_values(&mut self, path: &[ScalarValue]) {
        self.close_keys(&value_keys(path));
    }

    pub fn is_open(&self, path: &[&str]) -> bool {
        self.is_open_keys(&text_keys(path))
    }

    pub fn is_open_values(&self, path: &[ScalarValue]) -> bool {
        self.is_open_keys(&value_keys(path))
    }

    fn open_keys(&mut self, path: Vec<Option<String>>) {
        let mut node = self;
        for key in path {
            node = node.0.entry(key).or_default();
        }
    }

    fn close_keys(&mut self, path: &[Option<String>]) {
        match path.split_last() {
            None => self.0.clear(),
            Some((last, parents)) => {
                if let Some(parent) = self.node_mut(parents) {
                    parent.0.remove(last);
                }
            }
        }
    }

    fn is_open_keys(&self, path: &[Option<String>]) -> bool {
        let mut node = self;
        for key in path {
            match node.0.get(key) {
                Some(child) => node = child,
                None => return false,
            }
        }
        !path.is_empty()
    }

    fn node_mut(&mut self, path: &[Option<String>]) -> Option<&mut OpenPaths> {
        let mut node = self;
        for key in path {
            node = node.0.get_mut(key)?;
        }
        Some(node)
    }
}

#[derive(Debug, Clone)]
pub struct AggTree {
    base: QueryExp,
    spec: PivotSpec,
    pivots: Vec<String>,
    pivot_types: Vec<DataType>,
    aggs: Vec<AggColumn>,
    output_columns: Vec<String>,
}

impl AggTree {
    /// Validates `spec` against `base` and prepares the tree.
    pub fn new(base: QueryExp, spec: PivotSpec) -> Result<AggTree> {
        if let Some(id) = base.schema().column_ids().into_iter().find(|id| is_reserved(id)) {
            return Err(PivotError::QueryBuildError(format!(
                "pivot base uses reserved column name '{}'", id
            )));
        }
        let mut pivots: Vec<String> = Vec::with_capacity(spec.pivot_columns.len());
        let mut pivot_types = Vec::with_capacity(spec.pivot_columns.len());
        for p in &spec.pivot_columns {
            let def = base.schema().find_column(p).ok_or_else(|| {
                PivotError::QueryBuildError(format!("unknown pivot column '{}'", p))
            })?;
            if pivots.iter().any(|q| q.eq_ignore_ascii_case(&def.id)) {
                return Err(PivotError::QueryBuildError(format!("duplicate pivot column '{}'", p)));
            }
            pivots.push(def.id.clone());
            pivot_types.push(def.data_type);
        }
        if let Some(leaf) = &spec.leaf_column {
            if !base.schema().has_column(leaf) {
                return Err(PivotError::QueryBuildError(format!("unknown leaf column '{}'", leaf)));
            }
        }

        let base = base.extend(REC_COLUMN, DataType::Int64, lit(1i64))?;
        for key in &spec.sort_key {
            if !base.schema().has_column(&key.column) {
                return Err(PivotError::QueryBuildError(format!(
                    "sort key column '{}' is not in the pivot base", key.column
                )));
            }
        }
        for column in spec.aggregations.keys() {
            if !base.schema().has_column(column) {
                return Err(PivotError::QueryBuildError(format!(
                    "aggregation for unknown column '{}'", column
                )));
            }
        }

        // Group rows and base rows are concatenated, so wherever a column
        // shows raw values its aggregate must widen to the same type.
        let aggs = base.schema().columns().iter()
            .map(|c| {
                let func = spec.aggregations.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&c.id))
                    .map_or_else(|| AggFn::default_for(&c.data_type), |(_, f)| *f);
                let out = func.output_type(&c.data_type)?;
                let raw_values = spec.show_leaf_rows || pivots.contains(&c.id);
                if raw_values && out.widen(&c.data_type).is_none() {
                    return Err(PivotError::QueryBuildError(format!(
                        "{:?} of '{}' yields {}, which cannot be shown alongside its {} values",
                        func, c.id, out, c.data_type
                    )));
                }
                Ok(AggColumn { func, column: c.id.clone() })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut output_columns = base.schema().column_ids();
        output_columns.extend([DEPTH_COLUMN, PIVOT_COLUMN, IS_ROOT_COLUMN].map(String::from));
        output_columns.extend((0..pivots.len()).map(path_column));

        debug!(?pivots, sort_key = ?spec.sort_key, "built aggregation tree");
        Ok(AggTree { base, spec, pivots, pivot_types, aggs, output_columns })
    }

    pub fn spec(&self) -> &PivotSpec { &self.spec }
    pub fn pivot_columns(&self) -> &[String] { &self.pivots }

    /// Base query extended with the `Rec` column.
    pub fn base_query(&self) -> &QueryExp { &self.base }

    pub fn output_columns(&self) -> &[String] { &self.output_columns }

    /// The single synthetic row aggregating the whole base query.
    pub fn root_query(&self) -> Result<QueryExp> {
        let grouped = self.group_rows(&self.base, 0)?;
        self.finish(grouped, 0, null(DataType::Utf8), true, 0)
    }

    /// Children of the node at `path`: groups at the next pivot level, or
    /// base rows once every level is consumed. A path naming a value that
    /// does not exist yields no rows.
    pub fn apply_path(&self, path: &[ScalarValue]) -> Result<QueryExp> {
        let depth = path.len();
        let k = self.pivots.len();
        if depth > k {
            return Err(PivotError::QueryBuildError(format!(
                "path of length {} exceeds {} pivot levels", depth, k
            )));
        }
        let filtered = self.filter_path(path)?;
        if depth < k {
            let grouped = self.group_rows(&filtered, depth + 1)?;
            self.finish(grouped, depth as i64 + 1, col(&self.pivots[depth]), false, depth + 1)
        } else if self.spec.show_leaf_rows {
            let label = self.spec.leaf_column.as_deref().map_or_else(|| null(DataType::Utf8), col);
            self.finish(filtered, k as i64 + 1, label, false, k)
        } else {
            let grouped = self.group_rows(&filtered, k)?.filter(lit(false))?;
            self.finish(grouped, k as i64 + 1, null(DataType::Utf8), false, k)
        }
    }

    /// Rank of every node at `depth` (1..=k) under the configured sort key,
    /// with ties broken by path values. Columns: `_path0.._path{depth-1}`
    /// then `_sortVal_{depth}`. NULL path values are nodes like any other.
    pub fn get_sort_query(&self, depth: usize) -> Result<QueryExp> {
        if depth == 0 || depth > self.pivots.len() {
            return Err(PivotError::QueryBuildError(format!(
                "sort depth {} outside 1..={}", depth, self.pivots.len()
            )));
        }
        let grouped = self.group_rows(&self.base, depth)?;
        let mut keys = self.spec.sort_key.clone();
        keys.extend(self.pivots[..depth].iter().map(|p| SortKey::asc(p)));
        let mut q = grouped.extend(&sort_column(depth), DataType::Int64, row_number(keys))?;
        for (i, t) in self.pivot_types[..depth].iter().enumerate() {
            q = q.extend(&path_column(i), *t, col(&self.pivots[i]))?;
        }
        let mut out: Vec<String> = (0..depth).map(path_column).collect();
        out.push(sort_column(depth));
        q.project(&strs(&out))
    }

    /// Every row of the tree for `open_paths`, in no particular order. The
    /// root is expanded only when some path below it is open.
    pub fn get_tree_query(&self, open_paths: &OpenPaths) -> Result<QueryExp> {
        self.get_tree_query_with_root(open_paths, false)
    }

    /// As `get_tree_query`, with `expand_root` forcing the depth-1 groups
    /// to show even when nothing below them is open.
    pub fn get_tree_query_with_root(&self, open_paths: &OpenPaths, expand_root: bool) -> Result<QueryExp> {
        let mut parts = Vec::new();
        if self.spec.show_root {
            parts.push(self.root_query()?);
        }
        if expand_root || !open_paths.is_empty() || !self.spec.show_root {
            self.collect_open(&mut Vec::new(), open_paths, &mut parts)?;
        }
        concat_all(parts)
    }

    /// Tree rows ordered for display: siblings follow the configured sort
    /// key at every depth and each node directly precedes its children.
    pub fn get_sorted_tree_query(&self, open_paths: &OpenPaths) -> Result<QueryExp> {
        self.get_sorted_tree_query_with_root(open_paths, false)
    }

    pub fn get_sorted_tree_query_with_root(&self, open_paths: &OpenPaths, expand_root: bool) -> Result<QueryExp> {
        let k = self.pivots.len();
        let mut q = self.get_tree_query_with_root(open_paths, expand_root)?;
        for depth in 1..=k {
            // Path columns above a row's depth are NULL, so the null-safe
            // match is restricted to rows that reach this depth.
            let level = level_column(depth);
            q = q.extend(&level, DataType::Boolean, ge(col(DEPTH_COLUMN), lit(depth as i64)))?;
            let ranks = self.get_sort_query(depth)?.extend(&level, DataType::Boolean, lit(true))?;
            let mut on: Vec<String> = (0..depth).map(path_column).collect();
            on.push(level);
            q = q.join_null_safe(&ranks, &strs(&on))?;
        }
        let mut out = self.output_columns.clone();
        out.extend((1..=k).map(sort_column));
        let q = q.project(&strs(&out))?;

        // A null rank sorts first, which places each node ahead of its children.
        let mut keys: Vec<SortKey> = (1..=k).map(|d| SortKey::asc(&sort_column(d))).collect();
        keys.push(SortKey::asc(DEPTH_COLUMN));
        keys.extend(self.spec.sort_key.iter().cloned());
        keys.push(SortKey::asc(PIVOT_COLUMN));
        q.sort(keys)
    }

    fn collect_open(&self, path: &mut Vec<ScalarValue>, node: &OpenPaths, parts: &mut Vec<QueryExp>) -> Result<()> {
        parts.push(self.apply_path(path)?);
        if path.len() < self.pivots.len() {
            for (key, child) in node.children() {
                path.push(key.map_or(ScalarValue::Null, ScalarValue::from));
                self.collect_open(path, child, parts)?;
                path.pop();
            }
        }
        Ok(())
    }

    fn filter_path(&self, path: &[ScalarValue]) -> Result<QueryExp> {
        if path.is_empty() {
            return Ok(self.base.clone());
        }
        let preds = path.iter()
            .enumerate()
            .map(|(i, v)| {
                let t = self.pivot_types[i];
                let column = col(&self.pivots[i]);
                Ok(match v.clone().coerce_to(&t) {
                    Ok(ScalarValue::Null) => is_null(column),
                    Ok(value) => eq(column, typed_lit(value, t)?),
                    // No value of the column's type can match.
                    Err(_) => lit(false),
                })
            })
            .collect::<Result<Vec<Expr>>>()?;
        self.base.filter(and(preds))
    }

    /// Groups `q` by the first `levels` pivot columns, aggregating the rest.
    fn group_rows(&self, q: &QueryExp, levels: usize) -> Result<QueryExp> {
        let group = strs(&self.pivots[..levels]);
        let aggs: Vec<AggColumn> = self.aggs.iter()
            .filter(|a| !group.contains(&a.column.as_str()))
            .cloned()
            .collect();
        q.group_by(&group, aggs)
    }

    /// Adds the bookkeeping columns and restores the shared column order.
    fn finish(&self, q: QueryExp, depth: i64, label: Expr, is_root: bool, path_len: usize) -> Result<QueryExp> {
        let mut q = q
            .extend(DEPTH_COLUMN, DataType::Int64, lit(depth))?
            .extend(PIVOT_COLUMN, DataType::Utf8, label)?
            .extend(IS_ROOT_COLUMN, DataType::Boolean, lit(is_root))?;
        for (i, t) in self.pivot_types.iter().enumerate() {
            let value = if i < path_len { col(&self.pivots[i]) } else { null(*t) };
            q = q.extend(&path_column(i), *t, value)?;
        }
        q.project(&strs(&self.output_columns))
    }
}

/// Concatenates as a balanced tree to keep subquery nesting shallow.
fn concat_all(mut parts: Vec<QueryExp>) -> Result<QueryExp> {
    while parts.len() > 1 {
        let mut merged = Vec::with_capacity((parts.len() + 1) / 2);
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => merged.push(a.concat(&b)?),
                None => merged.push(a),
            }
        }
        parts = merged;
    }
    parts.pop()
        .ok_or_else(|| PivotError::QueryBuildError("pivot tree has no rows to show".to_string()))
}
