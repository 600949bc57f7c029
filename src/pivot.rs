use crate::aggtree::{AggTree, OpenPaths, PivotSpec};
use crate::column::ScalarValue;
use crate::connection::Connection;
use crate::error::Result;
use crate::query::{QueryExp, SortKey};
use crate::table::TableRep;
use std::sync::Arc;
use tracing::debug;

fn text_path(path: &[&str]) -> Vec<ScalarValue> {
    path.iter().map(|s| ScalarValue::from(*s)).collect()
}

/// Interactive pivot tree session.
///
/// Mutations only record state and mark the view stale; queries run in
/// `refresh`, which takes `&mut self` so refreshes never overlap.
#[derive(Debug)]
pub struct PivotTreeModel<C: Connection> {
    conn: Arc<C>,
    base: QueryExp,
    spec: PivotSpec,
    open_paths: OpenPaths,
    root_open: bool,
    tree: Option<AggTree>,
    view: Option<TableRep>,
    stale: bool,
}

impl<C: Connection> PivotTreeModel<C> {
    /// Fails if `spec` does not fit `base`. The root starts expanded.
    pub fn new(conn: Arc<C>, base: QueryExp, spec: PivotSpec) -> Result<Self> {
        let tree = AggTree::new(base.clone(), spec.clone())?;
        Ok(Self {
            conn,
            base,
            spec,
            open_paths: OpenPaths::new(),
            root_open: true,
            tree: Some(tree),
            view: None,
            stale: true,
        })
    }

    pub fn spec(&self) -> &PivotSpec { &self.spec }
    pub fn open_paths(&self) -> &OpenPaths { &self.open_paths }
    pub fn is_stale(&self) -> bool { self.stale }

    /// Last view produced by `refresh`, possibly stale.
    pub fn view(&self) -> Option<&TableRep> { self.view.as_ref() }

    /// The empty path is the root.
    pub fn open_path(&mut self, path: &[&str]) {
        self.open_path_values(&text_path(path));
    }

    pub fn close_path(&mut self, path: &[&str]) {
        self.close_path_values(&text_path(path));
    }

    pub fn toggle_path(&mut self, path: &[&str]) {
        self.toggle_path_values(&text_path(path));
    }

    pub fn is_open(&self, path: &[&str]) -> bool {
        self.is_open_values(&text_path(path))
    }

    /// Opens the node named by pivot values; `Null` names the NULL group.
    pub fn open_path_values(&mut self, path: &[ScalarValue]) {
        if path.is_empty() {
            self.root_open = true;
        }
        self.open_paths.open_values(path);
        self.stale = true;
    }

    pub fn close_path_values(&mut self, path: &[ScalarValue]) {
        if path.is_empty() {
            self.root_open = false;
        }
        self.open_paths.close_values(path);
        self.stale = true;
    }

    pub fn toggle_path_values(&mut self, path: &[ScalarValue]) {
        if self.is_open_values(path) {
            self.close_path_values(path);
        } else {
            self.open_path_values(path);
        }
    }

    pub fn is_open_values(&self, path: &[ScalarValue]) -> bool {
        if path.is_empty() {
            self.root_open || !self.open_paths.is_empty() || !self.spec.show_root
        } else {
            self.open_paths.is_open_values(path)
        }
    }

    pub fn set_open_paths(&mut self, open_paths: OpenPaths) {
        self.open_paths = open_paths;
        self.stale = true;
    }

    pub fn set_sort_key(&mut self, sort_key: Vec<SortKey>) {
        self.spec.sort_key = sort_key;
        self.invalidate();
    }

    /// Changing the pivot levels collapses every node below the root.
    pub fn set_pivots(&mut self, pivot_columns: Vec<String>) {
        self.spec.pivot_columns = pivot_columns;
        self.open_paths = OpenPaths::new();
        self.invalidate();
    }

    pub fn set_show_root(&mut self, show_root: bool) {
        self.spec.show_root = show_root;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.tree = None;
        self.stale = true;
    }

    /// Rebuilds the tree if its configuration changed, then evaluates the
    /// sorted tree query for the current open paths.
    pub async fn refresh(&mut self) -> Result<&TableRep> {
        let tree = match self.tree.take() {
            Some(tree) => tree,
            None => AggTree::new(self.base.clone(), self.spec.clone())?,
        };
        let query = tree.get_sorted_tree_query_with_root(&self.open_paths, self.root_open);
        self.tree = Some(tree);
        let view = self.conn.eval_query(&query?).await?;
        debug!(rows = view.row_count(), "refreshed pivot view");
        self.stale = false;
        Ok(self.view.insert(view))
    }
}
