//! The column tree describing the discovered measurement hierarchy:
//! root -> measurement type -> network/subsystem -> endpoint identity
//! -> metric kind. Children keep insertion order, which is the order
//! in which the columns are shown.

use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};

/// The three leaves attached to every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, EnumIter)]
pub enum MetricKind {
    #[strum(serialize = "mean")]
    Mean,
    #[strum(serialize = "stddevpct")]
    StdDevPct,
    #[strum(serialize = "closestSample")]
    ClosestSample,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnNode {
    pub title: String,
    #[serde(rename = "dataKey", skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ColumnNode>,
}

impl ColumnNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            data_key: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(title: impl Into<String>, data_key: String) -> Self {
        Self {
            title: title.into(),
            data_key: Some(data_key),
            children: Vec::new(),
        }
    }

    /// The tree root; its title is never shown.
    pub fn root() -> Self {
        Self::new("")
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn find_child(&self, title: &str) -> Option<&ColumnNode> {
        self.children.iter().find(|c| c.title == title)
    }

    /// Returns the child with `title`, appending a new empty one if
    /// there is none yet. The bool is true if the child was created.
    pub fn child_or_insert(&mut self, title: &str) -> (&mut ColumnNode, bool) {
        match self.children.iter().position(|c| c.title == title) {
            Some(i) => (&mut self.children[i], false),
            None => {
                self.children.push(ColumnNode::new(title));
                let last = self.children.len() - 1;
                (&mut self.children[last], true)
            }
        }
    }

    /// Follow a path of titles from this node.
    pub fn get<'p>(&self, mut path: impl Iterator<Item = &'p str>) -> Option<&ColumnNode> {
        if let Some(title) = path.next() {
            self.find_child(title)?.get(path)
        } else {
            Some(self)
        }
    }

    /// Depth-first, pre-order search through this node and all nodes
    /// below it.
    pub fn find(&self, pred: &impl Fn(&ColumnNode) -> bool) -> Option<&ColumnNode> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(pred))
    }

    pub fn find_by_data_key(&self, data_key: &str) -> Option<&ColumnNode> {
        self.find(&|node: &ColumnNode| node.data_key.as_deref() == Some(data_key))
    }

    /// Pre-order walk, `depth` is 0 for `self`.
    pub fn visit<'s>(&'s self, mut f: impl FnMut(&'s ColumnNode, usize)) {
        self.visit_at(0, &mut f)
    }

    fn visit_at<'s>(&'s self, depth: usize, f: &mut impl FnMut(&'s ColumnNode, usize)) {
        f(self, depth);
        for child in &self.children {
            child.visit_at(depth + 1, f);
        }
    }

    pub fn leaves(&self) -> Vec<&ColumnNode> {
        let mut out = Vec::new();
        self.visit(|node, _| {
            if node.is_leaf() {
                out.push(node);
            }
        });
        out
    }

    /// All `data_key`s below (and including) this node, in column order.
    pub fn data_keys(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit(|node, _| {
            if let Some(key) = &node.data_key {
                out.push(key.as_str());
            }
        });
        out
    }

    /// Levels below this node (a leaf has depth 0).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Checks that no node has two children with the same title.
    pub fn siblings_unique(&self) -> bool {
        let mut ok = true;
        self.visit(|node, _| {
            for (i, a) in node.children.iter().enumerate() {
                if node.children[i + 1..].iter().any(|b| b.title == a.title) {
                    ok = false;
                }
            }
        });
        ok
    }

    /// An indented rendering, one node per line, for terminal output.
    pub fn to_outline(&self) -> String {
        let mut out = String::new();
        self.visit(|node, depth| {
            if depth == 0 {
                return;
            }
            for _ in 1..depth {
                out.push_str("  ");
            }
            out.push_str(&node.title);
            if let Some(key) = &node.data_key {
                out.push_str("  [");
                out.push_str(key);
                out.push(']');
            }
            out.push('\n');
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    fn sample_tree() -> ColumnNode {
        let mut root = ColumnNode::root();
        for path in [["a", "b", "c"], ["a", "b", "d"], ["a", "e", "f"], ["g", "h", "i"]] {
            let mut node = &mut root;
            for title in path {
                node = node.child_or_insert(title).0;
            }
            node.data_key = Some(path.join("-"));
        }
        root
    }

    #[test]
    fn t_child_or_insert() {
        let mut root = ColumnNode::root();
        assert!(root.child_or_insert("x").1);
        assert!(!root.child_or_insert("x").1);
        assert!(root.child_or_insert("y").1);
        assert_eq!(root.children.len(), 2);
        assert!(root.siblings_unique());
    }

    #[test]
    fn t_find_and_order() {
        let tree = sample_tree();
        assert_eq!(tree.data_keys(), ["a-b-c", "a-b-d", "a-e-f", "g-h-i"]);
        assert_eq!(tree.find_by_data_key("a-e-f").map(|n| n.title.as_str()), Some("f"));
        assert!(tree.find_by_data_key("nope").is_none());
        assert_eq!(
            tree.get(["a", "b"].into_iter()).map(|n| n.children.len()),
            Some(2)
        );
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaves().len(), 4);
    }

    #[test]
    fn t_siblings_unique_detects_duplicates() {
        let mut tree = sample_tree();
        assert!(tree.siblings_unique());
        tree.children[0].children.push(ColumnNode::new("b"));
        assert!(!tree.siblings_unique());
    }

    #[test]
    fn t_metric_kind_names() {
        let names: Vec<String> = MetricKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(names, ["mean", "stddevpct", "closestSample"]);
        assert_eq!(MetricKind::from_str("closestSample").ok(), Some(MetricKind::ClosestSample));
    }

    #[test]
    fn t_outline() {
        let tree = sample_tree();
        let outline = tree.to_outline();
        assert!(outline.starts_with("a\n  b\n    c  [a-b-c]\n"));
    }
}
