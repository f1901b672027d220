//! Lazily expanded catalog tree.
//!
//! Nodes never hold closures. Each one records the ancestor ids it was reached
//! through ([`CatalogPath`]) and, for internal nodes, the [`CatalogQuery`] that
//! lists its children. [`expand`] runs that query on demand. Nothing is
//! memoized, so expanding the same node twice fetches twice.

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use crate::catalog::{CatalogQuery, CatalogSource};
use crate::models::{CatalogItem, CatalogLevel, ContentItem, embedded_video_ids};

/// Ids of the ancestors selected on the way to a node, the node's own id
/// included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogPath {
    pub class_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub product_id: Option<i64>,
    pub season_id: Option<i64>,
    pub episode_id: Option<i64>,
    pub test_id: Option<i64>,
}

impl CatalogPath {
    /// Copy of `self` with `id` recorded for `level`. Teacher ids are not
    /// needed by any query and are dropped.
    pub fn with(mut self, level: CatalogLevel, id: i64) -> Self {
        let slot = match level {
            CatalogLevel::Class => &mut self.class_id,
            CatalogLevel::Branch => &mut self.branch_id,
            CatalogLevel::Product => &mut self.product_id,
            CatalogLevel::Season => &mut self.season_id,
            CatalogLevel::Episode => &mut self.episode_id,
            CatalogLevel::Test => &mut self.test_id,
            CatalogLevel::Teacher => return self,
        };
        *slot = Some(id);
        self
    }
}

/// Query that lists the children of a node at `level`, given the path that
/// already includes that node's id. `None` for teachers, or when an id the
/// query needs is missing.
pub fn child_query(level: CatalogLevel, path: &CatalogPath) -> Option<CatalogQuery> {
    Some(match level {
        CatalogLevel::Class => CatalogQuery::Branches {
            class_id: path.class_id?,
        },
        CatalogLevel::Branch => CatalogQuery::Products {
            class_id: path.class_id?,
            branch_id: path.branch_id?,
        },
        CatalogLevel::Product => CatalogQuery::Seasons {
            product_id: path.product_id?,
        },
        CatalogLevel::Season => CatalogQuery::Episodes {
            product_id: path.product_id?,
            season_id: path.season_id?,
        },
        CatalogLevel::Episode => CatalogQuery::Tests {
            product_id: path.product_id?,
            episode_id: path.episode_id?,
        },
        CatalogLevel::Test => CatalogQuery::Teachers {
            product_id: path.product_id?,
            test_id: path.test_id?,
        },
        CatalogLevel::Teacher => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Internal node; the query lists its children.
    Branch(CatalogQuery),
    /// Terminal node with its playable ids, possibly none.
    Leaf(Vec<String>),
    /// Neither children nor videos.
    DeadEnd,
}

/// One entry of the displayed catalog. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: i64,
    pub label: String,
    pub level: CatalogLevel,
    pub raw: Value,
    pub path: CatalogPath,
    pub kind: NodeKind,
}

impl TreeNode {
    /// Wraps a raw upstream item found at `level` below `parent`.
    pub fn from_item(level: CatalogLevel, parent: CatalogPath, raw: Value) -> Option<Self> {
        let (id, label, videos) = match level {
            CatalogLevel::Class | CatalogLevel::Branch => {
                let item: CatalogItem = serde_json::from_value(raw.clone()).ok()?;
                let label = item.value.unwrap_or_else(|| format!("#{}", item.id));
                (item.id, label, Vec::new())
            }
            _ => {
                let item: ContentItem = serde_json::from_value(raw.clone()).ok()?;
                let label = match (item.label(), level) {
                    (Some(label), _) => label.to_string(),
                    (None, CatalogLevel::Teacher) => "Teacher".to_string(),
                    (None, _) => format!("#{}", item.id),
                };
                (item.id, label, item.video_ids())
            }
        };

        let path = parent.with(level, id);
        let kind = if level == CatalogLevel::Teacher {
            NodeKind::Leaf(videos)
        } else {
            child_query(level, &path).map_or(NodeKind::DeadEnd, NodeKind::Branch)
        };

        Some(Self {
            id,
            label,
            level,
            raw,
            path,
            kind,
        })
    }

    pub fn has_children(&self) -> bool {
        matches!(self.kind, NodeKind::Branch(_))
    }

    pub fn video_ids(&self) -> Option<&[String]> {
        match &self.kind {
            NodeKind::Leaf(ids) => Some(ids),
            _ => None,
        }
    }

    /// Stand-in leaf for a test that has no teachers: the test's own videos.
    fn test_as_leaf(&self) -> Self {
        Self {
            id: self.id.saturating_mul(10),
            label: "Video".to_string(),
            level: CatalogLevel::Teacher,
            raw: self.raw.clone(),
            path: self.path,
            kind: NodeKind::Leaf(embedded_video_ids(&self.raw)),
        }
    }
}

fn build_nodes(level: CatalogLevel, parent: CatalogPath, items: Vec<Value>) -> Vec<TreeNode> {
    items
        .into_iter()
        .filter_map(|raw| {
            let node = TreeNode::from_item(level, parent, raw.clone());
            if node.is_none() {
                warn!(level = level.as_str(), item = %raw, "skipping catalog item without an id");
            }
            node
        })
        .collect()
}

/// Top-level class nodes.
pub fn root_nodes(source: &impl CatalogSource) -> Result<Vec<TreeNode>> {
    let items = source.fetch(&CatalogQuery::Classes)?;
    Ok(build_nodes(
        CatalogLevel::Class,
        CatalogPath::default(),
        items,
    ))
}

/// Fetches and builds the children of `node`. Leaves and dead ends have none.
pub fn expand(source: &impl CatalogSource, node: &TreeNode) -> Result<Vec<TreeNode>> {
    let NodeKind::Branch(query) = &node.kind else {
        return Ok(Vec::new());
    };
    let items = source.fetch(query)?;
    if items.is_empty() && matches!(query, CatalogQuery::Teachers { .. }) {
        return Ok(vec![node.test_as_leaf()]);
    }
    Ok(build_nodes(query.level(), node.path, items))
}
