//! Sidebar navigation over the lazy catalog tree.
//!
//! Only the breadcrumb (nodes selected from the root down) and the currently
//! displayed sibling list are kept. The root list is cached for the session;
//! every other level is refetched whenever it is shown again.
//!
//! Every action takes `&mut self` and finishes its fetch before touching the
//! displayed state, so two expansions can never interleave.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::warn;

use crate::catalog::CatalogSource;
use crate::models::embedded_video_ids;
use crate::playback::PlaybackWriter;
use crate::tree::{NodeKind, TreeNode, expand, root_nodes};

pub const ROOT_TITLE: &str = "Classes";
pub const NO_VIDEO_MESSAGE: &str = "No video found";
pub const TOAST_TTL: Duration = Duration::from_secs(5);
const DIAGNOSTIC_LIMIT: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub expires_at: Instant,
}

/// Transient notifications, each visible for [`TOAST_TTL`].
#[derive(Debug, Default)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
}

impl ToastQueue {
    pub fn push(&mut self, text: impl Into<String>) {
        self.push_at(text, Instant::now());
    }

    pub fn push_at(&mut self, text: impl Into<String>, now: Instant) {
        self.toasts.push(Toast {
            text: text.into(),
            expires_at: now + TOAST_TTL,
        });
    }

    /// Drops expired toasts and returns the ones still visible at `now`.
    pub fn active(&mut self, now: Instant) -> &[Toast] {
        self.toasts.retain(|toast| toast.expires_at > now);
        &self.toasts
    }

    /// Everything pushed and not yet pruned, expired or not.
    pub fn pending(&self) -> &[Toast] {
        &self.toasts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// Before the root list has been requested.
    Loading,
    ShowingRoot,
    ShowingLevel,
    /// The root list could not be loaded.
    Error,
}

/// What a selection did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The ids were written to the playback slot.
    Published(Vec<String>),
    /// The node was pushed onto the breadcrumb; `depth` is the new path length.
    Expanded { depth: usize },
    /// Nothing navigable; a toast explains why.
    Notified,
    /// The index did not point at a displayed node.
    Ignored,
}

pub struct Navigator<S> {
    source: S,
    playback: PlaybackWriter,
    state: NavState,
    root: Vec<TreeNode>,
    path: Vec<TreeNode>,
    nodes: Vec<TreeNode>,
    toasts: ToastQueue,
}

impl<S: CatalogSource> Navigator<S> {
    pub fn new(source: S, playback: PlaybackWriter) -> Self {
        Self {
            source,
            playback,
            state: NavState::Loading,
            root: Vec::new(),
            path: Vec::new(),
            nodes: Vec::new(),
            toasts: ToastQueue::default(),
        }
    }

    /// Fetches the class list and shows it. On failure the view stays in
    /// [`NavState::Error`].
    pub fn load_root(&mut self) -> Result<()> {
        match root_nodes(&self.source) {
            Ok(nodes) => {
                self.root = nodes.clone();
                self.nodes = nodes;
                self.path.clear();
                self.state = NavState::ShowingRoot;
                Ok(())
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to load catalog root");
                self.state = NavState::Error;
                Err(err)
            }
        }
    }

    /// Selects the displayed node at `index`.
    pub fn select(&mut self, index: usize) -> Selection {
        match self.nodes.get(index).cloned() {
            Some(node) => self.select_node(node),
            None => Selection::Ignored,
        }
    }

    fn select_node(&mut self, node: TreeNode) -> Selection {
        match &node.kind {
            NodeKind::Leaf(ids) if !ids.is_empty() => self.publish(ids.clone()),
            NodeKind::Leaf(_) => {
                self.toasts.push(NO_VIDEO_MESSAGE);
                Selection::Notified
            }
            NodeKind::DeadEnd => self.publish_embedded_or_report(&node),
            NodeKind::Branch(_) => match expand(&self.source, &node) {
                Ok(children) if children.is_empty() => self.publish_embedded_or_report(&node),
                Ok(children) => {
                    self.path.push(node);
                    self.nodes = children;
                    self.state = NavState::ShowingLevel;
                    Selection::Expanded {
                        depth: self.path.len(),
                    }
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), label = %node.label, "failed to expand node");
                    self.toasts
                        .push(format!("Failed to load {}: {err:#}", node.label));
                    Selection::Notified
                }
            },
        }
    }

    fn publish(&mut self, ids: Vec<String>) -> Selection {
        self.playback.set_video_ids(ids.clone());
        Selection::Published(ids)
    }

    // Last resort for nodes without navigable children: videos attached to
    // the raw item itself.
    fn publish_embedded_or_report(&mut self, node: &TreeNode) -> Selection {
        let ids = embedded_video_ids(&node.raw);
        if !ids.is_empty() {
            return self.publish(ids);
        }
        self.toasts
            .push(format!("{NO_VIDEO_MESSAGE}\n{}", diagnostic(node)));
        Selection::Notified
    }

    /// Pops the breadcrumb. Returns `false` when already at the root.
    pub fn back(&mut self) -> bool {
        if self.path.pop().is_none() {
            return false;
        }

        let refreshed = self
            .path
            .last()
            .map(|parent| (parent.label.clone(), expand(&self.source, parent)));
        match refreshed {
            None => {
                self.nodes = self.root.clone();
                self.state = NavState::ShowingRoot;
            }
            Some((_, Ok(children))) => {
                self.nodes = children;
                self.state = NavState::ShowingLevel;
            }
            Some((label, Err(err))) => {
                warn!(error = %format!("{err:#}"), %label, "failed to reload level");
                self.toasts.push(format!("Failed to load {label}: {err:#}"));
                self.nodes = Vec::new();
                self.state = NavState::ShowingLevel;
            }
        }
        true
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn path(&self) -> &[TreeNode] {
        &self.path
    }

    /// Header text: the root title, or the label of the deepest selection.
    pub fn title(&self) -> &str {
        self.path
            .last()
            .map_or(ROOT_TITLE, |node| node.label.as_str())
    }

    pub fn toasts(&mut self) -> &mut ToastQueue {
        &mut self.toasts
    }
}

fn diagnostic(node: &TreeNode) -> String {
    let pretty = serde_json::to_string_pretty(&node.raw).unwrap_or_else(|_| node.raw.to_string());
    pretty.chars().take(DIAGNOSTIC_LIMIT).collect()
}
