//! The orchestration engine seam.
//!
//! The command layer never schedules anything itself. It renders each action
//! into a [`Node`] and hands it to an [`Engine`], which records the node and
//! its dependency edges and returns a [`NodeHandle`] that later nodes can
//! depend on.
//!
//! # Submodules
//!
//! - [`graph`] - [`PlanGraph`], an in-process engine backed by `petgraph`
//! - [`diff`] - create / update / replace / delete decisions between two plans

pub mod diff;
pub mod graph;

pub use diff::{Change, PlanDiff, compute_diff};
pub use graph::PlanGraph;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::Trigger;
use crate::connection::Connection;
use crate::util::hash::{HashError, Hashable, ObjectHash};

/// Engine-assigned node identifier, stable for the lifetime of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A reference to a submitted node, usable as a dependency source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
  pub id: NodeId,
  pub name: String,
}

/// Rendered command text for one lifecycle-bound action.
///
/// Environment and privilege prefixes are already merged into the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandNode {
  pub create: Option<String>,
  pub update: Option<String>,
  pub delete: Option<String>,
  #[serde(default)]
  pub triggers: Vec<Trigger>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stdin: Option<String>,
}

/// A local file transferred to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFileNode {
  pub source: PathBuf,
  pub remote_path: String,
  #[serde(default)]
  pub triggers: Vec<Trigger>,
}

/// What a node does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
  Command(CommandNode),
  CopyFile(CopyFileNode),
}

impl NodeKind {
  pub fn triggers(&self) -> &[Trigger] {
    match self {
      NodeKind::Command(cmd) => &cmd.triggers,
      NodeKind::CopyFile(copy) => &copy.triggers,
    }
  }

  /// The undo text, if this node has one.
  pub fn delete(&self) -> Option<&str> {
    match self {
      NodeKind::Command(cmd) if cmd.create.is_some() => cmd.delete.as_deref(),
      _ => None,
    }
  }
}

/// One unit the engine diffs and schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
  pub name: String,
  pub connection: Arc<Connection>,
  pub kind: NodeKind,
  #[serde(default)]
  pub depends_on: Vec<NodeHandle>,
}

/// The parts of a node that define what it does, excluding graph position.
#[derive(Serialize)]
struct NodeContent<'a> {
  connection: &'a Connection,
  kind: &'a NodeKind,
}

impl Hashable for NodeContent<'_> {}

impl Node {
  /// Hash of the node's connection and rendered action.
  ///
  /// Dependencies are excluded so that renumbering a plan does not register
  /// as a change.
  pub fn content_hash(&self) -> Result<ObjectHash, HashError> {
    NodeContent {
      connection: &self.connection,
      kind: &self.kind,
    }
    .compute_hash()
  }
}

/// Errors an engine reports when it rejects a node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
  #[error("node name must not be empty")]
  EmptyName,

  #[error("duplicate node name: {0}")]
  DuplicateName(String),

  #[error("node {node} depends on unknown node {dependency}")]
  UnknownDependency { node: String, dependency: String },

  #[error("dependency cycle detected")]
  CycleDetected,
}

/// Accepts nodes and dependency edges.
///
/// Implementations must be safe to share between the runners, installers and
/// stack managers that submit into the same plan.
pub trait Engine: Send + Sync {
  fn submit(&self, node: Node) -> Result<NodeHandle, EngineError>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::SshTarget;

  fn node(create: &str, deps: Vec<NodeHandle>) -> Node {
    Node {
      name: "n".to_string(),
      connection: Arc::new(Connection::ssh(SshTarget::new("h", "u"))),
      kind: NodeKind::Command(CommandNode {
        create: Some(create.to_string()),
        ..CommandNode::default()
      }),
      depends_on: deps,
    }
  }

  #[test]
  fn content_hash_ignores_dependencies() {
    let dep = NodeHandle {
      id: NodeId(4),
      name: "dep".to_string(),
    };
    assert_eq!(
      node("true", vec![]).content_hash().unwrap(),
      node("true", vec![dep]).content_hash().unwrap()
    );
    assert_ne!(
      node("true", vec![]).content_hash().unwrap(),
      node("false", vec![]).content_hash().unwrap()
    );
  }

  #[test]
  fn delete_requires_create() {
    let kind = NodeKind::Command(CommandNode {
      create: None,
      delete: Some("rm -rf /".to_string()),
      ..CommandNode::default()
    });
    assert_eq!(kind.delete(), None);
  }

  #[test]
  fn node_json_round_trip() {
    let n = node("mkdir -p /srv", vec![]);
    let json = serde_json::to_string(&n).unwrap();
    assert!(json.contains("\"type\":\"command\""));
    assert_eq!(serde_json::from_str::<Node>(&json).unwrap(), n);
  }
}
