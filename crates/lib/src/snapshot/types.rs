use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::SNAPSHOT_VERSION;
use crate::engine::{EngineError, Node, PlanGraph};
use crate::util::hash::ObjectHash;

/// The nodes known to be present on their targets after an apply.
///
/// Nodes are stored dependencies-first so the file reads in execution order,
/// with each node's content hash alongside for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub version: u32,
  pub nodes: Vec<Node>,
  #[serde(default)]
  pub hashes: BTreeMap<String, ObjectHash>,
}

impl Snapshot {
  /// Record every node of `graph`.
  pub fn from_graph(graph: &PlanGraph) -> Result<Self, SnapshotError> {
    let nodes = graph.topological()?;
    let mut hashes = BTreeMap::new();
    for node in &nodes {
      hashes.insert(node.name.clone(), node.content_hash().map_err(SnapshotError::Serialize)?);
    }
    Ok(Self {
      version: SNAPSHOT_VERSION,
      nodes,
      hashes,
    })
  }

  /// Record nodes given in any order.
  pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Result<Self, SnapshotError> {
    Self::from_graph(&PlanGraph::restore(nodes)?)
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn node(&self, name: &str) -> Option<&Node> {
    self.nodes.iter().find(|n| n.name == name)
  }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("failed to create snapshot directory: {0}")]
  CreateDir(#[source] std::io::Error),

  #[error("failed to read snapshot: {0}")]
  Read(#[source] std::io::Error),

  #[error("failed to write snapshot: {0}")]
  Write(#[source] std::io::Error),

  #[error("failed to parse snapshot: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize snapshot: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported snapshot version {0}")]
  UnsupportedVersion(u32),

  #[error("recorded plan is invalid: {0}")]
  Plan(#[from] EngineError),
}
