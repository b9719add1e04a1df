//! In-process plan graph.
//!
//! [`PlanGraph`] is an [`Engine`] that records submitted nodes in a
//! `petgraph` DAG. It validates names and dependency edges at submission,
//! and exposes the recorded plan in topological order or grouped into
//! parallel execution waves.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use super::{Engine, EngineError, Node, NodeHandle, NodeId};

#[derive(Default)]
struct GraphInner {
  graph: DiGraph<Node, ()>,
  names: HashMap<String, NodeIndex>,
}

/// A recording engine.
///
/// Nodes can only depend on nodes submitted before them, so the graph is
/// acyclic by construction.
#[derive(Default)]
pub struct PlanGraph {
  inner: Mutex<GraphInner>,
}

impl PlanGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rebuild a graph from recorded nodes, e.g. a snapshot.
  ///
  /// Nodes may be listed in any order. Dependency ids are re-resolved by name
  /// and dependencies on nodes that are not part of the record are dropped.
  pub fn restore(nodes: impl IntoIterator<Item = Node>) -> Result<Self, EngineError> {
    let graph = Self::new();
    {
      let mut guard = graph.lock();
      let GraphInner { graph: dag, names } = &mut *guard;

      for node in nodes {
        if node.name.is_empty() {
          return Err(EngineError::EmptyName);
        }
        if names.contains_key(&node.name) {
          return Err(EngineError::DuplicateName(node.name));
        }
        let name = node.name.clone();
        let idx = dag.add_node(node);
        names.insert(name, idx);
      }

      let indices: Vec<NodeIndex> = dag.node_indices().collect();
      for idx in indices {
        let node = &mut dag[idx];
        node.depends_on.retain(|dep| names.contains_key(&dep.name));
        let mut deps = Vec::with_capacity(node.depends_on.len());
        for dep in &mut node.depends_on {
          let from = names[&dep.name];
          dep.id = NodeId(from.index());
          deps.push(from);
        }
        for from in deps {
          dag.update_edge(from, idx, ());
        }
      }
    }

    graph.topological()?;
    debug!(nodes = graph.len(), "plan restored");
    Ok(graph)
  }

  fn lock(&self) -> MutexGuard<'_, GraphInner> {
    // Nodes and edges are only added after validation, so a poisoned graph
    // is still consistent.
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn len(&self) -> usize {
    self.lock().graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Look up a node by name.
  pub fn node(&self, name: &str) -> Option<Node> {
    let inner = self.lock();
    inner.names.get(name).map(|&idx| inner.graph[idx].clone())
  }

  /// All nodes in submission order.
  pub fn nodes(&self) -> Vec<Node> {
    let inner = self.lock();
    inner.graph.node_indices().map(|idx| inner.graph[idx].clone()).collect()
  }

  /// Names of the direct dependencies of `name`, sorted.
  pub fn dependencies(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Incoming)
  }

  /// Names of the nodes that directly depend on `name`, sorted.
  pub fn dependents(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Outgoing)
  }

  fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
    let inner = self.lock();
    let Some(&idx) = inner.names.get(name) else {
      return Vec::new();
    };
    let mut names: Vec<String> = inner
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| inner.graph[n].name.clone())
      .collect();
    names.sort();
    names.dedup();
    names
  }

  /// Nodes in an order where dependencies come before dependents.
  pub fn topological(&self) -> Result<Vec<Node>, EngineError> {
    let inner = self.lock();
    let sorted = toposort(&inner.graph, None).map_err(|_| EngineError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| inner.graph[idx].clone()).collect())
  }

  /// Nodes grouped into waves that can run in parallel.
  ///
  /// Every node's dependencies are in earlier waves. Within a wave nodes keep
  /// submission order.
  pub fn waves(&self) -> Result<Vec<Vec<Node>>, EngineError> {
    let inner = self.lock();
    let sorted = toposort(&inner.graph, None).map_err(|_| EngineError::CycleDetected)?;

    let mut level: HashMap<NodeIndex, usize> = HashMap::new();
    for &idx in &sorted {
      let node_level = inner
        .graph
        .neighbors_directed(idx, Direction::Incoming)
        .map(|dep| level[&dep] + 1)
        .max()
        .unwrap_or(0);
      level.insert(idx, node_level);
    }

    let depth = level.values().copied().max().map_or(0, |max| max + 1);
    let mut waves: Vec<Vec<Node>> = vec![Vec::new(); depth];
    for idx in inner.graph.node_indices() {
      waves[level[&idx]].push(inner.graph[idx].clone());
    }
    Ok(waves)
  }
}

impl Engine for PlanGraph {
  fn submit(&self, node: Node) -> Result<NodeHandle, EngineError> {
    let mut inner = self.lock();

    if node.name.is_empty() {
      return Err(EngineError::EmptyName);
    }
    if inner.names.contains_key(&node.name) {
      return Err(EngineError::DuplicateName(node.name));
    }

    let mut deps = Vec::with_capacity(node.depends_on.len());
    for dep in &node.depends_on {
      match inner.names.get(&dep.name) {
        Some(&idx) if idx.index() == dep.id.0 => deps.push(idx),
        _ => {
          return Err(EngineError::UnknownDependency {
            node: node.name.clone(),
            dependency: dep.name.clone(),
          });
        }
      }
    }
    deps.sort();
    deps.dedup();

    let name = node.name.clone();
    let connection = node.connection.to_string();
    let idx = inner.graph.add_node(node);
    for dep in &deps {
      inner.graph.add_edge(*dep, idx, ());
    }
    inner.names.insert(name.clone(), idx);

    info!(node = %name, target = %connection, deps = deps.len(), "node submitted");
    debug!(node = %name, id = idx.index(), "node recorded");

    Ok(NodeHandle {
      id: NodeId(idx.index()),
      name,
    })
  }
}
