//! Diff computation between plans.
//!
//! Given the nodes recorded by the last apply and the nodes of the desired
//! plan, decide per node name whether to create, update, replace, delete or
//! leave it alone.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::util::hash::HashError;

use super::{Node, NodeKind};

/// What happens to one node on the next apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
  /// New node: run `create`.
  Create,
  /// Same triggers, different content: run `update` (or `create` when there is none).
  Update,
  /// Triggers changed: run the old `delete`, then the new `create`.
  Replace,
  /// Gone from the desired plan: run the old `delete`.
  Delete,
  /// Identical to what was applied.
  Unchanged,
}

/// Diff between the desired plan and the last applied one.
///
/// Each list keeps the order of the plan it was taken from.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PlanDiff {
  pub create: Vec<String>,
  pub update: Vec<String>,
  pub replace: Vec<String>,
  pub delete: Vec<String>,
  pub unchanged: Vec<String>,
}

impl PlanDiff {
  /// Returns true if applying would do nothing.
  pub fn is_empty(&self) -> bool {
    self.create.is_empty() && self.update.is_empty() && self.replace.is_empty() && self.delete.is_empty()
  }

  /// Number of nodes that would run something.
  pub fn change_count(&self) -> usize {
    self.create.len() + self.update.len() + self.replace.len() + self.delete.len()
  }

  /// The change decided for `name`, if it appears in either plan.
  pub fn change_for(&self, name: &str) -> Option<Change> {
    let lists = [
      (&self.create, Change::Create),
      (&self.update, Change::Update),
      (&self.replace, Change::Replace),
      (&self.delete, Change::Delete),
      (&self.unchanged, Change::Unchanged),
    ];
    lists
      .into_iter()
      .find(|(list, _)| list.iter().any(|n| n == name))
      .map(|(_, change)| change)
  }
}

/// Decide how `previous` becomes `desired`.
///
/// Trigger values are compared first: any difference, or a change of node
/// kind or target, forces replacement. Otherwise a different content hash is
/// an in-place update.
pub fn decide(previous: &Node, desired: &Node) -> Result<Change, HashError> {
  let same_kind = matches!(
    (&previous.kind, &desired.kind),
    (NodeKind::Command(_), NodeKind::Command(_)) | (NodeKind::CopyFile(_), NodeKind::CopyFile(_))
  );
  if !same_kind || previous.connection != desired.connection || previous.kind.triggers() != desired.kind.triggers() {
    return Ok(Change::Replace);
  }

  if previous.content_hash()? != desired.content_hash()? {
    Ok(Change::Update)
  } else {
    Ok(Change::Unchanged)
  }
}

/// Compute the diff between `desired` and the nodes applied last time.
///
/// # Diff Logic
///
/// - names only in `desired` → `create`
/// - names only in `previous` → `delete`
/// - names in both → [`decide`]
pub fn compute_diff(desired: &[Node], previous: &[Node]) -> Result<PlanDiff, HashError> {
  let mut diff = PlanDiff::default();
  let previous_by_name: HashMap<&str, &Node> = previous.iter().map(|n| (n.name.as_str(), n)).collect();
  let desired_names: HashSet<&str> = desired.iter().map(|n| n.name.as_str()).collect();

  for node in desired {
    match previous_by_name.get(node.name.as_str()) {
      None => diff.create.push(node.name.clone()),
      Some(old) => match decide(old, node)? {
        Change::Replace => diff.replace.push(node.name.clone()),
        Change::Update => diff.update.push(node.name.clone()),
        _ => diff.unchanged.push(node.name.clone()),
      },
    }
  }

  for node in previous {
    if !desired_names.contains(node.name.as_str()) {
      diff.delete.push(node.name.clone());
    }
  }

  Ok(diff)
}
