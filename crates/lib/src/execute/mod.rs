//! Plan execution.
//!
//! This module applies a recorded plan to its targets and tears it down again.
//! It handles:
//! - diffing the desired plan against the last snapshot
//! - running deletes for removed and replaced nodes, newest first
//! - running creates and updates wave by wave, in parallel within a wave
//! - stopping at the first failure and reporting what was skipped

pub mod transport;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::engine::{Change, Node, NodeKind, PlanGraph, compute_diff};

pub use transport::{SystemTransport, Transport};
pub use types::{ApplyResult, DestroyResult, ExecuteConfig, ExecuteError};

/// One thing to do on a target.
#[derive(Debug, Clone)]
enum Step {
  Run {
    connection: Arc<Connection>,
    text: String,
    stdin: Option<String>,
  },
  Copy {
    connection: Arc<Connection>,
    source: PathBuf,
    remote_path: String,
  },
  /// Nothing to run, e.g. a command without delete text.
  Skip,
}

/// The step that brings `node` to its desired state for `change`.
fn forward_step(node: &Node, change: Change) -> Step {
  match &node.kind {
    NodeKind::Command(cmd) => {
      let text = match change {
        Change::Update => cmd.update.as_ref().or(cmd.create.as_ref()),
        _ => cmd.create.as_ref(),
      };
      match text {
        Some(text) => Step::Run {
          connection: node.connection.clone(),
          text: text.clone(),
          stdin: cmd.stdin.clone(),
        },
        None => Step::Skip,
      }
    }
    NodeKind::CopyFile(copy) => Step::Copy {
      connection: node.connection.clone(),
      source: copy.source.clone(),
      remote_path: copy.remote_path.clone(),
    },
  }
}

/// The step that undoes `node`.
fn delete_step(node: &Node) -> Step {
  match node.kind.delete() {
    Some(text) => Step::Run {
      connection: node.connection.clone(),
      text: text.to_string(),
      stdin: None,
    },
    None => Step::Skip,
  }
}

async fn run_step<T: Transport>(transport: &T, step: Step) -> Result<(), ExecuteError> {
  match step {
    Step::Run { connection, text, stdin } => transport.run(&connection, &text, stdin.as_deref()).await.map(|_| ()),
    Step::Copy {
      connection,
      source,
      remote_path,
    } => transport.copy(&connection, &source, &remote_path).await,
    Step::Skip => Ok(()),
  }
}

/// Run the steps of one wave in parallel.
///
/// Results come back in input order regardless of completion order.
async fn execute_wave<T: Transport>(
  steps: Vec<(String, Step)>,
  transport: Arc<T>,
  semaphore: Arc<Semaphore>,
) -> Vec<(String, Result<(), ExecuteError>)> {
  let mut join_set = JoinSet::new();
  let names: Vec<String> = steps.iter().map(|(name, _)| name.clone()).collect();

  for (idx, (name, step)) in steps.into_iter().enumerate() {
    let transport = transport.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let result = match semaphore.acquire_owned().await {
        Ok(_permit) => {
          debug!(node = %name, "node started");
          run_step(transport.as_ref(), step).await
        }
        Err(_) => Err(ExecuteError::Cancelled),
      };
      (idx, result)
    });
  }

  let mut results: Vec<Option<Result<(), ExecuteError>>> = names.iter().map(|_| None).collect();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((idx, result)) => results[idx] = Some(result),
      Err(e) => error!(error = %e, "node task panicked"),
    }
  }

  names
    .into_iter()
    .zip(results)
    .map(|(name, result)| {
      let result = result.unwrap_or_else(|| Err(ExecuteError::Task(format!("task for {} did not finish", name))));
      (name, result)
    })
    .collect()
}

/// Insert or overwrite `node` in `state` by name.
fn record(state: &mut Vec<Node>, node: Node) {
  match state.iter_mut().find(|n| n.name == node.name) {
    Some(slot) => *slot = node,
    None => state.push(node),
  }
}

/// Apply `desired` to its targets.
///
/// `previous` is what the last apply left behind (see
/// [`crate::snapshot::Snapshot`]). The pass has two phases:
///
/// 1. Deletes for removed nodes and for the old side of replaced nodes, in
///    reverse order of the previous plan, one at a time.
/// 2. Creates and updates for new, replaced and changed nodes, wave by wave.
///
/// The first failure stops the pass: nothing after it is attempted and the
/// remaining nodes are listed as skipped. Partial remote state is not rolled
/// back; [`ApplyResult::state`] records what is known to be present so the
/// next pass picks up from there.
pub async fn apply<T: Transport>(
  desired: &PlanGraph,
  previous: &[Node],
  transport: Arc<T>,
  config: &ExecuteConfig,
) -> Result<ApplyResult, ExecuteError> {
  let desired_nodes = desired.nodes();
  let diff = compute_diff(&desired_nodes, previous)?;
  let waves = desired.waves()?;

  info!(
    create = diff.create.len(),
    update = diff.update.len(),
    replace = diff.replace.len(),
    delete = diff.delete.len(),
    waves = waves.len(),
    "starting apply"
  );

  let mut result = ApplyResult {
    state: previous.to_vec(),
    ..ApplyResult::default()
  };

  for node in previous.iter().rev() {
    let change = diff.change_for(&node.name);
    if !matches!(change, Some(Change::Delete) | Some(Change::Replace)) {
      continue;
    }
    if result.failed.is_some() {
      result.skipped.push(node.name.clone());
      continue;
    }

    info!(node = %node.name, "deleting node");
    match run_step(transport.as_ref(), delete_step(node)).await {
      Ok(()) => {
        result.deleted.push(node.name.clone());
        result.state.retain(|n| n.name != node.name);
      }
      Err(e) => {
        error!(node = %node.name, error = %e, "delete failed");
        result.failed = Some((node.name.clone(), e));
      }
    }
  }

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for (wave_idx, wave) in waves.into_iter().enumerate() {
    let mut ready = Vec::new();
    let mut planned = Vec::new();

    for node in wave {
      match diff.change_for(&node.name) {
        Some(Change::Unchanged) => {
          result.unchanged.push(node.name.clone());
          record(&mut result.state, node);
        }
        _ if result.failed.is_some() => {
          if !result.skipped.contains(&node.name) {
            warn!(node = %node.name, "skipping node after earlier failure");
            result.skipped.push(node.name.clone());
          }
        }
        change => {
          let step = forward_step(&node, change.unwrap_or(Change::Create));
          ready.push((node.name.clone(), step));
          planned.push(node);
        }
      }
    }

    if ready.is_empty() {
      continue;
    }
    debug!(wave = wave_idx, nodes = ready.len(), "executing wave");

    let outcomes = execute_wave(ready, transport.clone(), semaphore.clone()).await;
    for ((name, outcome), node) in outcomes.into_iter().zip(planned) {
      match outcome {
        Ok(()) => {
          info!(node = %name, "node applied");
          result.applied.push(name);
          record(&mut result.state, node);
        }
        Err(e) => {
          error!(node = %name, error = %e, "node failed");
          if result.failed.is_none() {
            result.failed = Some((name, e));
          }
        }
      }
    }
  }

  info!(
    applied = result.applied.len(),
    deleted = result.deleted.len(),
    unchanged = result.unchanged.len(),
    skipped = result.skipped.len(),
    failed = result.failed.is_some(),
    "apply complete"
  );

  Ok(result)
}

/// Run the delete text of every recorded node, dependents first.
///
/// Nodes in the same (reversed) wave run in parallel. Nodes without delete
/// text are simply forgotten. The first failure stops the pass and the nodes
/// not yet deleted are returned in [`DestroyResult::remaining`].
pub async fn destroy<T: Transport>(
  recorded: &[Node],
  transport: Arc<T>,
  config: &ExecuteConfig,
) -> Result<DestroyResult, ExecuteError> {
  let graph = PlanGraph::restore(recorded.to_vec())?;
  let mut waves = graph.waves()?;
  waves.reverse();

  info!(nodes = recorded.len(), waves = waves.len(), "starting destroy");

  let mut result = DestroyResult::default();
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for wave in waves {
    if result.failed.is_some() {
      break;
    }
    let steps = wave.iter().map(|node| (node.name.clone(), delete_step(node))).collect();
    for (name, outcome) in execute_wave(steps, transport.clone(), semaphore.clone()).await {
      match outcome {
        Ok(()) => {
          info!(node = %name, "node deleted");
          result.deleted.push(name);
        }
        Err(e) => {
          error!(node = %name, error = %e, "delete failed");
          if result.failed.is_none() {
            result.failed = Some((name, e));
          }
        }
      }
    }
  }

  result.remaining = recorded
    .iter()
    .filter(|n| !result.deleted.contains(&n.name))
    .cloned()
    .collect();

  info!(
    deleted = result.deleted.len(),
    remaining = result.remaining.len(),
    "destroy complete"
  );

  Ok(result)
}
