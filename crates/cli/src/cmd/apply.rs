//! Implementation of the `provis apply` command.
//!
//! Builds the desired plan, applies it against the stack's snapshot and
//! records what is now present, even when the pass stopped early.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};

use provis_lib::execute::{SystemTransport, apply};
use provis_lib::snapshot::Snapshot;

use crate::output::{format_duration, print_error, print_stat, print_success, print_warning};

use super::StackArgs;

/// Execute the apply command.
///
/// - Loads the previous snapshot, if any
/// - Deletes removed and replaced nodes
/// - Runs the remaining creates and updates wave by wave
/// - Saves the new snapshot
///
/// Exits non-zero if a node failed.
pub fn cmd_apply(args: &StackArgs) -> Result<()> {
  let graph = args.build_plan()?;
  let store = args.state.store();
  let previous = store
    .load()
    .with_context(|| format!("Failed to load snapshot: {}", store.path().display()))?
    .map(|s| s.nodes)
    .unwrap_or_default();

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt
    .block_on(apply(
      &graph,
      &previous,
      Arc::new(SystemTransport::new()),
      &args.state.execute_config(),
    ))
    .context("Apply failed")?;

  let snapshot = Snapshot::from_nodes(result.state.clone()).context("Failed to record applied nodes")?;
  store
    .save(&snapshot)
    .with_context(|| format!("Failed to save snapshot: {}", store.path().display()))?;

  println!();
  print_stat("Applied", &result.applied.len().to_string());
  print_stat("Deleted", &result.deleted.len().to_string());
  print_stat("Unchanged", &result.unchanged.len().to_string());
  if !result.skipped.is_empty() {
    print_warning(&format!("{} node(s) skipped", result.skipped.len()));
  }

  if let Some((node, err)) = &result.failed {
    print_error(&format!("{} failed: {}", node, err));
    bail!("apply of stack {} stopped after a failure", args.state.name);
  }

  print_success(&format!(
    "Stack {} applied in {}",
    args.state.name,
    format_duration(started.elapsed())
  ));
  Ok(())
}
