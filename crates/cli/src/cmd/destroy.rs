//! Implementation of the `provis destroy` command.
//!
//! Runs the delete text of every node recorded for the stack, dependents
//! first, then removes the snapshot.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use provis_lib::execute::{SystemTransport, destroy};
use provis_lib::snapshot::Snapshot;

use crate::output::{print_error, print_info, print_success};

use super::StateArgs;

/// Execute the destroy command.
///
/// If a delete fails, the nodes not yet deleted are written back to the
/// snapshot so a later destroy can resume.
pub fn cmd_destroy(args: &StateArgs) -> Result<()> {
  let store = args.store();
  let Some(snapshot) = store
    .load()
    .with_context(|| format!("Failed to load snapshot: {}", store.path().display()))?
  else {
    print_info("Nothing to destroy.");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt
    .block_on(destroy(
      &snapshot.nodes,
      Arc::new(SystemTransport::new()),
      &args.execute_config(),
    ))
    .context("Destroy failed")?;

  if result.remaining.is_empty() {
    store.clear().context("Failed to remove snapshot")?;
  } else {
    let remaining = Snapshot::from_nodes(result.remaining.clone()).context("Failed to record remaining nodes")?;
    store.save(&remaining).context("Failed to save snapshot")?;
  }

  if let Some((node, err)) = &result.failed {
    print_error(&format!("{} failed: {}", node, err));
    bail!("{} node(s) of stack {} remain", result.remaining.len(), args.name);
  }

  print_success(&format!("Destroyed {} node(s) of stack {}", result.deleted.len(), args.name));
  Ok(())
}
