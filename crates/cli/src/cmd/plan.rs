//! Implementation of the `provis plan` command.
//!
//! Builds the desired plan for the stack and diffs it against the stack's
//! snapshot without running anything.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use provis_lib::engine::{Change, Node, NodeKind, PlanDiff, PlanGraph, compute_diff};

use crate::output::{OutputFormat, change_marker, print_json, symbols};

use super::StackArgs;

pub fn cmd_plan(args: &StackArgs, output: OutputFormat, verbose: bool) -> Result<()> {
  let graph = args.build_plan()?;
  let store = args.state.store();
  let previous = store
    .load()
    .with_context(|| format!("Failed to load snapshot: {}", store.path().display()))?
    .map(|s| s.nodes)
    .unwrap_or_default();

  let desired = graph.nodes();
  let diff = compute_diff(&desired, &previous).context("Failed to diff plan")?;

  if output.is_json() {
    let plan_output = serde_json::json!({
      "stack": args.state.name,
      "target": graph.nodes().first().map(|n| n.connection.to_string()),
      "nodes": desired,
      "diff": diff,
    });
    return print_json(&plan_output);
  }

  print_human_plan(&graph, &previous, &diff, verbose)
}

fn describe(node: &Node) -> String {
  match &node.kind {
    NodeKind::Command(cmd) => cmd.create.clone().unwrap_or_else(|| "(no action)".to_string()),
    NodeKind::CopyFile(copy) => format!("copy {} {} {}", copy.source.display(), symbols::ARROW, copy.remote_path),
  }
}

fn print_human_plan(graph: &PlanGraph, previous: &[Node], diff: &PlanDiff, verbose: bool) -> Result<()> {
  for wave in graph.waves().context("Failed to order plan")? {
    for node in wave {
      let change = diff.change_for(&node.name).unwrap_or(Change::Create);
      if change == Change::Unchanged && !verbose {
        continue;
      }
      println!("{} {}", change_marker(change), node.name);
      if verbose {
        println!(
          "    {}",
          describe(&node).if_supports_color(Stream::Stdout, |s| s.dimmed())
        );
      }
    }
  }

  for name in &diff.delete {
    println!("{} {}", change_marker(Change::Delete), name);
    if verbose {
      if let Some(text) = previous.iter().find(|n| &n.name == name).and_then(|n| n.kind.delete()) {
        println!("    {}", text.if_supports_color(Stream::Stdout, |s| s.dimmed()));
      }
    }
  }

  if diff.is_empty() {
    println!("No changes.");
  } else {
    println!();
    println!(
      "Plan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged",
      diff.create.len(),
      diff.update.len(),
      diff.replace.len(),
      diff.delete.len(),
      diff.unchanged.len()
    );
  }

  Ok(())
}
