//! Types for plan execution.

use thiserror::Error;

use crate::engine::{EngineError, Node};
use crate::util::hash::HashError;

/// Errors that can occur while applying or destroying a plan.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Command exited unsuccessfully (or was killed by a signal).
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// The environment variable holding an SSH password is not set.
  #[error("password variable {0} is not set")]
  MissingSecret(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error("failed to hash node: {0}")]
  Hash(#[from] HashError),

  /// A node task panicked or was aborted.
  #[error("execution task failed: {0}")]
  Task(String),

  #[error("execution was cancelled")]
  Cancelled,
}

/// Configuration for plan execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of nodes running at once within a wave.
  pub parallelism: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
    }
  }
}

/// Outcome of an apply pass.
#[derive(Debug, Default)]
pub struct ApplyResult {
  /// Nodes whose create or update ran successfully.
  pub applied: Vec<String>,
  /// Previously applied nodes whose delete ran (removed or replaced).
  pub deleted: Vec<String>,
  /// Nodes identical to the previous apply.
  pub unchanged: Vec<String>,
  /// The first node that failed, which stopped the pass.
  pub failed: Option<(String, ExecuteError)>,
  /// Nodes not attempted because the pass stopped.
  pub skipped: Vec<String>,
  /// Nodes present on their targets after the pass, to be recorded.
  pub state: Vec<Node>,
}

impl ApplyResult {
  pub fn is_success(&self) -> bool {
    self.failed.is_none()
  }
}

/// Outcome of a destroy pass.
#[derive(Debug, Default)]
pub struct DestroyResult {
  pub deleted: Vec<String>,
  pub failed: Option<(String, ExecuteError)>,
  /// Nodes still present after the pass, to be recorded.
  pub remaining: Vec<Node>,
}

impl DestroyResult {
  pub fn is_success(&self) -> bool {
    self.failed.is_none()
  }
}
