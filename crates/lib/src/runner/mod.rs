//! Execution runner.
//!
//! A [`Runner`] binds command specifications to one target connection. It
//! renders each spec through the target's [`OsCommands`], names the node after
//! the connection, adds the readiness gate (if any) as a dependency and submits
//! the node to the [`Engine`].
//!
//! A runner starts without a gate. [`Runner::with_readiness_gate`] creates one
//! at most once; after that the runner only ever adds nodes.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::command::{CommandSpec, Trigger};
use crate::connection::Connection;
use crate::consts::{CLOUD_INIT_WAIT, MAX_NAME_LEN};
use crate::engine::{CommandNode, CopyFileNode, Engine, EngineError, Node, NodeHandle, NodeKind};
use crate::os::{OsCommands, OsFamily, SynthError};
use crate::util::hash::fingerprint_file;
use crate::util::name::shorten_name;

#[derive(Debug, Error)]
pub enum RunnerError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Synth(#[from] SynthError),

  #[error("runner already has a readiness gate: {0}")]
  GateExists(String),

  #[error("invalid package name: {0:?}")]
  InvalidPackage(String),

  #[error("{what} is not supported on {family} targets")]
  UnsupportedFamily { what: &'static str, family: OsFamily },

  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Per-call options for [`Runner::command`].
///
/// Calls apply in order; a later call overrides an earlier one for the same
/// setting. Dependencies accumulate.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
  pub depends_on: Vec<NodeHandle>,
  pub user: Option<String>,
}

impl CommandOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn depends_on(mut self, handle: &NodeHandle) -> Self {
    self.depends_on.push(handle.clone());
    self
  }

  pub fn depends_on_all<'a>(mut self, handles: impl IntoIterator<Item = &'a NodeHandle>) -> Self {
    self.depends_on.extend(handles.into_iter().cloned());
    self
  }

  /// Run as `user` (ignored when the spec asks for `sudo`).
  pub fn as_user(mut self, user: impl Into<String>) -> Self {
    self.user = Some(user.into());
    self
  }

  /// Run as the connecting user.
  pub fn as_login_user(mut self) -> Self {
    self.user = None;
    self
  }
}

/// Submits the commands for one target.
#[derive(Clone)]
pub struct Runner {
  engine: Arc<dyn Engine>,
  connection: Arc<Connection>,
  os: Arc<dyn OsCommands>,
  gate: Option<NodeHandle>,
}

impl std::fmt::Debug for Runner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Runner")
      .field("connection", &self.connection)
      .field("os", &self.os)
      .field("gate", &self.gate)
      .finish_non_exhaustive()
  }
}

impl Runner {
  pub fn new(engine: Arc<dyn Engine>, connection: Arc<Connection>, family: OsFamily) -> Self {
    Self {
      engine,
      connection,
      os: family.commands(),
      gate: None,
    }
  }

  /// Use a specific synthesizer, e.g. [`crate::os::UnixCommands`] with a
  /// custom backup suffix.
  pub fn with_os(mut self, os: Arc<dyn OsCommands>) -> Self {
    self.os = os;
    self
  }

  /// Submit `spec` as the readiness gate every later command depends on.
  ///
  /// Fails with [`RunnerError::GateExists`] if the runner already has one.
  pub fn with_readiness_gate(mut self, name: &str, spec: CommandSpec) -> Result<Self, RunnerError> {
    if let Some(gate) = &self.gate {
      return Err(RunnerError::GateExists(gate.name.clone()));
    }
    let handle = self.submit_command(name, &spec, &CommandOptions::new())?;
    info!(gate = %handle.name, target_host = %self.connection, "readiness gate created");
    self.gate = Some(handle);
    Ok(self)
  }

  /// Gate on first-boot initialization finishing (`cloud-init status --wait`).
  pub fn with_cloud_init_gate(self) -> Result<Self, RunnerError> {
    self.with_readiness_gate("cloud-init", CommandSpec::new(CLOUD_INIT_WAIT))
  }

  pub fn readiness_gate(&self) -> Option<&NodeHandle> {
    self.gate.as_ref()
  }

  pub fn connection(&self) -> &Arc<Connection> {
    &self.connection
  }

  pub fn os(&self) -> &dyn OsCommands {
    self.os.as_ref()
  }

  /// The engine-facing name for `name` on this runner's target.
  pub fn resource_name(&self, name: &str) -> String {
    shorten_name(&format!("{}-{}", self.connection.identity(), name), MAX_NAME_LEN)
  }

  fn dependencies(&self, opts: &CommandOptions) -> Vec<NodeHandle> {
    let mut deps: Vec<NodeHandle> = Vec::with_capacity(opts.depends_on.len() + 1);
    for handle in self.gate.iter().chain(opts.depends_on.iter()) {
      if !deps.iter().any(|d| d.name == handle.name) {
        deps.push(handle.clone());
      }
    }
    deps
  }

  fn submit_command(&self, name: &str, spec: &CommandSpec, opts: &CommandOptions) -> Result<NodeHandle, RunnerError> {
    let (create, update, delete) = spec.lifecycle();
    let user = opts.user.as_deref();
    let render = |text: Option<&str>| self.os.build_command_string(text, &spec.environment, spec.sudo, user);

    let create = render(create)?;
    let node = Node {
      name: self.resource_name(name),
      connection: self.connection.clone(),
      kind: NodeKind::Command(CommandNode {
        stdin: create.as_ref().and(spec.stdin.clone()),
        create,
        update: render(update)?,
        delete: render(delete)?,
        triggers: spec.triggers.clone(),
      }),
      depends_on: self.dependencies(opts),
    };

    if let NodeKind::Command(cmd) = &node.kind {
      debug!(node = %node.name, create = ?cmd.create, delete = ?cmd.delete, "rendered command");
    }
    Ok(self.engine.submit(node)?)
  }

  /// Submit `spec` under `name`.
  ///
  /// The node depends on the readiness gate and on `opts.depends_on`. Engine
  /// errors are returned as-is; nothing is retried.
  pub fn command(&self, name: &str, spec: CommandSpec, opts: CommandOptions) -> Result<NodeHandle, RunnerError> {
    self.submit_command(name, &spec, &opts)
  }

  /// Transfer the local file `local` to `remote_path`.
  ///
  /// The file is fingerprinted now so that a content change replaces the node.
  pub fn copy_file(
    &self,
    name: &str,
    local: &Path,
    remote_path: &str,
    opts: CommandOptions,
  ) -> Result<NodeHandle, RunnerError> {
    if remote_path.trim().is_empty() {
      return Err(SynthError::EmptyPath("destination").into());
    }
    let fingerprint = fingerprint_file(local).map_err(|source| RunnerError::Io {
      path: local.display().to_string(),
      source,
    })?;

    let node = Node {
      name: self.resource_name(name),
      connection: self.connection.clone(),
      kind: NodeKind::CopyFile(CopyFileNode {
        source: local.to_path_buf(),
        remote_path: remote_path.to_string(),
        triggers: vec![Trigger::from(remote_path), Trigger::from(&fingerprint)],
      }),
      depends_on: self.dependencies(&opts),
    };
    Ok(self.engine.submit(node)?)
  }

  pub fn create_directory(
    &self,
    name: &str,
    path: &str,
    use_sudo: bool,
    opts: CommandOptions,
  ) -> Result<NodeHandle, RunnerError> {
    let spec = self.os.create_directory(path, use_sudo)?;
    self.command(name, spec, opts)
  }

  pub fn copy_inline_file(
    &self,
    name: &str,
    remote_path: &str,
    content: &str,
    use_sudo: bool,
    append: bool,
    opts: CommandOptions,
  ) -> Result<NodeHandle, RunnerError> {
    let spec = self.os.copy_inline_file(remote_path, content, use_sudo, append)?;
    self.command(name, spec, opts)
  }

  pub fn download_executable(
    &self,
    name: &str,
    url: &str,
    path: &str,
    use_sudo: bool,
    opts: CommandOptions,
  ) -> Result<NodeHandle, RunnerError> {
    let spec = self.os.download_executable(url, path, use_sudo)?;
    self.command(name, spec, opts)
  }
}

#[cfg(test)]
mod tests {
  use tracing_test::traced_test;

  use super::*;
  use crate::connection::SshTarget;
  use crate::engine::PlanGraph;

  fn setup() -> (Arc<PlanGraph>, Runner) {
    let graph = Arc::new(PlanGraph::new());
    let connection = Arc::new(Connection::ssh(SshTarget::new("10.0.0.5", "ubuntu")));
    let runner = Runner::new(graph.clone(), connection, OsFamily::Unix);
    (graph, runner)
  }

  fn command_node(graph: &PlanGraph, name: &str) -> CommandNode {
    match graph.node(name).unwrap().kind {
      NodeKind::Command(cmd) => cmd,
      other => panic!("expected command node, got {:?}", other),
    }
  }

  #[test]
  fn names_are_prefixed_with_the_connection() {
    let (graph, runner) = setup();
    let handle = runner.command("hello", CommandSpec::new("echo hi"), CommandOptions::new()).unwrap();
    assert_eq!(handle.name, "ubuntu-10-0-0-5-hello");
    assert!(graph.node("ubuntu-10-0-0-5-hello").is_some());
  }

  #[test]
  fn long_names_are_bounded() {
    let (_, runner) = setup();
    let name = runner.resource_name(&"x".repeat(200));
    assert_eq!(name.chars().count(), MAX_NAME_LEN);
  }

  #[test]
  #[traced_test]
  fn gate_precedes_every_command() {
    let (graph, runner) = setup();
    let runner = runner.with_cloud_init_gate().unwrap();
    let gate = runner.readiness_gate().unwrap().clone();

    let a = runner.command("a", CommandSpec::new("true"), CommandOptions::new()).unwrap();
    runner
      .command("b", CommandSpec::new("true"), CommandOptions::new().depends_on(&a))
      .unwrap();

    assert_eq!(graph.dependencies(&a.name), vec![gate.name.clone()]);
    let mut expected = vec![gate.name.clone(), a.name.clone()];
    expected.sort();
    assert_eq!(graph.dependencies("ubuntu-10-0-0-5-b"), expected);
    assert_eq!(command_node(&graph, &gate.name).create.as_deref(), Some(CLOUD_INIT_WAIT));
    assert!(logs_contain("readiness gate created"));
  }

  #[test]
  fn second_gate_is_rejected() {
    let (_, runner) = setup();
    let runner = runner.with_cloud_init_gate().unwrap();
    let err = runner
      .with_readiness_gate("again", CommandSpec::new("true"))
      .unwrap_err();
    assert!(matches!(err, RunnerError::GateExists(name) if name.ends_with("cloud-init")));
  }

  #[test]
  fn no_gate_means_no_implicit_dependency() {
    let (graph, runner) = setup();
    let handle = runner.command("solo", CommandSpec::new("true"), CommandOptions::new()).unwrap();
    assert!(graph.dependencies(&handle.name).is_empty());
  }

  #[test]
  fn environment_and_privilege_are_merged_into_text() {
    let (graph, runner) = setup();
    let spec = CommandSpec::new("echo hi")
      .with_delete("echo bye")
      .with_env("X", "1")
      .with_sudo(true);
    let handle = runner.command("env", spec, CommandOptions::new()).unwrap();
    let cmd = command_node(&graph, &handle.name);
    assert_eq!(cmd.create.as_deref(), Some("sudo env X=\"1\" echo hi"));
    assert_eq!(cmd.delete.as_deref(), Some("sudo env X=\"1\" echo bye"));
  }

  #[test]
  fn later_user_option_wins() {
    let (graph, runner) = setup();
    let opts = CommandOptions::new().as_user("postgres").as_user("deploy");
    let handle = runner.command("who", CommandSpec::new("whoami"), opts).unwrap();
    assert_eq!(command_node(&graph, &handle.name).create.as_deref(), Some("sudo -u deploy whoami"));

    let opts = CommandOptions::new().as_user("postgres").as_login_user();
    let handle = runner.command("me", CommandSpec::new("whoami"), opts).unwrap();
    assert_eq!(command_node(&graph, &handle.name).create.as_deref(), Some("whoami"));
  }

  #[test]
  fn spec_without_create_emits_nothing() {
    let (graph, runner) = setup();
    let spec = CommandSpec {
      delete: Some("rm -rf /srv".to_string()),
      stdin: Some("data".to_string()),
      ..CommandSpec::default()
    };
    let handle = runner.command("empty", spec, CommandOptions::new()).unwrap();
    assert_eq!(command_node(&graph, &handle.name), CommandNode::default());
  }

  #[test]
  fn engine_errors_propagate() {
    let (_, runner) = setup();
    runner.command("dup", CommandSpec::new("true"), CommandOptions::new()).unwrap();
    let err = runner
      .command("dup", CommandSpec::new("true"), CommandOptions::new())
      .unwrap_err();
    assert!(matches!(err, RunnerError::Engine(EngineError::DuplicateName(_))));
  }

  #[test]
  fn synth_errors_propagate() {
    let (graph, runner) = setup();
    let err = runner
      .create_directory("dir", "", false, CommandOptions::new())
      .unwrap_err();
    assert!(matches!(err, RunnerError::Synth(SynthError::EmptyPath(_))));
    assert!(graph.is_empty());
  }

  #[test]
  fn copy_file_triggers_on_content() {
    let temp = tempfile::TempDir::new().unwrap();
    let local = temp.path().join("compose.yaml");
    std::fs::write(&local, "services: {}\n").unwrap();

    let (graph, runner) = setup();
    let handle = runner
      .copy_file("compose", &local, "/tmp/compose.yaml", CommandOptions::new())
      .unwrap();
    let node = graph.node(&handle.name).unwrap();
    let fingerprint = fingerprint_file(&local).unwrap();
    assert_eq!(
      node.kind.triggers(),
      &[Trigger::from("/tmp/compose.yaml"), Trigger::from(&fingerprint)]
    );
  }

  #[test]
  fn copy_file_reports_missing_source() {
    let (_, runner) = setup();
    let err = runner
      .copy_file("missing", Path::new("/definitely/not/here.yaml"), "/tmp/x", CommandOptions::new())
      .unwrap_err();
    assert!(matches!(err, RunnerError::Io { .. }));
  }

  #[test]
  fn inline_file_keeps_stdin() {
    let (graph, runner) = setup();
    let handle = runner
      .copy_inline_file("motd", "/etc/motd", "hello\n", true, false, CommandOptions::new())
      .unwrap();
    assert_eq!(command_node(&graph, &handle.name).stdin.as_deref(), Some("hello\n"));
  }
}
