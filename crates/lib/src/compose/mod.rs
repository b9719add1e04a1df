//! Container stacks brought up with `docker compose`.
//!
//! A [`ComposeManager`] installs the container engine and the pinned compose
//! CLI plugin once per manager, then for each stack:
//!
//! 1. fingerprints the compose content
//! 2. creates `<prefix>/compose-<fp>` on the target
//! 3. transfers the compose file into it
//! 4. brings the stack up, waiting for health, with a bounded timeout
//!
//! The remote path embeds the fingerprint, so different definitions under the
//! same stack name never share a file, and unchanged content keeps its path.
//! The bring-up node triggers on the fingerprint, so any content change
//! tears the old stack down before the new one comes up.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::command::CommandSpec;
use crate::consts::{COMPOSE_PATH_HASH_LEN, DEFAULT_COMPOSE_TIMEOUT_SECS, DEFAULT_COMPOSE_VERSION};
use crate::engine::NodeHandle;
use crate::os::OsFamily;
use crate::package::PackageInstaller;
use crate::runner::{CommandOptions, Runner, RunnerError};
use crate::util::hash::{Fingerprint, fingerprint_file, fingerprint_strings};
use crate::util::shell::quote;

/// Settings for a [`ComposeManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeOptions {
  /// Container engine CLI, e.g. `docker` or `podman`.
  pub engine: String,
  /// Package that provides the engine.
  pub engine_package: String,
  pub compose_version: String,
  /// Architecture suffix of the compose release asset.
  pub compose_arch: String,
  /// Where the compose CLI plugin binary is installed.
  pub plugin_dir: String,
  pub timeout_secs: u64,
  /// Parent directory of the per-stack compose directories.
  pub remote_dir_prefix: String,
  /// Run engine commands with sudo.
  pub sudo: bool,
  /// Extra environment for `compose up` and `compose down`.
  pub environment: BTreeMap<String, String>,
}

impl Default for ComposeOptions {
  fn default() -> Self {
    Self {
      engine: "docker".to_string(),
      engine_package: "docker.io".to_string(),
      compose_version: DEFAULT_COMPOSE_VERSION.to_string(),
      compose_arch: "x86_64".to_string(),
      plugin_dir: "/usr/local/lib/docker/cli-plugins".to_string(),
      timeout_secs: DEFAULT_COMPOSE_TIMEOUT_SECS,
      remote_dir_prefix: "/tmp".to_string(),
      sudo: true,
      environment: BTreeMap::new(),
    }
  }
}

impl ComposeOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_engine(mut self, engine: impl Into<String>, package: impl Into<String>) -> Self {
    self.engine = engine.into();
    self.engine_package = package.into();
    self
  }

  pub fn with_compose_version(mut self, version: impl Into<String>) -> Self {
    self.compose_version = version.into();
    self
  }

  pub fn with_compose_arch(mut self, arch: impl Into<String>) -> Self {
    self.compose_arch = arch.into();
    self
  }

  pub fn with_plugin_dir(mut self, dir: impl Into<String>) -> Self {
    self.plugin_dir = dir.into();
    self
  }

  pub fn with_timeout_secs(mut self, secs: u64) -> Self {
    self.timeout_secs = secs;
    self
  }

  pub fn with_remote_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.remote_dir_prefix = prefix.into();
    self
  }

  pub fn with_sudo(mut self, sudo: bool) -> Self {
    self.sudo = sudo;
    self
  }

  pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.environment.insert(name.into(), value.into());
    self
  }

  /// Release asset URL of the pinned compose plugin.
  pub fn compose_download_url(&self) -> String {
    format!(
      "https://github.com/docker/compose/releases/download/{}/docker-compose-linux-{}",
      self.compose_version, self.compose_arch
    )
  }

  /// Remote directory for content with `fingerprint`.
  pub fn remote_dir(&self, fingerprint: &Fingerprint) -> String {
    format!(
      "{}/compose-{}",
      self.remote_dir_prefix.trim_end_matches('/'),
      fingerprint.prefix(COMPOSE_PATH_HASH_LEN)
    )
  }

  /// Remote compose file for content with `fingerprint`.
  pub fn remote_file(&self, fingerprint: &Fingerprint) -> String {
    format!("{}/compose.yaml", self.remote_dir(fingerprint))
  }

  pub fn up_command(&self, remote_file: &str) -> String {
    format!(
      "{} compose -f {} up --detach --wait --timeout {}",
      self.engine,
      quote(remote_file),
      self.timeout_secs
    )
  }

  pub fn down_command(&self, remote_file: &str) -> String {
    format!(
      "{} compose -f {} down -t {}",
      self.engine,
      quote(remote_file),
      self.timeout_secs
    )
  }
}

/// Where compose content comes from.
#[derive(Clone, Copy)]
enum Source<'a> {
  File(&'a Path),
  Inline(&'a str),
}

/// Brings compose stacks up on one runner's target.
#[derive(Debug)]
pub struct ComposeManager {
  runner: Arc<Runner>,
  installer: Arc<PackageInstaller>,
  options: ComposeOptions,
  engine: OnceCell<NodeHandle>,
  bootstrap: OnceCell<Vec<NodeHandle>>,
}

impl ComposeManager {
  pub fn new(runner: Arc<Runner>, installer: Arc<PackageInstaller>, options: ComposeOptions) -> Self {
    Self {
      runner,
      installer,
      options,
      engine: OnceCell::new(),
      bootstrap: OnceCell::new(),
    }
  }

  pub fn options(&self) -> &ComposeOptions {
    &self.options
  }

  /// Engine package plus compose plugin, submitted once per manager.
  ///
  /// Each step is kept once submitted, so a retry after a failed plugin
  /// submission does not install the engine twice. Only Unix targets are
  /// supported.
  pub fn bootstrap(&self) -> Result<&[NodeHandle], RunnerError> {
    let family = self.runner.os().family();
    if family != OsFamily::Unix {
      return Err(RunnerError::UnsupportedFamily {
        what: "compose stack",
        family,
      });
    }

    let handles = self.bootstrap.get_or_try_init(|| {
      debug!(engine = %self.options.engine, version = %self.options.compose_version, "bootstrapping compose");
      let engine = self
        .engine
        .get_or_try_init(|| self.installer.ensure(&self.options.engine_package))?
        .clone();
      let plugin = self.runner.download_executable(
        &format!("compose-plugin-{}", self.options.compose_version),
        &self.options.compose_download_url(),
        &format!("{}/docker-compose", self.options.plugin_dir.trim_end_matches('/')),
        self.options.sudo,
        CommandOptions::new().depends_on(&engine),
      )?;
      Ok::<_, RunnerError>(vec![engine, plugin])
    })?;
    Ok(handles.as_slice())
  }

  /// Bring up the stack defined by the local file `compose_file`.
  pub fn bring_up(&self, name: &str, compose_file: &Path, opts: CommandOptions) -> Result<NodeHandle, RunnerError> {
    self.bring_up_source(name, Source::File(compose_file), opts)
  }

  /// Bring up the stack defined by `content`.
  pub fn bring_up_from_content(&self, name: &str, content: &str, opts: CommandOptions) -> Result<NodeHandle, RunnerError> {
    self.bring_up_source(name, Source::Inline(content), opts)
  }

  fn bring_up_source(&self, name: &str, source: Source<'_>, opts: CommandOptions) -> Result<NodeHandle, RunnerError> {
    let bootstrap = self.bootstrap()?.to_vec();

    let fingerprint = match source {
      Source::File(path) => fingerprint_file(path).map_err(|source| RunnerError::Io {
        path: path.display().to_string(),
        source,
      })?,
      Source::Inline(content) => fingerprint_strings([content]),
    };
    let remote_dir = self.options.remote_dir(&fingerprint);
    let remote_file = self.options.remote_file(&fingerprint);

    // The transfer runs as the login user, so the directory must be theirs.
    let dir = self
      .runner
      .create_directory(&format!("{}-dir", name), &remote_dir, false, opts.clone())?;
    let transfer_opts = opts.clone().depends_on(&dir);
    let transfer = match source {
      Source::File(path) => self
        .runner
        .copy_file(&format!("{}-file", name), path, &remote_file, transfer_opts)?,
      Source::Inline(content) => self.runner.copy_inline_file(
        &format!("{}-file", name),
        &remote_file,
        content,
        false,
        false,
        transfer_opts,
      )?,
    };

    let spec = CommandSpec::new(self.options.up_command(&remote_file))
      .with_delete(self.options.down_command(&remote_file))
      .with_trigger(&fingerprint)
      .with_environment(self.options.environment.clone())
      .with_sudo(self.options.sudo);
    let up = self.runner.command(
      &format!("{}-up", name),
      spec,
      opts.depends_on_all(&bootstrap).depends_on(&transfer),
    )?;

    info!(stack = %name, node = %up.name, file = %remote_file, "compose stack planned");
    Ok(up)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::Trigger;
  use crate::connection::{Connection, SshTarget};
  use crate::engine::{Engine, EngineError, NodeKind, PlanGraph};
  use crate::package::PackageManager;

  const COMPOSE: &str = "services:\n  web:\n    image: nginx:alpine\n";

  fn setup(options: ComposeOptions) -> (Arc<PlanGraph>, ComposeManager) {
    let graph = Arc::new(PlanGraph::new());
    let runner = Runner::new(
      graph.clone(),
      Arc::new(Connection::ssh(SshTarget::new("10.0.0.5", "ubuntu"))),
      OsFamily::Unix,
    )
    .with_cloud_init_gate()
    .unwrap();
    let runner = Arc::new(runner);
    let installer = Arc::new(PackageInstaller::new(runner.clone(), PackageManager::Apt));
    (graph, ComposeManager::new(runner, installer, options))
  }

  fn command(graph: &PlanGraph, name: &str) -> crate::engine::CommandNode {
    match graph.node(name).unwrap().kind {
      NodeKind::Command(cmd) => cmd,
      other => panic!("unexpected node {:?}", other),
    }
  }

  #[test]
  fn bring_up_from_content_builds_the_full_chain() {
    let (graph, manager) = setup(ComposeOptions::default());
    let up = manager
      .bring_up_from_content("web", COMPOSE, CommandOptions::new())
      .unwrap();

    let fp = fingerprint_strings([COMPOSE]);
    let file = format!("/tmp/compose-{}/compose.yaml", fp.prefix(12));
    let cmd = command(&graph, &up.name);
    assert_eq!(
      cmd.create.as_deref(),
      Some(format!("sudo docker compose -f {} up --detach --wait --timeout 300", file).as_str())
    );
    assert_eq!(
      cmd.delete.as_deref(),
      Some(format!("sudo docker compose -f {} down -t 300", file).as_str())
    );
    assert_eq!(cmd.triggers, vec![Trigger::from(&fp)]);

    let deps = graph.dependencies(&up.name);
    for expected in ["cloud-init", "apt-install-docker.io", "compose-plugin-v2.29.7", "web-file"] {
      assert!(
        deps.iter().any(|d| d.ends_with(expected)),
        "missing {} in {:?}",
        expected,
        deps
      );
    }

    // gate, refresh, install, plugin, dir, file, up
    assert_eq!(graph.len(), 7);
    let waves = graph.waves().unwrap();
    assert_eq!(waves.last().unwrap()[0].name, up.name);
  }

  #[test]
  fn two_stacks_share_one_bootstrap() {
    let (graph, manager) = setup(ComposeOptions::default());
    manager.bring_up_from_content("web", COMPOSE, CommandOptions::new()).unwrap();
    manager
      .bring_up_from_content("db", "services:\n  db:\n    image: postgres\n", CommandOptions::new())
      .unwrap();

    let plugin_nodes = graph
      .nodes()
      .into_iter()
      .filter(|n| n.name.contains("compose-plugin"))
      .count();
    assert_eq!(plugin_nodes, 1);
    assert_eq!(graph.len(), 10);
  }

  #[test]
  fn file_source_is_transferred_by_copy() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("compose.yaml");
    std::fs::write(&path, COMPOSE).unwrap();

    let (graph, manager) = setup(ComposeOptions::default());
    let up = manager.bring_up("web", &path, CommandOptions::new()).unwrap();
    let file_node = graph
      .nodes()
      .into_iter()
      .find(|n| n.name.ends_with("web-file"))
      .unwrap();
    match file_node.kind {
      NodeKind::CopyFile(copy) => {
        let fp = fingerprint_file(&path).unwrap();
        assert_eq!(copy.remote_path, format!("/tmp/compose-{}/compose.yaml", fp.prefix(12)));
        assert_eq!(copy.source, path);
      }
      other => panic!("expected copy node, got {:?}", other),
    }
    assert!(graph.dependencies(&up.name).contains(&file_node.name));
  }

  #[test]
  fn same_content_same_path_different_content_different_path() {
    let options = ComposeOptions::default();
    let a = options.remote_file(&fingerprint_strings([COMPOSE]));
    let b = options.remote_file(&fingerprint_strings([COMPOSE]));
    let c = options.remote_file(&fingerprint_strings(["services: {}\n"]));
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn options_shape_the_commands() {
    let options = ComposeOptions::new()
      .with_engine("podman", "podman")
      .with_timeout_secs(60)
      .with_sudo(false)
      .with_remote_dir_prefix("/srv/stacks/")
      .with_env("COMPOSE_PROJECT_NAME", "web");
    let (graph, manager) = setup(options);
    let up = manager
      .bring_up_from_content("web", COMPOSE, CommandOptions::new())
      .unwrap();

    let cmd = command(&graph, &up.name);
    let create = cmd.create.unwrap();
    assert!(create.starts_with("COMPOSE_PROJECT_NAME=\"web\" podman compose -f /srv/stacks/compose-"));
    assert!(create.ends_with("up --detach --wait --timeout 60"));
    assert!(cmd.delete.unwrap().ends_with("down -t 60"));
  }

  #[test]
  fn plugin_download_follows_sudo_option() {
    let (graph, manager) = setup(ComposeOptions::new().with_sudo(false));
    manager.bring_up_from_content("web", COMPOSE, CommandOptions::new()).unwrap();

    let plugin = graph
      .nodes()
      .into_iter()
      .find(|n| n.name.contains("compose-plugin"))
      .unwrap();
    let cmd = command(&graph, &plugin.name);
    let create = cmd.create.unwrap();
    assert!(!create.starts_with("sudo"), "unexpected sudo: {}", create);
    assert!(create.contains("curl -fsSL"));
    assert!(!cmd.delete.unwrap().starts_with("sudo"));
    assert!(cmd.triggers.contains(&Trigger::Bool(false)));

    let (graph, manager) = setup(ComposeOptions::default());
    manager.bootstrap().unwrap();
    let plugin = graph
      .nodes()
      .into_iter()
      .find(|n| n.name.contains("compose-plugin"))
      .unwrap();
    assert!(command(&graph, &plugin.name).create.unwrap().starts_with("sudo "));
  }

  #[test]
  fn failed_plugin_submission_keeps_the_engine_install() {
    let (graph, manager) = setup(ComposeOptions::default());
    let taken = manager.runner.resource_name("compose-plugin-v2.29.7");
    graph
      .submit(crate::engine::Node {
        name: taken.clone(),
        connection: manager.runner.connection().clone(),
        kind: NodeKind::Command(Default::default()),
        depends_on: Vec::new(),
      })
      .unwrap();

    for _ in 0..2 {
      let err = manager
        .bring_up_from_content("web", COMPOSE, CommandOptions::new())
        .unwrap_err();
      match err {
        RunnerError::Engine(EngineError::DuplicateName(name)) => assert_eq!(name, taken),
        other => panic!("unexpected error {:?}", other),
      }
    }

    let installs = graph
      .nodes()
      .into_iter()
      .filter(|n| n.name.ends_with("apt-install-docker.io"))
      .count();
    assert_eq!(installs, 1);
    assert!(manager.engine.get().is_some());
    assert!(manager.bootstrap.get().is_none());
  }

  #[test]
  fn windows_targets_are_rejected() {
    let graph = Arc::new(PlanGraph::new());
    let runner = Arc::new(Runner::new(graph.clone(), Arc::new(Connection::local()), OsFamily::Windows));
    let installer = Arc::new(PackageInstaller::new(runner.clone(), PackageManager::Apt));
    let manager = ComposeManager::new(runner, installer, ComposeOptions::default());

    let err = manager
      .bring_up_from_content("web", COMPOSE, CommandOptions::new())
      .unwrap_err();
    assert!(matches!(
      err,
      RunnerError::UnsupportedFamily {
        family: OsFamily::Windows,
        ..
      }
    ));
    assert!(graph.is_empty());
  }

  #[test]
  fn missing_compose_file_aborts_before_any_stack_node() {
    let (graph, manager) = setup(ComposeOptions::default());
    let err = manager
      .bring_up("web", Path::new("/no/such/compose.yaml"), CommandOptions::new())
      .unwrap_err();
    assert!(matches!(err, RunnerError::Io { .. }));
    assert!(graph.nodes().iter().all(|n| !n.name.contains("web-")));
  }

  #[test]
  fn download_url_is_pinned() {
    assert_eq!(
      ComposeOptions::default().compose_download_url(),
      "https://github.com/docker/compose/releases/download/v2.29.7/docker-compose-linux-x86_64"
    );
  }
}
