//! Arguments shared by the stack commands and the plan they describe.
//!
//! One invocation manages one compose stack on one host: the engine package
//! and compose plugin are installed, the compose file is transferred under a
//! content-addressed directory and the stack is brought up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use provis_lib::compose::{ComposeManager, ComposeOptions};
use provis_lib::connection::{Connection, Credential, SshTarget};
use provis_lib::consts::DEFAULT_COMPOSE_VERSION;
use provis_lib::engine::PlanGraph;
use provis_lib::execute::ExecuteConfig;
use provis_lib::os::OsFamily;
use provis_lib::package::{PackageInstaller, PackageManager};
use provis_lib::runner::{CommandOptions, Runner};
use provis_lib::snapshot::SnapshotStore;

/// Where a stack's state is recorded.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
  /// Stack name, used in resource names and the snapshot file name
  #[arg(short, long, default_value = "stack")]
  pub name: String,

  /// Directory holding one snapshot per stack
  #[arg(long, default_value = ".provis")]
  pub state_dir: PathBuf,

  /// Maximum number of nodes run at once
  #[arg(short = 'j', long, default_value_t = 4)]
  pub parallelism: usize,
}

impl StateArgs {
  pub fn store(&self) -> SnapshotStore {
    SnapshotStore::for_stack(&self.state_dir, &self.name)
  }

  pub fn execute_config(&self) -> ExecuteConfig {
    ExecuteConfig {
      parallelism: self.parallelism.max(1),
    }
  }
}

/// The desired stack.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
  /// Compose file to deploy
  pub compose: PathBuf,

  #[command(flatten)]
  pub state: StateArgs,

  /// Remote host; the local machine when omitted
  #[arg(long)]
  pub host: Option<String>,

  /// SSH user
  #[arg(short, long, default_value = "root")]
  pub user: String,

  /// SSH port
  #[arg(short, long, default_value_t = 22)]
  pub port: u16,

  /// Private key passed to ssh and scp
  #[arg(short, long, conflicts_with = "password_env")]
  pub identity: Option<PathBuf>,

  /// Environment variable holding the SSH password (requires sshpass)
  #[arg(long)]
  pub password_env: Option<String>,

  /// Operating system family of the target (compose stacks need unix)
  #[arg(long, default_value = "unix")]
  pub os: OsFamily,

  /// Package manager of the target
  #[arg(long, default_value = "apt")]
  pub package_manager: PackageManager,

  /// Wait for cloud-init before running anything
  #[arg(long)]
  pub wait_cloud_init: bool,

  /// Container engine CLI
  #[arg(long, default_value = "docker")]
  pub engine: String,

  /// Package providing the container engine
  #[arg(long, default_value = "docker.io")]
  pub engine_package: String,

  /// Compose plugin release to install
  #[arg(long, default_value = DEFAULT_COMPOSE_VERSION)]
  pub compose_version: String,

  /// Architecture of the compose plugin binary
  #[arg(long, default_value = "x86_64")]
  pub compose_arch: String,

  /// Bound on bring-up and tear-down, e.g. `90s` or `5m`
  #[arg(long, default_value = "300s", value_parser = humantime::parse_duration)]
  pub timeout: Duration,

  /// Parent directory for transferred compose files
  #[arg(long, default_value = "/tmp")]
  pub remote_dir: String,

  /// Run package, plugin and engine commands without sudo
  #[arg(long)]
  pub no_sudo: bool,
}

impl StackArgs {
  pub fn connection(&self) -> Connection {
    let Some(host) = &self.host else {
      return Connection::local();
    };

    let credential = match (&self.identity, &self.password_env) {
      (Some(path), _) => Credential::KeyFile { path: path.clone() },
      (None, Some(var)) => Credential::PasswordEnv { var: var.clone() },
      (None, None) => Credential::Agent,
    };
    Connection::ssh(
      SshTarget::new(host.clone(), self.user.clone())
        .with_port(self.port)
        .with_credential(credential),
    )
  }

  pub fn compose_options(&self) -> ComposeOptions {
    ComposeOptions::new()
      .with_engine(&self.engine, &self.engine_package)
      .with_compose_version(&self.compose_version)
      .with_compose_arch(&self.compose_arch)
      .with_timeout_secs(self.timeout.as_secs().max(1))
      .with_remote_dir_prefix(&self.remote_dir)
      .with_sudo(!self.no_sudo)
  }

  fn compose_path(&self) -> Result<PathBuf> {
    dunce::canonicalize(&self.compose)
      .with_context(|| format!("Compose file not found: {}", self.compose.display()))
  }

  /// Record the stack's nodes in a fresh plan graph.
  pub fn build_plan(&self) -> Result<Arc<PlanGraph>> {
    let compose = self.compose_path()?;
    let graph = Arc::new(PlanGraph::new());

    let mut runner = Runner::new(graph.clone(), Arc::new(self.connection()), self.os);
    if self.wait_cloud_init {
      runner = runner
        .with_cloud_init_gate()
        .context("Failed to add readiness gate")?;
    }
    let runner = Arc::new(runner);

    let installer = Arc::new(PackageInstaller::new(runner.clone(), self.package_manager).with_sudo(!self.no_sudo));
    let manager = ComposeManager::new(runner, installer, self.compose_options());
    manager
      .bring_up(&self.state.name, &compose, CommandOptions::new())
      .with_context(|| format!("Failed to plan stack {}", self.state.name))?;

    debug!(stack = %self.state.name, nodes = graph.len(), "plan built");
    Ok(graph)
  }
}
