//! Idempotent package installation.
//!
//! [`PackageInstaller::ensure`] submits one install node per package. Every
//! install depends on a shared index refresh node that the installer creates
//! on first use and reuses afterwards. Creation of that node is single-flight:
//! concurrent first calls still produce exactly one refresh.
//!
//! Packages are never removed on destroy, so install nodes carry no update or
//! delete text.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{CommandSpec, Trigger};
use crate::engine::NodeHandle;
use crate::os::OsFamily;
use crate::runner::{CommandOptions, Runner, RunnerError};
use crate::util::shell::quote;

/// Supported system package managers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
  #[default]
  Apt,
  Dnf,
  Apk,
}

impl PackageManager {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Apt => "apt",
      Self::Dnf => "dnf",
      Self::Apk => "apk",
    }
  }

  fn noninteractive(&self, spec: CommandSpec) -> CommandSpec {
    match self {
      Self::Apt => spec.with_env("DEBIAN_FRONTEND", "noninteractive"),
      Self::Dnf | Self::Apk => spec,
    }
  }

  /// Refresh the package index.
  pub fn refresh_spec(&self, sudo: bool) -> CommandSpec {
    let text = match self {
      Self::Apt => "apt-get update",
      Self::Dnf => "dnf makecache -y",
      Self::Apk => "apk update",
    };
    self
      .noninteractive(CommandSpec::new(text))
      .with_trigger(self.as_str())
      .with_sudo(sudo)
  }

  /// Install `package` without prompting.
  pub fn install_spec(&self, package: &str, sudo: bool) -> CommandSpec {
    let text = match self {
      Self::Apt => format!("apt-get install -y --no-install-recommends {}", quote(package)),
      Self::Dnf => format!("dnf install -y {}", quote(package)),
      Self::Apk => format!("apk add --no-cache {}", quote(package)),
    };
    self
      .noninteractive(CommandSpec::new(text))
      .with_triggers([Trigger::from(self.as_str()), Trigger::from(package)])
      .with_sudo(sudo)
  }
}

impl fmt::Display for PackageManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PackageManager {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "apt" | "apt-get" | "debian" | "ubuntu" => Ok(Self::Apt),
      "dnf" | "yum" | "fedora" | "rhel" => Ok(Self::Dnf),
      "apk" | "alpine" => Ok(Self::Apk),
      other => Err(format!("unknown package manager: {}", other)),
    }
  }
}

/// Ensures packages are present on one runner's target.
#[derive(Debug)]
pub struct PackageInstaller {
  runner: Arc<Runner>,
  manager: PackageManager,
  sudo: bool,
  refresh: OnceCell<NodeHandle>,
}

impl PackageInstaller {
  pub fn new(runner: Arc<Runner>, manager: PackageManager) -> Self {
    Self {
      runner,
      manager,
      sudo: true,
      refresh: OnceCell::new(),
    }
  }

  pub fn with_sudo(mut self, sudo: bool) -> Self {
    self.sudo = sudo;
    self
  }

  pub fn manager(&self) -> PackageManager {
    self.manager
  }

  pub fn runner(&self) -> &Arc<Runner> {
    &self.runner
  }

  /// The shared index refresh node, created on first call.
  ///
  /// If submission fails the cell stays empty and a later call tries again.
  pub fn refresh_index(&self) -> Result<NodeHandle, RunnerError> {
    let family = self.runner.os().family();
    if family != OsFamily::Unix {
      return Err(RunnerError::UnsupportedFamily {
        what: self.manager.as_str(),
        family,
      });
    }
    self
      .refresh
      .get_or_try_init(|| {
        debug!(manager = %self.manager, "creating package index refresh");
        self.runner.command(
          &format!("{}-refresh", self.manager),
          self.manager.refresh_spec(self.sudo),
          CommandOptions::new(),
        )
      })
      .cloned()
  }

  /// Submit an install of `package`, after the index refresh.
  pub fn ensure(&self, package: &str) -> Result<NodeHandle, RunnerError> {
    let package = package.trim();
    if package.is_empty() || package.starts_with('-') || package.chars().any(char::is_whitespace) {
      return Err(RunnerError::InvalidPackage(package.to_string()));
    }

    let refresh = self.refresh_index()?;
    self.runner.command(
      &format!("{}-install-{}", self.manager, package),
      self.manager.install_spec(package, self.sudo),
      CommandOptions::new().depends_on(&refresh),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::{Connection, SshTarget};
  use crate::engine::{Engine, NodeKind, PlanGraph};
  use crate::os::OsFamily;

  fn setup(manager: PackageManager) -> (Arc<PlanGraph>, PackageInstaller) {
    let graph = Arc::new(PlanGraph::new());
    let runner = Runner::new(
      graph.clone(),
      Arc::new(Connection::ssh(SshTarget::new("vm", "root"))),
      OsFamily::Unix,
    );
    (graph, PackageInstaller::new(Arc::new(runner), manager))
  }

  fn create_text(graph: &PlanGraph, name: &str) -> String {
    match graph.node(name).unwrap().kind {
      NodeKind::Command(cmd) => cmd.create.unwrap(),
      other => panic!("unexpected node {:?}", other),
    }
  }

  #[test]
  fn two_ensures_share_one_refresh() {
    let (graph, installer) = setup(PackageManager::Apt);
    let docker = installer.ensure("docker.io").unwrap();
    let curl = installer.ensure("curl").unwrap();

    let refreshes: Vec<_> = graph
      .nodes()
      .into_iter()
      .filter(|n| n.name.ends_with("apt-refresh"))
      .collect();
    assert_eq!(refreshes.len(), 1);
    assert_eq!(graph.len(), 3);

    let refresh = &refreshes[0].name;
    assert_eq!(graph.dependencies(&docker.name), vec![refresh.clone()]);
    assert_eq!(graph.dependencies(&curl.name), vec![refresh.clone()]);
  }

  #[test]
  fn apt_runs_noninteractively() {
    let (graph, installer) = setup(PackageManager::Apt);
    let handle = installer.ensure("docker.io").unwrap();
    assert_eq!(
      create_text(&graph, &handle.name),
      "sudo env DEBIAN_FRONTEND=\"noninteractive\" apt-get install -y --no-install-recommends docker.io"
    );
    let refresh = installer.refresh_index().unwrap();
    assert_eq!(
      create_text(&graph, &refresh.name),
      "sudo env DEBIAN_FRONTEND=\"noninteractive\" apt-get update"
    );
  }

  #[test]
  fn install_has_no_update_or_delete() {
    let (graph, installer) = setup(PackageManager::Dnf);
    let handle = installer.ensure("podman").unwrap();
    match graph.node(&handle.name).unwrap().kind {
      NodeKind::Command(cmd) => {
        assert_eq!(cmd.create.as_deref(), Some("sudo dnf install -y podman"));
        assert!(cmd.update.is_none());
        assert!(cmd.delete.is_none());
      }
      other => panic!("unexpected node {:?}", other),
    }
  }

  #[test]
  fn without_sudo() {
    let (graph, installer) = setup(PackageManager::Apk);
    let installer = installer.with_sudo(false);
    let handle = installer.ensure("curl").unwrap();
    assert_eq!(create_text(&graph, &handle.name), "apk add --no-cache curl");
  }

  #[test]
  fn rejects_bad_package_names() {
    let (graph, installer) = setup(PackageManager::Apt);
    for bad in ["", "  ", "two words", "--force-yes"] {
      assert!(matches!(installer.ensure(bad), Err(RunnerError::InvalidPackage(_))));
    }
    assert!(graph.is_empty());
  }

  #[test]
  fn racing_ensures_create_one_refresh() {
    let (graph, installer) = setup(PackageManager::Apt);
    let installer = Arc::new(installer);

    let handles: Vec<_> = (0..8)
      .map(|i| {
        let installer = installer.clone();
        std::thread::spawn(move || installer.ensure(&format!("pkg{}", i)).unwrap())
      })
      .collect();
    let installs: Vec<NodeHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let refresh = installer.refresh_index().unwrap();
    assert_eq!(graph.len(), 9);
    for install in &installs {
      assert_eq!(graph.dependencies(&install.name), vec![refresh.name.clone()]);
    }
  }

  #[test]
  fn failed_refresh_submission_is_retried() {
    let graph = Arc::new(PlanGraph::new());
    let runner = Arc::new(Runner::new(graph.clone(), Arc::new(Connection::local()), OsFamily::Unix));
    let squatter = runner.resource_name("apt-refresh");
    graph
      .submit(crate::engine::Node {
        name: squatter,
        connection: Arc::new(Connection::local()),
        kind: NodeKind::Command(Default::default()),
        depends_on: Vec::new(),
      })
      .unwrap();

    let installer = PackageInstaller::new(runner, PackageManager::Apt);
    assert!(matches!(installer.ensure("curl"), Err(RunnerError::Engine(_))));
    assert!(installer.refresh.get().is_none());
  }

  #[test]
  fn windows_targets_are_rejected() {
    let graph = Arc::new(PlanGraph::new());
    let runner = Runner::new(graph.clone(), Arc::new(Connection::local()), OsFamily::Windows);
    let installer = PackageInstaller::new(Arc::new(runner), PackageManager::Apt);

    let err = installer.ensure("curl").unwrap_err();
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
  fn parses_manager_aliases() {
    assert_eq!("ubuntu".parse::<PackageManager>().unwrap(), PackageManager::Apt);
    assert_eq!("YUM".parse::<PackageManager>().unwrap(), PackageManager::Dnf);
    assert_eq!("alpine".parse::<PackageManager>().unwrap(), PackageManager::Apk);
    assert!("pacman".parse::<PackageManager>().is_err());
  }
}
