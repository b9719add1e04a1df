//! Target connections.
//!
//! A [`Connection`] says where commands run: the local machine or a remote host
//! reached over SSH. Connections are read-only after construction and shared
//! behind an `Arc` by every node that targets the same host.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to authenticate an SSH session.
///
/// Secrets are never stored inline: password authentication names the
/// environment variable that holds the password at execution time, so
/// connections can be persisted in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
  /// Use whatever the local SSH agent offers.
  #[default]
  Agent,
  /// A private key file passed with `-i`.
  KeyFile { path: PathBuf },
  /// A password read from the named environment variable.
  PasswordEnv { var: String },
}

/// A remote host reachable over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
  pub host: String,
  pub port: u16,
  pub user: String,
  #[serde(default)]
  pub credential: Credential,
}

impl SshTarget {
  pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      port: 22,
      user: user.into(),
      credential: Credential::Agent,
    }
  }

  pub fn with_port(mut self, port: u16) -> Self {
    self.port = port;
    self
  }

  pub fn with_credential(mut self, credential: Credential) -> Self {
    self.credential = credential;
    self
  }

  /// The `user@host` destination understood by `ssh` and `scp`.
  pub fn destination(&self) -> String {
    format!("{}@{}", self.user, self.host)
  }
}

/// Where a command executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Connection {
  Local,
  Ssh(SshTarget),
}

impl Connection {
  pub fn local() -> Self {
    Connection::Local
  }

  pub fn ssh(target: SshTarget) -> Self {
    Connection::Ssh(target)
  }

  pub fn is_local(&self) -> bool {
    matches!(self, Connection::Local)
  }

  /// A name-safe identity used to prefix resource names.
  ///
  /// Characters outside `[A-Za-z0-9-]` become `-`, e.g. `ubuntu-10-0-0-5` for
  /// `ubuntu@10.0.0.5`. The port is included only when it is not 22.
  pub fn identity(&self) -> String {
    match self {
      Connection::Local => "local".to_string(),
      Connection::Ssh(target) => {
        let raw = if target.port == 22 {
          format!("{}-{}", target.user, target.host)
        } else {
          format!("{}-{}-{}", target.user, target.host, target.port)
        };
        raw
          .chars()
          .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
          .collect()
      }
    }
  }
}

impl fmt::Display for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Connection::Local => write!(f, "local"),
      Connection::Ssh(target) if target.port == 22 => write!(f, "{}", target.destination()),
      Connection::Ssh(target) => write!(f, "{}:{}", target.destination(), target.port),
    }
  }
}
