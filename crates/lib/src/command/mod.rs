//! Command specifications.
//!
//! A [`CommandSpec`] describes one lifecycle-bound action on a target host:
//! what to run on create, on update and on delete, and which values force a
//! replacement when they change. It is a plain value; the
//! [`Runner`](crate::runner::Runner) renders it into command text and submits it
//! to an engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::hash::Fingerprint;

/// An opaque comparable value whose change forces replacement.
///
/// Serialized untagged, so a trigger list is a plain JSON array such as
/// `["/srv/app", true, 3]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
  Bool(bool),
  Int(i64),
  String(String),
}

impl From<&str> for Trigger {
  fn from(value: &str) -> Self {
    Trigger::String(value.to_string())
  }
}

impl From<String> for Trigger {
  fn from(value: String) -> Self {
    Trigger::String(value)
  }
}

impl From<bool> for Trigger {
  fn from(value: bool) -> Self {
    Trigger::Bool(value)
  }
}

impl From<i64> for Trigger {
  fn from(value: i64) -> Self {
    Trigger::Int(value)
  }
}

impl From<&Fingerprint> for Trigger {
  fn from(value: &Fingerprint) -> Self {
    Trigger::String(value.0.clone())
  }
}

impl std::fmt::Display for Trigger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Trigger::Bool(b) => write!(f, "{}", b),
      Trigger::Int(n) => write!(f, "{}", n),
      Trigger::String(s) => write!(f, "{}", s),
    }
  }
}

/// One lifecycle-bound action.
///
/// # Fields
///
/// - `create`: run when the action is first applied (or replaced)
/// - `update`: run when the action changed but its triggers did not
/// - `delete`: the undo action, run on destroy or before replacement
/// - `triggers`: values whose change forces delete + create
/// - `stdin`: payload piped to the command
/// - `environment`: merged into the command text, never passed out of band
/// - `sudo`: run with elevated privileges
///
/// Without `create` the spec is a no-op and `update`/`delete` are never emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
  pub create: Option<String>,
  pub update: Option<String>,
  pub delete: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub triggers: Vec<Trigger>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stdin: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub environment: BTreeMap<String, String>,
  #[serde(default)]
  pub sudo: bool,
}

impl CommandSpec {
  pub fn new(create: impl Into<String>) -> Self {
    Self {
      create: Some(create.into()),
      ..Self::default()
    }
  }

  pub fn with_update(mut self, update: impl Into<String>) -> Self {
    self.update = Some(update.into());
    self
  }

  pub fn with_delete(mut self, delete: impl Into<String>) -> Self {
    self.delete = Some(delete.into());
    self
  }

  pub fn with_trigger(mut self, trigger: impl Into<Trigger>) -> Self {
    self.triggers.push(trigger.into());
    self
  }

  pub fn with_triggers<I, T>(mut self, triggers: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Trigger>,
  {
    self.triggers = triggers.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
    self.stdin = Some(stdin.into());
    self
  }

  pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.environment.insert(name.into(), value.into());
    self
  }

  pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
    self.environment.extend(environment);
    self
  }

  pub fn with_sudo(mut self, sudo: bool) -> Self {
    self.sudo = sudo;
    self
  }

  /// Whether this spec performs no action.
  pub fn is_noop(&self) -> bool {
    self.create.is_none()
  }

  /// The `(create, update, delete)` texts, with update and delete suppressed
  /// when there is nothing to create.
  pub fn lifecycle(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
    match self.create.as_deref() {
      Some(create) => (Some(create), self.update.as_deref(), self.delete.as_deref()),
      None => (None, None, None),
    }
  }
}
