//! OS-specific command synthesis.
//!
//! [`OsCommands`] turns abstract intents (make a directory, write a file with a
//! backup, prefix a command with environment and privileges) into command text
//! for one operating system family. Call sites hold an `Arc<dyn OsCommands>`
//! and never name a concrete family.
//!
//! Builders only construct text. They fail on malformed input instead of
//! emitting shell that would do the wrong thing.

mod unix;
mod windows;

pub use unix::UnixCommands;
pub use windows::WindowsCommands;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandSpec;

/// Errors raised while synthesizing command text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthError {
  #[error("{0} path must not be empty")]
  EmptyPath(&'static str),

  #[error("invalid environment variable name: {0:?}")]
  InvalidEnvName(String),

  #[error("url must not be empty")]
  EmptyUrl,
}

/// Operating system families a target can belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
  #[default]
  Unix,
  Windows,
}

impl OsFamily {
  /// The family of the machine this process runs on.
  pub fn current() -> Self {
    if cfg!(windows) { Self::Windows } else { Self::Unix }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Unix => "unix",
      Self::Windows => "windows",
    }
  }

  /// The default command synthesizer for this family.
  pub fn commands(&self) -> Arc<dyn OsCommands> {
    match self {
      Self::Unix => Arc::new(UnixCommands::default()),
      Self::Windows => Arc::new(WindowsCommands),
    }
  }
}

impl fmt::Display for OsFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for OsFamily {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "unix" | "linux" | "darwin" | "macos" => Ok(Self::Unix),
      "windows" => Ok(Self::Windows),
      other => Err(format!("unknown os family: {}", other)),
    }
  }
}

/// Command synthesis for one operating system family.
pub trait OsCommands: Send + Sync + fmt::Debug {
  /// Which family this synthesizer targets.
  fn family(&self) -> OsFamily;

  /// Create `path` and any missing parents.
  ///
  /// Triggers are `[path, use_sudo]`: a directory has no meaningful in-place
  /// update, so any change replaces it.
  fn create_directory(&self, path: &str, use_sudo: bool) -> Result<CommandSpec, SynthError>;

  /// Write `content` to `remote_path` from standard input, reversibly where
  /// the family supports it.
  fn copy_inline_file(
    &self,
    remote_path: &str,
    content: &str,
    use_sudo: bool,
    append: bool,
  ) -> Result<CommandSpec, SynthError>;

  /// Download `url` to `path` and mark it executable.
  fn download_executable(&self, url: &str, path: &str, use_sudo: bool) -> Result<CommandSpec, SynthError>;

  /// Render a full command line from a base command, environment and identity.
  ///
  /// Returns `Ok(None)` when `command` is `None`: an absent command means "no
  /// action", never an empty string. When both `sudo` and `user` are given,
  /// `sudo` wins.
  fn build_command_string(
    &self,
    command: Option<&str>,
    env: &BTreeMap<String, String>,
    sudo: bool,
    user: Option<&str>,
  ) -> Result<Option<String>, SynthError>;
}

fn require_path(kind: &'static str, path: &str) -> Result<(), SynthError> {
  if path.trim().is_empty() {
    return Err(SynthError::EmptyPath(kind));
  }
  Ok(())
}

fn require_env_names(env: &BTreeMap<String, String>) -> Result<(), SynthError> {
  match env.keys().find(|name| !crate::util::shell::is_env_name(name)) {
    Some(name) => Err(SynthError::InvalidEnvName(name.clone())),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn family_parses_aliases() {
    assert_eq!("linux".parse::<OsFamily>().unwrap(), OsFamily::Unix);
    assert_eq!("Windows".parse::<OsFamily>().unwrap(), OsFamily::Windows);
    assert!("plan9".parse::<OsFamily>().is_err());
  }

  #[test]
  fn commands_match_family() {
    for family in [OsFamily::Unix, OsFamily::Windows] {
      assert_eq!(family.commands().family(), family);
    }
  }

  #[test]
  fn absent_command_is_no_action_for_every_family() {
    let mut env = BTreeMap::new();
    env.insert("X".to_string(), "1".to_string());
    for family in [OsFamily::Unix, OsFamily::Windows] {
      let rendered = family.commands().build_command_string(None, &env, true, Some("app")).unwrap();
      assert_eq!(rendered, None);
    }
  }

  #[test]
  fn empty_paths_are_rejected_for_every_family() {
    for family in [OsFamily::Unix, OsFamily::Windows] {
      let os = family.commands();
      assert_eq!(os.create_directory("", false), Err(SynthError::EmptyPath("directory")));
      assert_eq!(
        os.copy_inline_file("  ", "x", false, false),
        Err(SynthError::EmptyPath("file"))
      );
      assert_eq!(os.download_executable("", "/bin/x", false), Err(SynthError::EmptyUrl));
    }
  }
}
