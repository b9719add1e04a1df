use std::collections::BTreeMap;

use crate::command::{CommandSpec, Trigger};
use crate::consts::DEFAULT_BACKUP_SUFFIX;
use crate::util::hash::fingerprint_strings;
use crate::util::shell::{double_quote, quote};

use super::{OsCommands, OsFamily, SynthError, require_env_names, require_path};

/// Command synthesis for Unix-like hosts (POSIX `sh`, `sudo`, coreutils).
///
/// Multi-statement scripts are wrapped in `sh -c '...'` so that every emitted
/// text stays a single command that can be prefixed with `sudo` or environment
/// assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixCommands {
  backup_suffix: String,
}

impl Default for UnixCommands {
  fn default() -> Self {
    Self {
      backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
    }
  }
}

impl UnixCommands {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
    self.backup_suffix = suffix.into();
    self
  }

  /// Where a pre-existing file at `path` is kept while ours is in place.
  pub fn backup_path(&self, path: &str) -> String {
    format!("{}.{}", path, self.backup_suffix)
  }
}

fn sh(script: &str) -> String {
  format!("sh -c {}", quote(script))
}

impl OsCommands for UnixCommands {
  fn family(&self) -> OsFamily {
    OsFamily::Unix
  }

  fn create_directory(&self, path: &str, use_sudo: bool) -> Result<CommandSpec, SynthError> {
    require_path("directory", path)?;
    let p = quote(path);

    // Only an empty directory is removed; anything written into it after
    // creation survives the delete.
    let delete = sh(&format!(
      "if [ -d {p} ] && [ -z \"$(ls -A {p})\" ]; then rmdir {p}; fi",
      p = p
    ));

    Ok(
      CommandSpec::new(format!("mkdir -p {}", p))
        .with_delete(delete)
        .with_triggers([Trigger::from(path), Trigger::from(use_sudo)])
        .with_sudo(use_sudo),
    )
  }

  fn copy_inline_file(
    &self,
    remote_path: &str,
    content: &str,
    use_sudo: bool,
    append: bool,
  ) -> Result<CommandSpec, SynthError> {
    require_path("file", remote_path)?;
    let p = quote(remote_path);
    let b = quote(&self.backup_path(remote_path));

    // Content is staged first so a repeated create can tell our own file
    // from an original. An existing backup is never overwritten.
    let write = if append {
      format!(
        "if [ -e {b} ]; then :; elif [ ! -f {p} ]; then cat \"$t\" > {p}; \
         elif ! cmp -s {p} \"$t\"; then cp -p {p} {b} && cat \"$t\" >> {p}; fi",
        p = p,
        b = b
      )
    } else {
      format!(
        "if [ -f {p} ] && [ ! -e {b} ] && ! cmp -s {p} \"$t\"; then mv {p} {b}; fi && cat \"$t\" > {p}",
        p = p,
        b = b
      )
    };
    let create = sh(&format!(
      "t=$(mktemp) && cat > \"$t\" && {write}; s=$?; rm -f \"$t\"; exit $s",
      write = write
    ));
    let delete = sh(&format!(
      "if [ -f {b} ]; then mv {b} {p}; else rm -f {p}; fi",
      p = p,
      b = b
    ));

    Ok(
      CommandSpec::new(create)
        .with_delete(delete)
        .with_triggers([
          Trigger::from(remote_path),
          Trigger::from(&fingerprint_strings([content])),
          Trigger::from(use_sudo),
          Trigger::from(append),
        ])
        .with_stdin(content)
        .with_sudo(use_sudo),
    )
  }

  fn download_executable(&self, url: &str, path: &str, use_sudo: bool) -> Result<CommandSpec, SynthError> {
    if url.trim().is_empty() {
      return Err(SynthError::EmptyUrl);
    }
    require_path("download", path)?;
    let p = quote(path);

    let create = sh(&format!(
      "mkdir -p \"$(dirname {p})\" && curl -fsSL -o {p} {u} && chmod +x {p}",
      p = p,
      u = quote(url)
    ));

    Ok(
      CommandSpec::new(create)
        .with_delete(format!("rm -f {}", p))
        .with_triggers([Trigger::from(url), Trigger::from(path), Trigger::from(use_sudo)])
        .with_sudo(use_sudo),
    )
  }

  fn build_command_string(
    &self,
    command: Option<&str>,
    env: &BTreeMap<String, String>,
    sudo: bool,
    user: Option<&str>,
  ) -> Result<Option<String>, SynthError> {
    let Some(command) = command else {
      return Ok(None);
    };
    require_env_names(env)?;

    let mut parts: Vec<String> = Vec::new();
    if sudo {
      parts.push("sudo".to_string());
    } else if let Some(user) = user {
      parts.push(format!("sudo -u {}", quote(user)));
    }

    if !env.is_empty() {
      // sudo resets the environment, so assignments go through env(1).
      if !parts.is_empty() {
        parts.push("env".to_string());
      }
      for (name, value) in env {
        parts.push(format!("{}={}", name, double_quote(value)));
      }
    }

    parts.push(command.to_string());
    Ok(Some(parts.join(" ")))
  }
}
