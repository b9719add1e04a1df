use std::collections::BTreeMap;

use tracing::debug;

use crate::command::{CommandSpec, Trigger};
use crate::util::hash::fingerprint_strings;
use crate::util::shell::{powershell_double_quote, powershell_quote};

use super::{OsCommands, OsFamily, SynthError, require_env_names, require_path};

/// Command synthesis for Windows hosts whose remote shell is PowerShell.
///
/// There is no backup/restore for file writes and no privilege elevation;
/// commands run as the connecting user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowsCommands;

impl OsCommands for WindowsCommands {
  fn family(&self) -> OsFamily {
    OsFamily::Windows
  }

  fn create_directory(&self, path: &str, use_sudo: bool) -> Result<CommandSpec, SynthError> {
    require_path("directory", path)?;
    let p = powershell_quote(path);

    Ok(
      CommandSpec::new(format!("New-Item -ItemType Directory -Force -Path {} | Out-Null", p))
        .with_delete(format!(
          "Remove-Item -Recurse -Force -ErrorAction SilentlyContinue -Path {}",
          p
        ))
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
    let p = powershell_quote(remote_path);
    let cmdlet = if append { "Add-Content" } else { "Set-Content" };

    Ok(
      CommandSpec::new(format!("[Console]::In.ReadToEnd() | {} -NoNewline -Path {}", cmdlet, p))
        .with_delete(format!("Remove-Item -Force -ErrorAction SilentlyContinue -Path {}", p))
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
    let p = powershell_quote(path);

    Ok(
      CommandSpec::new(format!(
        "Invoke-WebRequest -UseBasicParsing -Uri {} -OutFile {}",
        powershell_quote(url),
        p
      ))
      .with_delete(format!("Remove-Item -Force -ErrorAction SilentlyContinue -Path {}", p))
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

    if sudo || user.is_some() {
      debug!(sudo, user = ?user, "privilege changes are not available on windows targets");
    }

    let mut statements: Vec<String> = env
      .iter()
      .map(|(name, value)| format!("$env:{}={}", name, powershell_double_quote(value)))
      .collect();
    statements.push(command.to_string());
    Ok(Some(statements.join("; ")))
  }
}
