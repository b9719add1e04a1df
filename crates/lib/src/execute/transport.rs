//! Running command text on a target.
//!
//! A [`Transport`] is the boundary between a plan and the hosts it targets:
//! it runs one command line (optionally feeding stdin) and copies files.
//! [`SystemTransport`] does this with local shells and the OpenSSH client
//! tools.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::connection::{Connection, Credential, SshTarget};

use super::types::ExecuteError;

/// Runs commands and copies files on targets.
pub trait Transport: Send + Sync + 'static {
  /// Run `command` on `connection`, returning its trimmed stdout.
  ///
  /// A non-zero exit status is an error.
  fn run(
    &self,
    connection: &Connection,
    command: &str,
    stdin: Option<&str>,
  ) -> impl Future<Output = Result<String, ExecuteError>> + Send;

  /// Copy the local file `source` to `remote_path` on `connection`.
  fn copy(
    &self,
    connection: &Connection,
    source: &Path,
    remote_path: &str,
  ) -> impl Future<Output = Result<(), ExecuteError>> + Send;
}

/// Local shells plus `ssh`/`scp` (and `sshpass` for password logins).
#[derive(Debug, Clone)]
pub struct SystemTransport {
  pub ssh_program: String,
  pub scp_program: String,
  pub sshpass_program: String,
}

impl Default for SystemTransport {
  fn default() -> Self {
    Self {
      ssh_program: "ssh".to_string(),
      scp_program: "scp".to_string(),
      sshpass_program: "sshpass".to_string(),
    }
  }
}

impl SystemTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
    self.ssh_program = program.into();
    self
  }

  pub fn with_scp_program(mut self, program: impl Into<String>) -> Self {
    self.scp_program = program.into();
    self
  }

  /// Build the process for `program args...`, going through `sshpass -e` when
  /// the target authenticates with a password.
  fn remote_command(&self, target: &SshTarget, program: &str, args: Vec<String>) -> Result<Command, ExecuteError> {
    match &target.credential {
      Credential::PasswordEnv { var } => {
        let password = std::env::var(var).map_err(|_| ExecuteError::MissingSecret(var.clone()))?;
        let mut command = Command::new(&self.sshpass_program);
        command.arg("-e").arg(program).args(args).env("SSHPASS", password);
        Ok(command)
      }
      _ => {
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
      }
    }
  }
}

/// Options shared by `ssh` and `scp`.
fn auth_options(target: &SshTarget) -> Vec<String> {
  let mut args = Vec::new();
  match &target.credential {
    Credential::Agent => {
      args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
    }
    Credential::KeyFile { path } => {
      args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
      args.extend(["-i".to_string(), path.display().to_string()]);
    }
    // BatchMode would disable the password prompt sshpass answers.
    Credential::PasswordEnv { .. } => {
      args.extend(["-o".to_string(), "PubkeyAuthentication=no".to_string()]);
    }
  }
  args
}

/// Arguments for `ssh` running `command` on `target`.
pub fn ssh_args(target: &SshTarget, command: &str) -> Vec<String> {
  let mut args = auth_options(target);
  args.extend(["-p".to_string(), target.port.to_string()]);
  args.push(target.destination());
  args.push("--".to_string());
  args.push(command.to_string());
  args
}

/// Arguments for `scp` copying `source` to `remote_path` on `target`.
pub fn scp_args(target: &SshTarget, source: &Path, remote_path: &str) -> Vec<String> {
  let mut args = auth_options(target);
  args.extend(["-P".to_string(), target.port.to_string()]);
  args.push(source.display().to_string());
  args.push(format!("{}:{}", target.destination(), remote_path));
  args
}

/// The local shell used for [`Connection::Local`].
fn local_shell(command: &str) -> Command {
  if cfg!(windows) {
    let mut cmd = Command::new("powershell.exe");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", command]);
    cmd
  } else {
    let mut cmd = Command::new("/bin/sh");
    cmd.args(["-c", command]);
    cmd
  }
}

/// Spawn `command`, feed `stdin` and wait for it.
async fn run_process(mut command: Command, display: &str, stdin: Option<&str>) -> Result<String, ExecuteError> {
  command
    .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  let mut child = command.spawn()?;
  let pipe = child.stdin.take();
  let feed = async move {
    if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
      match pipe.write_all(input.as_bytes()).await {
        // The command may exit without reading its input.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => return Err(e),
        Ok(()) => {}
      }
    }
    Ok(())
  };

  let (fed, output) = tokio::join!(feed, child.wait_with_output());
  let output = output?;
  fed?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
      debug!(stderr = %stderr.trim(), "command stderr");
    }
    return Err(ExecuteError::CmdFailed {
      cmd: display.to_string(),
      code: output.status.code(),
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }
  Ok(stdout)
}

impl Transport for SystemTransport {
  async fn run(&self, connection: &Connection, command: &str, stdin: Option<&str>) -> Result<String, ExecuteError> {
    info!(target_host = %connection, "running command");
    debug!(cmd = %command, stdin = stdin.is_some(), "command text");

    let process = match connection {
      Connection::Local => local_shell(command),
      Connection::Ssh(target) => self.remote_command(target, &self.ssh_program, ssh_args(target, command))?,
    };
    run_process(process, command, stdin).await
  }

  async fn copy(&self, connection: &Connection, source: &Path, remote_path: &str) -> Result<(), ExecuteError> {
    info!(target_host = %connection, source = %source.display(), dest = %remote_path, "copying file");

    match connection {
      Connection::Local => {
        tokio::fs::copy(source, remote_path).await?;
        Ok(())
      }
      Connection::Ssh(target) => {
        let args = scp_args(target, source, remote_path);
        let display = format!("{} {}", self.scp_program, args.join(" "));
        let process = self.remote_command(target, &self.scp_program, args)?;
        run_process(process, &display, None).await.map(|_| ())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn target() -> SshTarget {
    SshTarget::new("10.0.0.5", "ubuntu")
  }

  #[test]
  fn ssh_args_use_batch_mode_for_agent() {
    assert_eq!(
      ssh_args(&target(), "uptime"),
      vec!["-o", "BatchMode=yes", "-p", "22", "ubuntu@10.0.0.5", "--", "uptime"]
    );
  }

  #[test]
  fn key_file_is_passed_with_i() {
    let t = target()
      .with_port(2222)
      .with_credential(Credential::KeyFile {
        path: PathBuf::from("/keys/id_ed25519"),
      });
    let args = ssh_args(&t, "true");
    assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_ed25519"]));
    assert!(args.windows(2).any(|w| w == ["-p", "2222"]));

    let scp = scp_args(&t, Path::new("compose.yaml"), "/tmp/c/compose.yaml");
    assert!(scp.windows(2).any(|w| w == ["-P", "2222"]));
    assert_eq!(scp.last().unwrap(), "ubuntu@10.0.0.5:/tmp/c/compose.yaml");
  }

  #[test]
  fn password_login_skips_batch_mode() {
    let t = target().with_credential(Credential::PasswordEnv {
      var: "PROVIS_TEST_PW".to_string(),
    });
    assert!(!ssh_args(&t, "true").contains(&"BatchMode=yes".to_string()));
  }

  #[tokio::test]
  async fn missing_password_variable_is_reported() {
    let t = target().with_credential(Credential::PasswordEnv {
      var: "PROVIS_TEST_PASSWORD_THAT_IS_NOT_SET".to_string(),
    });
    let err = SystemTransport::new()
      .run(&Connection::ssh(t), "true", None)
      .await
      .unwrap_err();
    assert!(matches!(err, ExecuteError::MissingSecret(var) if var == "PROVIS_TEST_PASSWORD_THAT_IS_NOT_SET"));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn local_run_returns_stdout_and_feeds_stdin() {
    let transport = SystemTransport::new();
    let out = transport.run(&Connection::local(), "echo hi", None).await.unwrap();
    assert_eq!(out, "hi");

    let out = transport.run(&Connection::local(), "cat", Some("from stdin\n")).await.unwrap();
    assert_eq!(out, "from stdin");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn local_failure_carries_exit_code() {
    let err = SystemTransport::new()
      .run(&Connection::local(), "exit 3", None)
      .await
      .unwrap_err();
    assert!(matches!(err, ExecuteError::CmdFailed { code: Some(3), .. }));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn unread_stdin_is_not_an_error() {
    let out = SystemTransport::new()
      .run(&Connection::local(), "echo ignored", Some("payload"))
      .await
      .unwrap();
    assert_eq!(out, "ignored");
  }

  #[tokio::test]
  async fn local_copy() {
    let temp = tempfile::TempDir::new().unwrap();
    let source = temp.path().join("src.txt");
    let dest = temp.path().join("dest.txt");
    std::fs::write(&source, "payload").unwrap();

    SystemTransport::new()
      .copy(&Connection::local(), &source, dest.to_str().unwrap())
      .await
      .unwrap();
    assert_eq!(std::fs::read_to_string(dest).unwrap(), "payload");
  }
}
