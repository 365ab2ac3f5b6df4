// src/utils/system.rs: External process execution and remote host helpers

use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use std::process::Stdio;

use anyhow::{anyhow, Result};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::utils::command;


/// A program plus its argument vector. Never run through a shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalCommand { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ChildStream {
    Stdout,
    Stderr,
}

/// Reads one of a child's piped streams to completion, line by line.
pub async fn read_child_output_to_vec(child: &mut Child, stream: ChildStream) -> Result<Vec<String>> {
    let mut lines_out = Vec::new();
    match stream {
        ChildStream::Stdout => {
            let out = child.stdout.take().ok_or_else(|| anyhow!("Child stdout was not piped"))?;
            let mut lines = BufReader::new(out).lines();
            while let Some(line) = lines.next_line().await? {
                lines_out.push(line);
            }
        }
        ChildStream::Stderr => {
            let err = child.stderr.take().ok_or_else(|| anyhow!("Child stderr was not piped"))?;
            let mut lines = BufReader::new(err).lines();
            while let Some(line) = lines.next_line().await? {
                lines_out.push(line);
            }
        }
    }
    child.wait().await?;
    Ok(lines_out)
}


/// Runs a command to completion, capturing stdout and stderr in a scratch
/// directory that is removed on every exit path.
///
/// # Arguments
///
/// * `cmd` - Program and arguments.
///
/// # Returns
///
/// The exit code; -1 when the process was killed by a signal.
pub async fn execute_cmd(cmd: &ExternalCommand) -> Result<i32> {
    info!("Executing the following command:\n{}", cmd);
    let (rc, stdout) = run_captured(cmd).await?;
    for line in String::from_utf8_lossy(&stdout).lines().filter(|l| !l.trim().is_empty()) {
        info!("{}", line);
    }
    Ok(rc)
}

/// Like `execute_cmd`, but hands stdout back to the caller instead of logging it.
pub async fn capture_cmd(cmd: &ExternalCommand) -> Result<(i32, String)> {
    info!("Executing the following command:\n{}", cmd);
    let (rc, stdout) = run_captured(cmd).await?;
    Ok((rc, String::from_utf8_lossy(&stdout).into_owned()))
}

async fn run_captured(cmd: &ExternalCommand) -> Result<(i32, Vec<u8>)> {
    let scratch = tempfile::Builder::new().prefix("seqrun-cmd-").tempdir()?;
    let stdout_path = scratch.path().join("stdout");
    let stderr_path = scratch.path().join("stderr");
    let stdout_file = File::create(&stdout_path)?;
    let stderr_file = File::create(&stderr_path)?;

    let status = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .status()
        .await
        .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", cmd.program, e, cmd.program))?;

    let rc = status.code().unwrap_or(-1);
    if rc != 0 {
        log_failure(cmd, rc, &stderr_path)?;
    }
    Ok((rc, fs::read(&stdout_path)?))
}

fn log_failure(cmd: &ExternalCommand, rc: i32, stderr_path: &Path) -> Result<()> {
    error!("The command\n{}\nreturned exit code {} with the following error:", cmd, rc);
    let stderr = fs::read(stderr_path)?;
    for line in String::from_utf8_lossy(&stderr).lines().filter(|l| !l.trim().is_empty()) {
        error!("{}", line);
    }
    Ok(())
}


/// Checks for a regular file on a remote host over ssh.
pub async fn exists_remote(host: &str, path: &str) -> Result<bool> {
    info!("Checking for existence of file\n{}\non host\n{}", path, host);
    let rc = execute_cmd(&command::ssh_test_file(host, path)).await?;
    info!("Return code from check: {}", rc);
    Ok(rc == 0)
}

pub async fn copy_remote_file(host: &str, remote_path: &str, local_path: &Path) -> Result<bool> {
    info!("Copying file {}:{} to {}", host, remote_path, local_path.display());
    let rc = execute_cmd(&command::scp(host, remote_path, &local_path.display().to_string())).await?;
    Ok(rc == 0)
}

pub async fn copy_remote_directory(host: &str, remote_dir: &str, local_dir: &Path) -> Result<i32> {
    info!("Copying directory {}:{} to {}", host, remote_dir, local_dir.display());
    execute_cmd(&command::rsync(host, remote_dir, &local_dir.display().to_string())).await
}

pub async fn remove_remote_file(host: &str, path: &str) -> Result<i32> {
    info!("Removing file {} from host {}", path, host);
    execute_cmd(&command::ssh_remove_file(host, path)).await
}

/// Recursive copy that never overwrites existing files.
pub async fn copy_local_directory(source_dir: &Path, dest_dir: &Path) -> Result<i32> {
    execute_cmd(&command::cp_no_clobber(
        &source_dir.display().to_string(),
        &dest_dir.display().to_string(),
    ))
    .await
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_display_joins_program_and_args() {
        let cmd = ExternalCommand::new("echo").arg("hello").args(["a", "b"]);
        assert_eq!(cmd.to_string(), "echo hello a b");
    }

    #[tokio::test]
    async fn test_execute_cmd_reports_exit_codes() -> Result<()> {
        assert_eq!(execute_cmd(&ExternalCommand::new("true")).await?, 0);
        assert_eq!(execute_cmd(&ExternalCommand::new("sh").args(["-c", "echo oops >&2; exit 3"])).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_cmd_tolerates_non_utf8_output() -> Result<()> {
        let binary = ExternalCommand::new("sh").args(["-c", r"printf '\377\n'; printf '\376\n' >&2"]);
        assert_eq!(execute_cmd(&binary).await?, 0);
        let failing = ExternalCommand::new("sh").args(["-c", r"printf '\377\n' >&2; exit 2"]);
        assert_eq!(execute_cmd(&failing).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_capture_cmd_returns_stdout() -> Result<()> {
        let (rc, stdout) = capture_cmd(&ExternalCommand::new("sh").args(["-c", "echo 42"])).await?;
        assert_eq!(rc, 0);
        assert_eq!(stdout.trim(), "42");

        let (rc, stdout) = capture_cmd(&ExternalCommand::new("sh").args(["-c", r"printf '\377'; exit 1"])).await?;
        assert_eq!(rc, 1);
        assert_eq!(stdout, "\u{FFFD}");
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_cmd_missing_program_is_an_error() {
        assert!(execute_cmd(&ExternalCommand::new("definitely-not-a-real-binary-xyz")).await.is_err());
    }

    #[tokio::test]
    async fn test_copy_local_directory_does_not_clobber() -> Result<()> {
        let tmp = tempdir()?;
        let src = tmp.path().join("html");
        let dest = tmp.path().join("reports");
        fs::create_dir_all(&src)?;
        fs::create_dir_all(dest.join("html"))?;
        fs::write(src.join("index.html"), "new")?;
        fs::write(dest.join("html").join("index.html"), "old")?;

        copy_local_directory(&src, &dest).await?;
        assert_eq!(fs::read_to_string(dest.join("html").join("index.html"))?, "old");
        Ok(())
    }
}
