/// Waits for a finished run on the sequencer host and mirrors it locally.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use log::{error, info};
use tokio::time::sleep;
use crate::config::defs::{PipelineError, RunConfig, REMOTE_POLL_INTERVAL, RSYNC_TAG, SCP_TAG, SSH_TAG};
use crate::utils::file::create_script_complete_file;
use crate::utils::manifest::read_run_directory;
use crate::utils::system::{copy_remote_directory, copy_remote_file, exists_remote, remove_remote_file};

/// Remote operations against the sequencer host.
#[allow(async_fn_in_trait)]
pub trait SequencerHost {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Copies one remote file; false when the copy failed.
    async fn copy_file(&self, remote_path: &str, local_path: &Path) -> Result<bool>;

    async fn copy_directory(&self, remote_dir: &str, local_dir: &Path) -> Result<i32>;

    async fn remove_file(&self, path: &str) -> Result<i32>;
}

/// The sequencer host reached over ssh, scp and rsync.
pub struct SshHost {
    pub login: String,
}

impl SequencerHost for SshHost {
    async fn exists(&self, path: &str) -> Result<bool> {
        exists_remote(&self.login, path).await
    }

    async fn copy_file(&self, remote_path: &str, local_path: &Path) -> Result<bool> {
        copy_remote_file(&self.login, remote_path, local_path).await
    }

    async fn copy_directory(&self, remote_dir: &str, local_dir: &Path) -> Result<i32> {
        copy_remote_directory(&self.login, remote_dir, local_dir).await
    }

    async fn remove_file(&self, path: &str) -> Result<i32> {
        remove_remote_file(&self.login, path).await
    }
}

pub struct RemoteRun {
    pub remote_run_info: String,
    pub local_run_info: PathBuf,
    pub raw_data_dir: PathBuf,
    pub run_complete_name: String,
}

fn tool_error(tool: &str, e: anyhow::Error) -> PipelineError {
    PipelineError::ToolExecution { tool: tool.to_string(), error: e.to_string() }
}

async fn pause(poll_interval: Duration) {
    if !poll_interval.is_zero() {
        sleep(poll_interval).await;
    }
}

/// Polls until the remote manifest and the run-complete marker exist, then copies the run.
///
/// # Arguments
/// * `host` - The sequencer host.
/// * `remote` - Remote and local paths.
/// * `poll_interval` - Wait between checks.
///
/// # Returns
/// The remote run directory that was copied.
pub async fn wait_and_copy<H: SequencerHost>(
    host: &H,
    remote: &RemoteRun,
    poll_interval: Duration,
) -> Result<String, PipelineError> {
    loop {
        let manifest_present = host.exists(&remote.remote_run_info)
            .await
            .map_err(|e| tool_error(SSH_TAG, e))?;
        if !manifest_present {
            info!(
                "The file\n{}\ndoes not exist on the remote host, so will check again in {} minutes.",
                remote.remote_run_info,
                poll_interval.as_secs() / 60
            );
            pause(poll_interval).await;
            continue;
        }

        let copied = host.copy_file(&remote.remote_run_info, &remote.local_run_info)
            .await
            .map_err(|e| tool_error(SCP_TAG, e))?;
        if !copied {
            return Err(PipelineError::ToolExecution {
                tool: SCP_TAG.to_string(),
                error: format!(
                    "Error copying file\n{}\nfrom the remote host to local file\n{}",
                    remote.remote_run_info,
                    remote.local_run_info.display()
                ),
            });
        }

        let run_dir = read_run_directory(&remote.local_run_info)
            .map_err(|e| PipelineError::InvalidManifest(e.to_string()))?
            .ok_or_else(|| {
                PipelineError::InvalidManifest(
                    "Required run directory is missing (it must be the first non-blank, non-comment line)".to_string(),
                )
            })?;
        info!("Current run directory on remote server: {}", run_dir);

        let complete_path = Path::new(&run_dir).join(&remote.run_complete_name).display().to_string();
        let complete = host.exists(&complete_path)
            .await
            .map_err(|e| tool_error(SSH_TAG, e))?;
        if !complete {
            info!(
                "The file named\n{}\ndoes not exist on the remote host, so the run must not be complete - will check again in {} minutes.",
                complete_path,
                poll_interval.as_secs() / 60
            );
            pause(poll_interval).await;
            continue;
        }

        let rc = host.copy_directory(&run_dir, &remote.raw_data_dir)
            .await
            .map_err(|e| tool_error(RSYNC_TAG, e))?;
        if rc != 0 {
            error!("Error copying raw data files from remote server, return code: {}.", rc);
            return Err(PipelineError::ToolExecution {
                tool: RSYNC_TAG.to_string(),
                error: format!("exit code {}", rc),
            });
        }

        let rc = host.remove_file(&remote.remote_run_info)
            .await
            .map_err(|e| tool_error(SSH_TAG, e))?;
        if rc != 0 {
            error!("Error removing file {} from remote server, return code: {}.", remote.remote_run_info, rc);
            return Err(PipelineError::ToolExecution {
                tool: SSH_TAG.to_string(),
                error: format!("exit code {}", rc),
            });
        }
        return Ok(run_dir);
    }
}

/// Copies the run, then writes the `<step>.complete` marker into `marker_dir`.
/// No marker is written when any copy step fails.
pub async fn copy_raw_data<H: SequencerHost>(
    host: &H,
    remote: &RemoteRun,
    poll_interval: Duration,
    marker_dir: &Path,
    step: &str,
) -> Result<String, PipelineError> {
    let run_dir = wait_and_copy(host, remote, poll_interval).await?;
    info!("Copied run directory {} to {}", run_dir, remote.raw_data_dir.display());
    create_script_complete_file(marker_dir, step).map_err(|e| PipelineError::IOError(e.to_string()))?;
    Ok(run_dir)
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let settings = &config.settings;
    let args = &config.args;

    let host = SshHost { login: settings.require(args.raw_data_login.as_deref(), "RAW_DATA_LOGIN")? };
    let remote = RemoteRun {
        remote_run_info: settings.require(None, "REMOTE_RUN_INFO_FILE")?,
        local_run_info: settings.require_path(args.run_info_file.as_deref(), "RUN_INFO_FILE", false)?,
        raw_data_dir: settings.require_path(args.raw_data_directory.as_deref(), "RAW_DATA_DIR", true)?,
        run_complete_name: settings.require(args.run_complete_file.as_deref(), "REMOTE_RUN_COMPLETE_FILE")?,
    };

    copy_raw_data(&host, &remote, REMOTE_POLL_INTERVAL, &config.log_dir, &args.module).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    const REMOTE_MANIFEST: &str = "/seq/run_info.txt";
    const RUN_DIR: &str = "/seq/runs/RUN1";
    const MARKER: &str = "/seq/runs/RUN1/RTAComplete.txt";

    /// Remote files with the number of checks each stays hidden for.
    #[derive(Default)]
    struct ScriptedHost {
        hidden_for: Mutex<HashMap<String, usize>>,
        files: HashMap<String, String>,
        copy_file_ok: bool,
        rsync_rc: i32,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedHost {
        fn new(manifest_hidden: usize, marker_hidden: usize) -> Self {
            ScriptedHost {
                hidden_for: Mutex::new(HashMap::from([
                    (REMOTE_MANIFEST.to_string(), manifest_hidden),
                    (MARKER.to_string(), marker_hidden),
                ])),
                files: HashMap::from([
                    (REMOTE_MANIFEST.to_string(), format!("{}\n199;10674;ATCACG;wf1.xml\n", RUN_DIR)),
                    (MARKER.to_string(), String::new()),
                ]),
                copy_file_ok: true,
                rsync_rc: 0,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SequencerHost for ScriptedHost {
        async fn exists(&self, path: &str) -> Result<bool> {
            self.record(format!("exists {}", path));
            let mut hidden = self.hidden_for.lock().unwrap();
            match hidden.get_mut(path) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Ok(false)
                }
                _ => Ok(self.files.contains_key(path)),
            }
        }

        async fn copy_file(&self, remote_path: &str, local_path: &Path) -> Result<bool> {
            self.record(format!("scp {}", remote_path));
            if !self.copy_file_ok {
                return Ok(false);
            }
            fs::write(local_path, &self.files[remote_path])?;
            Ok(true)
        }

        async fn copy_directory(&self, remote_dir: &str, _local_dir: &Path) -> Result<i32> {
            self.record(format!("rsync {}", remote_dir));
            Ok(self.rsync_rc)
        }

        async fn remove_file(&self, path: &str) -> Result<i32> {
            self.record(format!("rm {}", path));
            Ok(0)
        }
    }

    fn remote(tmp: &TempDir) -> RemoteRun {
        RemoteRun {
            remote_run_info: REMOTE_MANIFEST.to_string(),
            local_run_info: tmp.path().join("run_info.txt"),
            raw_data_dir: tmp.path().join("raw"),
            run_complete_name: "RTAComplete.txt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_copies_once_marker_appears() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let host = ScriptedHost::new(2, 3);
        let logs = tmp.path().join("logs");

        let run_dir = copy_raw_data(&host, &remote(&tmp), Duration::ZERO, &logs, "copy_raw_data").await?;

        assert_eq!(run_dir, RUN_DIR);
        let calls = host.calls();
        let marker_checks = calls.iter().filter(|c| *c == &format!("exists {}", MARKER)).count();
        assert_eq!(marker_checks, 4);
        assert_eq!(
            calls[calls.len() - 2..].to_vec(),
            vec![format!("rsync {}", RUN_DIR), format!("rm {}", REMOTE_MANIFEST)]
        );
        assert_eq!(fs::read_to_string(tmp.path().join("run_info.txt"))?.lines().next(), Some(RUN_DIR));
        assert!(logs.join("copy_raw_data.complete").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_rsync_leaves_no_marker() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut host = ScriptedHost::new(0, 0);
        host.rsync_rc = 23;
        let logs = tmp.path().join("logs");

        let result = copy_raw_data(&host, &remote(&tmp), Duration::ZERO, &logs, "copy_raw_data").await;

        assert!(matches!(result, Err(PipelineError::ToolExecution { ref tool, .. }) if tool == RSYNC_TAG));
        assert!(!host.calls().iter().any(|c| c.starts_with("rm ")));
        assert!(!logs.join("copy_raw_data.complete").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_manifest_copy_stops_polling() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut host = ScriptedHost::new(0, 0);
        host.copy_file_ok = false;
        let logs = tmp.path().join("logs");

        let result = copy_raw_data(&host, &remote(&tmp), Duration::ZERO, &logs, "copy_raw_data").await;

        assert!(matches!(result, Err(PipelineError::ToolExecution { ref tool, .. }) if tool == SCP_TAG));
        assert_eq!(host.calls(), vec![format!("exists {}", REMOTE_MANIFEST), format!("scp {}", REMOTE_MANIFEST)]);
        assert!(!logs.join("copy_raw_data.complete").exists());
        Ok(())
    }
}
