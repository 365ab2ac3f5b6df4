/// Per-day run log with opening and closing banners.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;
use crate::config::defs::LOG_FILE_SUFFIX;
use crate::utils::file::gmt_timestamp;

const BANNER_WIDTH: usize = 79;

/// `<log_dir>/<YYYY-MM-DD>_analysis_prep.log`, unless a file was named explicitly.
pub fn log_file_path(log_dir: &Path, explicit: Option<&str>) -> PathBuf {
    match explicit {
        Some(path) => PathBuf::from(path),
        None => log_dir.join(format!("{}_{}", chrono::Local::now().format("%Y-%m-%d"), LOG_FILE_SUFFIX)),
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow!("Failed to open log file {}: {}", path.display(), e))
}

pub fn opening_banner(step: &str) -> String {
    let rule = "#".repeat(BANNER_WIDTH);
    format!("{}\nProcessing script: {}\nStarted at: {}\n{}\n", rule, step, gmt_timestamp(), rule)
}

pub fn closing_banner(step: &str) -> String {
    let rule = "#".repeat(BANNER_WIDTH);
    format!("{}\nScript {} completed.\nFinished at: {}\n{}\n", rule, step, gmt_timestamp(), rule)
}

fn builder(log_level: LevelFilter) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(log_level).format(|buf, record| {
        writeln!(
            buf,
            "[{}] {}: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    builder
}

/// Logger for the validation and reporting steps, which write to stderr.
pub fn init_stderr_logger(log_level: LevelFilter) -> Result<()> {
    builder(log_level)
        .target(Target::Stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialise logger: {}", e))
}

/// The shared per-day log of one pipeline step.
pub struct RunLog {
    path: PathBuf,
    step: String,
}

impl RunLog {
    /// Appends the opening banner and routes the global logger to the file.
    pub fn open(path: &Path, step: &str, log_level: LevelFilter) -> Result<Self> {
        let mut file = open_append(path)?;
        file.write_all(opening_banner(step).as_bytes())?;

        builder(log_level)
            .target(Target::Pipe(Box::new(open_append(path)?)))
            .try_init()
            .map_err(|e| anyhow!("Failed to initialise logger: {}", e))?;

        Ok(RunLog { path: path.to_path_buf(), step: step.to_string() })
    }

    pub fn close(self) -> Result<()> {
        log::logger().flush();
        let mut file = open_append(&self.path)?;
        file.write_all(closing_banner(&self.step).as_bytes())?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_file_path_default_and_explicit() {
        let dir = PathBuf::from("/var/log/seqrun");
        let default = log_file_path(&dir, None);
        let name = default.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        assert!(name.ends_with("_analysis_prep.log"));
        assert_eq!(name.len(), "2016-06-30_analysis_prep.log".len());
        assert_eq!(log_file_path(&dir, Some("/tmp/x.log")), PathBuf::from("/tmp/x.log"));
    }

    #[test]
    fn test_banners() {
        let open = opening_banner("send_data");
        let lines: Vec<&str> = open.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].len(), 79);
        assert_eq!(lines[1], "Processing script: send_data");
        assert!(lines[2].starts_with("Started at: "));

        let close = closing_banner("send_data");
        assert!(close.contains("Script send_data completed."));
        assert!(close.contains("Finished at: "));
    }

    #[test]
    fn test_open_append_creates_parents() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("logs").join("a.log");
        open_append(&path)?.write_all(b"one\n")?;
        open_append(&path)?.write_all(b"two\n")?;
        assert_eq!(std::fs::read_to_string(path)?, "one\ntwo\n");
        Ok(())
    }
}
