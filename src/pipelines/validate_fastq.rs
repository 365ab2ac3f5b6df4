use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Result;
use log::info;
use crate::config::defs::{PipelineError, RunConfig, FASTQ_GZ_EXT, FASTQ_VALIDATOR_TAG};
use crate::utils::command::generate_cli;
use crate::utils::file::find_fastq_files;
use crate::utils::system::execute_cmd;

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidFastq {
    pub path: PathBuf,
    pub exit_code: i32,
}

/// Runs the validator on each file and returns those it rejected.
///
/// # Arguments
/// * `binary` - fastQValidator executable.
/// * `files` - Compressed FASTQ files to check.
pub async fn invalid_fastq_files(binary: &str, files: &[PathBuf]) -> Result<Vec<InvalidFastq>> {
    let mut invalid = Vec::new();
    for path in files {
        let cmd = generate_cli(FASTQ_VALIDATOR_TAG, Some(binary), path)?;
        let exit_code = execute_cmd(&cmd).await?;
        if exit_code != 0 {
            invalid.push(InvalidFastq { path: path.clone(), exit_code });
        }
    }
    Ok(invalid)
}

fn no_files_message(prep_dir: &Path, run: &str) -> String {
    format!(
        "There are no fastq files in directory\n{}\nmatching string {}*{}",
        prep_dir.display(),
        run,
        FASTQ_GZ_EXT
    )
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let settings = &config.settings;
    let args = &config.args;

    let prep_dir = settings.require_path(args.prep_directory.as_deref(), "LIBRARY_PREP_DIR", false)?;
    let run = args
        .run
        .clone()
        .ok_or_else(|| PipelineError::MissingConfig("run (--run)".to_string()))?;
    let binary = settings
        .resolve(args.fastq_validator_binary.as_deref(), "FASTQ_VALIDATOR_BINARY")
        .unwrap_or_else(|| FASTQ_VALIDATOR_TAG.to_string());

    let files = find_fastq_files(&prep_dir, &run).map_err(|e| PipelineError::IOError(e.to_string()))?;
    if files.is_empty() {
        let message = no_files_message(&prep_dir, &run);
        println!("\n{}\n", message);
        return Err(PipelineError::InvalidConfig(message));
    }
    info!("Validating {} fastq files for run {}", files.len(), run);

    let invalid = invalid_fastq_files(&binary, &files)
        .await
        .map_err(|e| PipelineError::ToolExecution { tool: FASTQ_VALIDATOR_TAG.to_string(), error: e.to_string() })?;
    if invalid.is_empty() {
        println!("All files are valid!");
        return Ok(());
    }
    for file in &invalid {
        println!("This file is invalid, response code is {}:\n{}\n", file.exit_code, file.path.display());
    }
    Err(PipelineError::ToolExecution {
        tool: FASTQ_VALIDATOR_TAG.to_string(),
        error: format!("{} of {} files are invalid", invalid.len(), files.len()),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_all_files_valid() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let fastq = tmp.path().join("199-10674_S1_R1_001.fastq.gz");
        std::fs::write(&fastq, b"")?;
        let invalid = invalid_fastq_files("true", &[fastq]).await?;
        assert!(invalid.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_files_are_reported() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let fastq = tmp.path().join("199-10674_S1_R1_001.fastq.gz");
        std::fs::write(&fastq, b"")?;
        let invalid = invalid_fastq_files("false", &[fastq.clone()]).await?;
        assert_eq!(invalid, vec![InvalidFastq { path: fastq, exit_code: 1 }]);
        Ok(())
    }

    #[test]
    fn test_no_files_message() {
        let message = no_files_message(Path::new("/prep/RUN1"), "199");
        assert!(message.ends_with("matching string 199*.fastq.gz"));
    }
}
