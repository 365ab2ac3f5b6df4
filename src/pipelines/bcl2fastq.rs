use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{error, info};
use crate::config::defs::{PipelineError, RunConfig, BCL2FASTQ_TAG, CP_TAG};
use crate::pipelines::{load_manifest, mark_complete};
use crate::utils::command::{bcl2fastq::Bcl2FastqConfig, bcl2fastq_command};
use crate::utils::file::archive_file;
use crate::utils::manifest::Manifest;
use crate::utils::sample_sheet::{run_from_sample_sheet, write_sample_sheet};
use crate::utils::system::{copy_local_directory, execute_cmd};


/// Writes the sample sheet and reads the run back from its first data row.
pub fn prepare_sample_sheet(manifest: &Manifest, sample_sheet: &Path) -> Result<String, PipelineError> {
    if let Some(parent) = sample_sheet.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_sample_sheet(manifest, sample_sheet).map_err(|e| PipelineError::IOError(e.to_string()))?;
    run_from_sample_sheet(sample_sheet)
        .map_err(|e| PipelineError::IOError(e.to_string()))?
        .ok_or_else(|| PipelineError::InvalidManifest("the manifest has no valid sample lines".to_string()))
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let settings = &config.settings;
    let args = &config.args;

    let (_, manifest) = load_manifest(&config)?;
    let run_folder = manifest.run_folder();

    let binary = settings
        .resolve(args.bcl2fastq_binary.as_deref(), "BCL2FASTQ_BINARY")
        .unwrap_or_else(|| BCL2FASTQ_TAG.to_string());
    let report_dir = settings.require_path(args.bcl2fastq_report_dir.as_deref(), "BCL2FASTQ_REPORT_DIR", true)?;
    let prep_dir: PathBuf = settings
        .require_path(args.prep_directory.as_deref(), "LIBRARY_PREP_DIR", false)?
        .join(&run_folder);
    let raw_run_dir: PathBuf = settings
        .require_path(args.raw_data_directory.as_deref(), "RAW_DATA_DIR", false)?
        .join(&run_folder);
    let sample_sheet = settings.require_path(args.sample_sheet.as_deref(), "SAMPLE_SHEET", false)?;

    let run = prepare_sample_sheet(&manifest, &sample_sheet)?;
    info!("Demultiplexing run {} from {}", run, raw_run_dir.display());

    let bcl_config = Bcl2FastqConfig {
        raw_run_dir: &raw_run_dir,
        prep_dir: &prep_dir,
        sample_sheet: &sample_sheet,
        threads: args.threads,
    };
    let mut rc = execute_cmd(&bcl2fastq_command(&binary, &bcl_config))
        .await
        .map_err(|e| PipelineError::ToolExecution { tool: BCL2FASTQ_TAG.to_string(), error: e.to_string() })?;

    let mut failed_tool = BCL2FASTQ_TAG;
    if rc == 0 {
        let html = prep_dir.join("Reports").join("html");
        rc = copy_local_directory(&html, &report_dir.join(&run))
            .await
            .map_err(|e| PipelineError::ToolExecution { tool: CP_TAG.to_string(), error: e.to_string() })?;
        failed_tool = CP_TAG;
    }

    archive_file(&sample_sheet, &run).map_err(|e| PipelineError::IOError(e.to_string()))?;

    if rc != 0 {
        error!("{} returned exit code {}", failed_tool, rc);
        return Err(PipelineError::ToolExecution {
            tool: failed_tool.to_string(),
            error: format!("exit code {}", rc),
        });
    }
    mark_complete(&config)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_prepare_sample_sheet_reads_run() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let manifest = Manifest::parse("/seq/runs/RUN1\n199;10674;ATCACG;wf1.xml\n")?;
        let sheet = tmp.path().join("sheets").join("SampleSheet.csv");
        assert_eq!(prepare_sample_sheet(&manifest, &sheet)?, "199");
        assert!(sheet.is_file());
        Ok(())
    }

    #[test]
    fn test_prepare_sample_sheet_without_entries_fails() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let manifest = Manifest::parse("/seq/runs/RUN1\n199;10674\n")?;
        let sheet = tmp.path().join("SampleSheet.csv");
        assert!(matches!(prepare_sample_sheet(&manifest, &sheet), Err(PipelineError::InvalidManifest(_))));
        Ok(())
    }
}
