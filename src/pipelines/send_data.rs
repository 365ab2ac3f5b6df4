/// Uploads demultiplexed FASTQ files into one workbench data library per run.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use log::{error, info};
use tokio::time::sleep;
use crate::config::defs::{PipelineError, RunConfig, UPLOAD_SETTLE_DELAY};
use crate::pipelines::{galaxy_client, load_manifest, mark_complete};
use crate::utils::file::find_fastq_files;
use crate::utils::galaxy::Workbench;
use crate::utils::library::{ensure_folder, ensure_library, upload, upload_datatype};
use crate::utils::manifest::{Manifest, ManifestEntry};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PopulateReport {
    pub uploaded: usize,
    pub failed_entries: Vec<usize>,
}

async fn populate_entry<W: Workbench>(workbench: &W, entry: &ManifestEntry, prep_dir: &Path) -> Result<usize> {
    let library_id = ensure_library(
        workbench,
        &entry.run,
        entry.library_description.as_deref(),
        entry.library_synonym.as_deref(),
    )
    .await?;
    let folder_id = ensure_folder(workbench, &library_id, &entry.sample).await?;

    let files = find_fastq_files(prep_dir, &format!("{}-{}", entry.run, entry.sample))?;
    if files.is_empty() {
        info!("No FASTQ files for sample {} of run {} in {}", entry.sample, entry.run, prep_dir.display());
    }
    let datatype = upload_datatype(entry);
    for path in &files {
        let response = upload(workbench, &library_id, &folder_id, path, datatype).await?;
        info!("Response from uploading dataset:\n{}", response);
    }
    Ok(files.len())
}

/// Creates libraries and folders as needed and uploads every entry's files.
/// A failing entry is logged and the rest continue.
pub async fn populate_libraries<W: Workbench>(workbench: &W, manifest: &Manifest, prep_dir: &Path) -> PopulateReport {
    let mut report = PopulateReport::default();
    for entry in &manifest.entries {
        match populate_entry(workbench, entry, prep_dir).await {
            Ok(n) => report.uploaded += n,
            Err(e) => {
                error!("Error importing datasets for line {}: {}", entry.line, e);
                report.failed_entries.push(entry.line);
            }
        }
    }
    report
}

/// Waits for the workbench to finish importing, if anything was uploaded.
pub async fn settle_uploads(report: &PopulateReport, delay: Duration) {
    if report.uploaded > 0 {
        info!(
            "Sleeping for {} minutes to make sure the data library upload jobs are finished...",
            delay.as_secs() / 60
        );
        sleep(delay).await;
        info!("Awake now...");
    }
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let (_, manifest) = load_manifest(&config)?;
    info!("Directory containing bcl files for run being processed:\n{}", manifest.run_directory);

    let prep_dir = config
        .settings
        .require_path(config.args.prep_directory.as_deref(), "LIBRARY_PREP_DIR", false)?
        .join(manifest.run_folder());
    let workbench = galaxy_client(&config)?;

    let report = populate_libraries(&workbench, &manifest, &prep_dir).await;
    info!(
        "Uploaded {} datasets; {} manifest lines failed",
        report.uploaded,
        report.failed_entries.len()
    );
    settle_uploads(&report, UPLOAD_SETTLE_DELAY).await;
    mark_complete(&config)
}
