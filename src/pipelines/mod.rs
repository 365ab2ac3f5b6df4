pub mod bcl2fastq;
pub mod copy_raw_data;
pub mod output_stats;
pub mod send_data;
pub mod split_motifs;
pub mod start_workflows;
pub mod validate_fastq;
pub mod validate_run_info;

use std::path::PathBuf;
use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::file::create_script_complete_file;
use crate::utils::galaxy::GalaxyClient;
use crate::utils::manifest::Manifest;

/// Resolves and parses the run manifest.
pub(crate) fn load_manifest(config: &RunConfig) -> Result<(PathBuf, Manifest), PipelineError> {
    let path = config
        .settings
        .require_path(config.args.run_info_file.as_deref(), "RUN_INFO_FILE", false)?;
    let manifest = Manifest::from_path(&path).map_err(|e| PipelineError::InvalidManifest(e.to_string()))?;
    Ok((path, manifest))
}

pub(crate) fn galaxy_client(config: &RunConfig) -> Result<GalaxyClient, PipelineError> {
    let base_url = config.settings.require(config.args.galaxy_base_url.as_deref(), "GALAXY_BASE_URL")?;
    let api_key = config.settings.require(config.args.api_key.as_deref(), "API_KEY")?;
    Ok(GalaxyClient::new(&base_url, &api_key))
}

/// Writes `<log_dir>/<module>.complete`.
pub(crate) fn mark_complete(config: &RunConfig) -> Result<(), PipelineError> {
    create_script_complete_file(&config.log_dir, &config.args.module)
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    Ok(())
}
