use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::{error, info, warn, LevelFilter};

use seqrun_pipelines::cli::parse;
use seqrun_pipelines::config::defs::{PipelineError, RunConfig, DEFAULT_CONFIG_FILE};
use seqrun_pipelines::config::settings::Settings;
use seqrun_pipelines::pipelines::{
    bcl2fastq, copy_raw_data, output_stats, send_data, split_motifs, start_workflows, validate_fastq,
    validate_run_info,
};
use seqrun_pipelines::utils::logging::{init_stderr_logger, log_file_path, RunLog};

/// Steps whose output is read by a person or a workbench tool; they log to stderr.
const STDERR_STEPS: [&str; 4] = ["validate_run_info", "validate_fastq", "output_stats", "split_motifs"];


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();
    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let cwd = env::current_dir()?;
    let (settings, fallback_notice) = load_settings(args.config.as_deref(), &cwd)?;
    let log_dir = settings
        .resolve_path(None, "ANALYSIS_PREP_LOG_FILE_DIR", true)?
        .unwrap_or_else(|| cwd.clone());

    let module = args.module.clone();
    let run_log = if STDERR_STEPS.contains(&module.as_str()) {
        init_stderr_logger(log_level)?;
        None
    } else {
        let explicit = args
            .log_file
            .clone()
            .or_else(|| settings.resolve(None, "ANALYSIS_PREP_LOG_FILE"));
        let path = log_file_path(&log_dir, explicit.as_deref());
        Some(RunLog::open(&path, &module, log_level)?)
    };

    if let Some(notice) = fallback_notice {
        warn!("{}", notice);
    }
    info!("The current directory is {:?}", cwd);
    if let Some(source) = settings.source() {
        info!("Using settings from {}", source.display());
    }

    let run_config = Arc::new(RunConfig { cwd, args, settings, log_dir });

    let result = match module.as_str() {
        "copy_raw_data" => copy_raw_data::run(run_config).await,
        "bcl2fastq" => bcl2fastq::run(run_config).await,
        "send_data" => send_data::run(run_config).await,
        "start_workflows" => start_workflows::run(run_config).await,
        "validate_run_info" => validate_run_info::run(run_config).await,
        "validate_fastq" => validate_fastq::run(run_config).await,
        "output_stats" => output_stats::run(run_config).await,
        "split_motifs" => split_motifs::run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    };

    if let Err(e) = result {
        error!("Step {} failed: {} at {} milliseconds.", module, e, run_start.elapsed().as_millis());
        if let Some(log) = run_log {
            log.close()?;
        }
        std::process::exit(1);
    }

    info!("Step {} complete: {} milliseconds.", module, run_start.elapsed().as_millis());
    if let Some(log) = run_log {
        log.close()?;
    }
    Ok(())
}


/// Loads the settings file.
///
/// A file named with `--config` must exist. Without one the default location is
/// tried, and a missing default leaves every setting to the command line.
///
/// # Returns
/// The settings and, when the default file was missing, a notice to log once logging is up.
fn load_settings(explicit: Option<&str>, cwd: &Path) -> Result<(Settings, Option<String>)> {
    if let Some(path) = explicit {
        let path = PathBuf::from(path);
        if !path.is_file() {
            return Err(anyhow!("Config file {} does not exist", path.display()));
        }
        return Ok((Settings::load(&path)?, None));
    }

    let default = cwd.join(DEFAULT_CONFIG_FILE);
    if default.is_file() {
        return Ok((Settings::load(&default)?, None));
    }
    Ok((
        Settings::default(),
        Some(format!(
            "No config file at {}; settings must come from the command line",
            default.display()
        )),
    ))
}
