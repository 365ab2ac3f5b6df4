//! Starts one workbench workflow per workflow config of every manifest entry.
//!
//! Each invocation gets its own history holding the blacklist filter dataset
//! and the sample's datasets. Entry-level errors are logged and prevent the
//! manifest from being archived; they never stop the remaining entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::time::sleep;

use crate::config::defs::{PipelineError, RunConfig, INVOCATION_SETTLE_DELAY, SETTLE_DELAY};
use crate::config::settings::WorkflowNames;
use crate::pipelines::{galaxy_client, load_manifest, mark_complete};
use crate::utils::file::archive_file;
use crate::utils::galaxy::{HistoryDataset, Workbench};
use crate::utils::library::{blacklist_dataset_id, find_folder, find_library, sample_datasets, LibraryDataset};
use crate::utils::manifest::{Manifest, ManifestEntry};
use crate::utils::workflow::{
    bind_inputs, history_name, merge_parameters, parameter_patches, read_workflow_config, select_workflow,
    workflow_config_paths,
};

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub workflow_names: WorkflowNames,
    pub blacklist_library_name: String,
    pub workflow_config_dir: PathBuf,
    pub history_name_id: String,
    pub no_invocation_dbkeys: Vec<String>,
    /// Chromosome length files keyed by lower-cased dbkey.
    pub len_files: HashMap<String, String>,
    pub settle_delay: Duration,
    pub invocation_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOutcome {
    Invoked { history_name: String },
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Skipped(String),
    Processed(Vec<ConfigOutcome>),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    pub outcomes: Vec<(usize, EntryOutcome)>,
    pub failed_entries: Vec<usize>,
    pub last_run: Option<String>,
}

impl OrchestrationReport {
    pub fn can_archive(&self) -> bool {
        self.failed_entries.is_empty()
    }

    pub fn invocations(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                EntryOutcome::Processed(configs) => Some(configs),
                EntryOutcome::Skipped(_) => None,
            })
            .flatten()
            .filter(|c| matches!(c, ConfigOutcome::Invoked { .. }))
            .count()
    }
}

/// What every workflow config of one entry shares.
struct EntryContext<'e> {
    entry: &'e ManifestEntry,
    workflow_name: String,
    datasets: Vec<LibraryDataset>,
    blacklist_library_id: Option<String>,
}

pub struct WorkflowOrchestrator<'a, W: Workbench> {
    workbench: &'a W,
    options: &'a OrchestratorOptions,
}

impl<'a, W: Workbench> WorkflowOrchestrator<'a, W> {
    pub fn new(workbench: &'a W, options: &'a OrchestratorOptions) -> Self {
        WorkflowOrchestrator { workbench, options }
    }

    async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            info!("Sleeping for {} seconds...", delay.as_secs());
            sleep(delay).await;
        }
    }

    pub async fn run(&self, manifest: &Manifest) -> OrchestrationReport {
        let mut report = OrchestrationReport::default();
        for entry in &manifest.entries {
            report.last_run = Some(entry.run.clone());
            match self.process_entry(entry).await {
                Ok(outcome) => {
                    if let EntryOutcome::Skipped(reason) = &outcome {
                        warn!("Skipping line {}: {}", entry.line, reason);
                    }
                    report.outcomes.push((entry.line, outcome));
                }
                Err(e) => {
                    error!("Error encountered while starting workflows for line {}:\n{}", entry.line, e);
                    report.failed_entries.push(entry.line);
                }
            }
        }
        report
    }

    pub async fn process_entry(&self, entry: &ManifestEntry) -> Result<EntryOutcome> {
        let Some(library_id) = find_library(self.workbench, &entry.run).await? else {
            return Ok(EntryOutcome::Skipped(format!(
                "it contains run {} but no data library with that name exists",
                entry.run
            )));
        };
        let Some(folder_id) = find_folder(self.workbench, &library_id, &entry.sample).await? else {
            return Ok(EntryOutcome::Skipped(format!(
                "it contains sample {} but no folder with that name exists",
                entry.sample
            )));
        };

        let num_datasets = self.workbench.folder_item_count(&folder_id).await?;
        let Some(workflow_name) = select_workflow(&self.options.workflow_names, num_datasets) else {
            return Ok(EntryOutcome::Skipped(format!(
                "the data library folder for sample {} contains {} datasets when it should contain only 1 or 2",
                entry.sample, num_datasets
            )));
        };
        info!("Selected workflow named {} for sample {} of run {}", workflow_name, entry.sample, entry.run);

        let context = EntryContext {
            entry,
            workflow_name: workflow_name.to_string(),
            datasets: sample_datasets(self.workbench, &library_id, &entry.sample).await?,
            blacklist_library_id: find_library(self.workbench, &self.options.blacklist_library_name).await?,
        };

        let mut outcomes = Vec::new();
        for path in workflow_config_paths(&self.options.workflow_config_dir, &entry.workflow_config_refs) {
            let outcome = self.process_config(&context, &path).await?;
            if let ConfigOutcome::Skipped(reason) = &outcome {
                warn!("Skipping workflow config {} of line {}: {}", path.display(), entry.line, reason);
            }
            outcomes.push(outcome);
        }
        Ok(EntryOutcome::Processed(outcomes))
    }

    async fn process_config(&self, context: &EntryContext<'_>, path: &Path) -> Result<ConfigOutcome> {
        let entry = context.entry;
        let config = match read_workflow_config(path) {
            Ok(Some(config)) => config,
            Ok(None) => return Ok(ConfigOutcome::Skipped("the workflow config file is missing".to_string())),
            Err(e) => return Ok(ConfigOutcome::Skipped(format!("the workflow config is invalid: {}", e))),
        };
        let dbkey = config.dbkey.as_str();

        if self.options.no_invocation_dbkeys.iter().any(|k| k == dbkey) {
            return Ok(ConfigOutcome::Skipped(format!(
                "workflows are not to be executed for dbkey {}",
                dbkey
            )));
        }

        info!("Preparing analysis pipeline for workflow config file {}.", path.display());
        let blacklist_id = match &context.blacklist_library_id {
            Some(library_id) => blacklist_dataset_id(self.workbench, library_id, dbkey).await?,
            None => None,
        };
        let Some(blacklist_id) = blacklist_id else {
            return Ok(ConfigOutcome::Skipped(format!(
                "no blacklist filter dataset for dbkey {} exists but one is required",
                dbkey
            )));
        };

        let found = self.workbench.workflows_named(&context.workflow_name).await?;
        let Some(summary) = found.first() else {
            return Ok(ConfigOutcome::Skipped(format!("no workflow named {} exists", context.workflow_name)));
        };
        let workflow = self.workbench.workflow(&summary.id).await?;
        info!("Found workflow named {}.", context.workflow_name);

        let patches = parameter_patches(dbkey, &workflow, &config.parameters, &self.options.len_files);
        let parameters = merge_parameters(&config.parameters, patches);
        self.settle(self.options.settle_delay).await;

        let name = history_name(&context.workflow_name, &entry.run, &entry.sample, &self.options.history_name_id);
        let history = self.workbench.create_history(&name).await?;
        info!(
            "Created a new history named {} for dbkey {} to contain the analysis for sample {} of run {}.",
            name, dbkey, entry.sample, entry.run
        );
        self.settle(self.options.settle_delay).await;

        let mut imported: Vec<HistoryDataset> = Vec::new();
        imported.push(self.workbench.import_library_dataset(&history.id, &blacklist_id).await?);
        self.settle(self.options.settle_delay).await;
        for dataset in &context.datasets {
            info!("Importing dataset {} for dbkey {} into history {}.", dataset.name, dbkey, name);
            imported.push(self.workbench.import_library_dataset(&history.id, &dataset.id).await?);
            self.settle(self.options.settle_delay).await;
        }

        let inputs = bind_inputs(&workflow, &imported, dbkey);
        info!("inputs:\n{:?}", inputs);
        self.settle(self.options.settle_delay).await;

        info!("Executing workflow {}.\nparams:\n{:?}", context.workflow_name, parameters);
        let response = self
            .workbench
            .invoke_workflow(&workflow.id, &inputs, &parameters, &history.id)
            .await?;
        info!("Response from executing workflow {}:\n{}", context.workflow_name, response);
        self.settle(self.options.invocation_delay).await;

        Ok(ConfigOutcome::Invoked { history_name: name })
    }
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let settings = &config.settings;
    let args = &config.args;

    let (manifest_path, manifest) = load_manifest(&config)?;
    let raw_run_dir = settings
        .require_path(args.raw_data_directory.as_deref(), "RAW_DATA_DIR", false)?
        .join(manifest.run_folder());
    let config_dir_name = settings.require(
        args.remote_workflow_config_dir_name.as_deref(),
        "REMOTE_WORKFLOW_CONFIG_DIR_NAME",
    )?;

    let options = OrchestratorOptions {
        workflow_names: settings.workflow_names()?,
        blacklist_library_name: settings.require(
            args.blacklist_filter_library_name.as_deref(),
            "BLACKLIST_FILTER_LIBRARY_NAME",
        )?,
        workflow_config_dir: raw_run_dir.join(config_dir_name),
        history_name_id: args.history_name_id.clone(),
        no_invocation_dbkeys: settings.no_invocation_dbkeys(),
        len_files: settings.len_files(),
        settle_delay: SETTLE_DELAY,
        invocation_delay: INVOCATION_SETTLE_DELAY,
    };
    let workbench = galaxy_client(&config)?;

    let report = WorkflowOrchestrator::new(&workbench, &options).run(&manifest).await;
    info!(
        "Invoked {} workflows; {} manifest lines failed",
        report.invocations(),
        report.failed_entries.len()
    );

    if report.can_archive() {
        if let Some(run) = &report.last_run {
            archive_file(&manifest_path, run).map_err(|e| PipelineError::IOError(e.to_string()))?;
        }
    }
    mark_complete(&config)
}
