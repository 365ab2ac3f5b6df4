//! Workflow config files, workflow selection, input binding and parameter patches.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::config::defs::{BLACKLIST_LABEL, GENOME_SPECIES, UNKNOWN_DBKEY};
use crate::config::settings::WorkflowNames;
use crate::utils::galaxy::{HistoryDataset, InputBinding, WorkflowDetails};

/// step id -> parameter name -> value
pub type StepParameters = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub dbkey: String,
    pub parameters: StepParameters,
}

#[derive(Debug, Deserialize)]
struct WorkflowConfigXml {
    #[serde(default)]
    dbkey: Option<String>,
    #[serde(default)]
    parameters: Option<ParametersXml>,
}

#[derive(Debug, Deserialize)]
struct ParametersXml {
    #[serde(rename = "step", default)]
    steps: Vec<StepXml>,
}

#[derive(Debug, Deserialize)]
struct StepXml {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "param", default)]
    params: Vec<ParamXml>,
}

#[derive(Debug, Deserialize)]
struct ParamXml {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Parses a workflow config document.
///
/// Steps without an id and params without both a name and a value are
/// dropped with a warning. A missing `<dbkey>` makes the whole config invalid.
pub fn parse_workflow_config(xml: &str) -> Result<WorkflowConfig> {
    let doc: WorkflowConfigXml = serde_xml_rs::from_str(xml)
        .map_err(|e| anyhow!("Invalid workflow config XML: {}", e))?;

    let dbkey = doc
        .dbkey
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| anyhow!("Workflow config is missing a dbkey"))?;

    let mut parameters = StepParameters::new();
    for step in doc.parameters.map(|p| p.steps).unwrap_or_default() {
        let Some(step_id) = step.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) else {
            warn!("Skipping step element because it is missing a required id attribute.");
            continue;
        };
        for param in step.params {
            match (param.name, param.value) {
                (Some(name), Some(value)) => {
                    parameters
                        .entry(step_id.clone())
                        .or_default()
                        .insert(name.trim().to_string(), value.trim().to_string());
                }
                _ => warn!("Skipping param of step {} because it is missing a name or value.", step_id),
            }
        }
    }

    Ok(WorkflowConfig { dbkey, parameters })
}

/// Reads a workflow config file; `None` when the file does not exist.
pub fn read_workflow_config(path: &Path) -> Result<Option<WorkflowConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    info!("Parsing workflow config: {}", path.display());
    let text = fs::read_to_string(path)?;
    parse_workflow_config(&text)
        .map(Some)
        .map_err(|e| anyhow!("{}: {}", path.display(), e))
}

pub fn workflow_config_paths(dir: &Path, refs: &[String]) -> Vec<PathBuf> {
    refs.iter().map(|r| dir.join(r)).collect()
}

/// Single-end samples have one dataset in their folder, paired-end samples two.
pub fn select_workflow(names: &WorkflowNames, num_datasets: usize) -> Option<&str> {
    match num_datasets {
        1 => Some(names.single.as_str()),
        2 => Some(names.paired.as_str()),
        _ => None,
    }
}

pub fn history_name(workflow: &str, run: &str, sample: &str, suffix: &str) -> String {
    format!("{}-{}-{}.{}", workflow, run, sample, suffix)
}

/// Binds history datasets to workflow input slots.
///
/// A dataset fits a slot when the slot label occurs in the dataset name, or
/// when the label is `blacklist` and the dbkey occurs in the name. The first
/// fitting dataset (in import order) wins; slots with no fit stay unbound.
pub fn bind_inputs(
    workflow: &WorkflowDetails,
    datasets: &[HistoryDataset],
    dbkey: &str,
) -> BTreeMap<String, InputBinding> {
    let mut bound = BTreeMap::new();
    for (index, input) in &workflow.inputs {
        let Some(label) = input.label.as_deref() else {
            continue;
        };
        let found = datasets.iter().find(|ds| {
            ds.name.contains(label) || (label == BLACKLIST_LABEL && ds.name.contains(dbkey))
        });
        match found {
            Some(ds) => {
                info!("Mapped dataset {} from history to workflow input dataset with label {}.", ds.name, label);
                bound.insert(index.clone(), InputBinding::history_dataset(&ds.id));
            }
            None => warn!("No history dataset matches workflow input {} with label {}.", index, label),
        }
    }
    bound
}

/// Tool-specific parameter patches for steps the workflow config leaves alone.
///
/// # Arguments
/// * `dbkey` - Genome key of the config.
/// * `workflow` - Full workflow definition.
/// * `configured` - Parameters from the workflow config; their steps are skipped.
/// * `len_files` - Chromosome length files keyed by lower-cased dbkey.
pub fn parameter_patches(
    dbkey: &str,
    workflow: &WorkflowDetails,
    configured: &StepParameters,
    len_files: &HashMap<String, String>,
) -> StepParameters {
    let mut patches = StepParameters::new();
    for (step_id, step) in &workflow.steps {
        if configured.contains_key(step_id) {
            info!("Step {} is set by the workflow config, so skipping it here.", step_id);
            continue;
        }
        let Some(tool_id) = step.tool_id.as_deref() else {
            continue;
        };

        if step.tool_inputs.contains_key("chromInfo") {
            match len_files.get(&dbkey.to_lowercase()) {
                Some(len_file) => {
                    patches.entry(step_id.clone()).or_default().insert("chromInfo".to_string(), len_file.clone());
                }
                None => warn!("Cannot update chromInfo for dbkey {} in step {}: no len file for that dbkey.", dbkey, step_id),
            }
        }

        if tool_id.contains("bwa_mem") {
            let selector = step
                .tool_input_object("reference_source")
                .and_then(|m| m.get("reference_source_selector").and_then(|v| v.as_str()).map(str::to_string));
            if selector.as_deref() == Some("cached") {
                patches
                    .entry(step_id.clone())
                    .or_default()
                    .insert("reference_source|ref_file".to_string(), dbkey.to_string());
            }
        } else if tool_id.contains("Extract genomic DNA") {
            let source = step
                .tool_input_object("reference_genome_cond")
                .and_then(|m| m.get("reference_genome_source").and_then(|v| v.as_str()).map(str::to_string));
            if source.as_deref() == Some("cached") {
                patches
                    .entry(step_id.clone())
                    .or_default()
                    .insert("reference_genome_cond|reference_genome".to_string(), dbkey.to_string());
            }
        } else if tool_id.contains("repeat_masker") {
            match GENOME_SPECIES.get(dbkey).copied().filter(|s| *s != UNKNOWN_DBKEY) {
                Some(species) => match step.tool_input_str("species") {
                    Some(current) if current.starts_with("-species") => {
                        patches
                            .entry(step_id.clone())
                            .or_default()
                            .insert("species".to_string(), format!("-species {}", species));
                    }
                    _ => warn!("Cannot update species for dbkey {} in step {}: the tool has no species parameter.", dbkey, step_id),
                },
                None => warn!("Cannot update species for dbkey {} in step {}: no mapped species.", dbkey, step_id),
            }
        }
    }
    patches
}

/// Config parameters win over patches for the same step id.
pub fn merge_parameters(configured: &StepParameters, patches: StepParameters) -> StepParameters {
    let mut merged = patches;
    for (step_id, params) in configured {
        merged.insert(step_id.clone(), params.clone());
    }
    merged
}
