//! Statistics reporters run as workbench tool wrappers.
//!
//! Each reporter turns the `--input` / `--input_extra` dataset descriptors into
//! one or more registry payloads, submits them and writes the URL, payload and
//! response next to the tool's outputs. Reporters that handle collections write
//! one result per input under a reporter-specific directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::cli::Reporter;
use crate::config::defs::{PipelineError, RunConfig, SAMTOOLS_TAG};
use crate::pipelines::galaxy_client;
use crate::utils::command::check_version;
use crate::utils::galaxy::Workbench;
use crate::utils::registry::{
    dataset_ref, format_tool_parameters, history_url, parse_history_name, settle_response, DatasetDescriptor,
    HistoryNameParts, RegistryClient, RegistryVerdict, StatisticsMap, StatisticsPayload,
};
use crate::utils::sambam::read_count_statistics;
use crate::utils::stats::{pe_histogram, peak_pair_wis, peak_stats};

const UNKNOWN_GENOME: &str = "unknown";

/// Payload fields shared by every submission of one reporter run.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub galaxy_base_url: String,
    pub history_id: String,
    pub history: HistoryNameParts,
    pub workflow_id: Option<String>,
    pub tool_id: String,
    pub tool_category: String,
    pub parameters: String,
    pub user_email: Option<String>,
    pub workflow_step_id: Option<String>,
    pub dbkey: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub output: PathBuf,
    pub payload: StatisticsPayload,
}

impl ReportContext {
    fn payload(
        &self,
        genome: &str,
        statistics: Vec<StatisticsMap>,
        datasets: &[&DatasetDescriptor],
        with_history_url: bool,
    ) -> StatisticsPayload {
        StatisticsPayload {
            genome: genome.to_string(),
            history_id: self.history_id.clone(),
            parameters: self.parameters.clone(),
            run: self.history.run,
            sample: self.history.sample,
            tool_category: self.tool_category.clone(),
            tool_id: self.tool_id.clone(),
            user_email: self.user_email.clone(),
            workflow_id: self.workflow_id.clone(),
            workflow_step_id: self.workflow_step_id.clone(),
            statistics,
            datasets: datasets.iter().map(|d| dataset_ref(&self.galaxy_base_url, d)).collect(),
            history_url: with_history_url.then(|| history_url(&self.galaxy_base_url, &self.history_id)),
        }
    }

    /// First input's genome key, then `--dbkey`, then `unknown`.
    fn genome(&self, inputs: &[&DatasetDescriptor]) -> String {
        inputs
            .first()
            .map(|d| d.dbkey.clone())
            .or_else(|| self.dbkey.clone())
            .unwrap_or_else(|| UNKNOWN_GENOME.to_string())
    }

    /// One payload per input dataset, each stored as `<dir>/statistics_on_data_<hid>.txt`.
    fn per_input(&self, inputs: &[DatasetDescriptor], dir: &Path) -> Vec<Submission> {
        inputs
            .iter()
            .map(|d| Submission {
                output: dir.join(format!("statistics_on_data_{}.txt", d.hid)),
                payload: self.payload(&d.dbkey, vec![StatisticsMap::new()], &[d], false),
            })
            .collect()
    }
}

/// Workflow input step of an `input_dataset_r1` / `input_dataset_r2` tool.
pub fn input_step_id(tool_id: &str) -> Option<&'static str> {
    match tool_id {
        "input_dataset_r1" => Some("input1"),
        "input_dataset_r2" => Some("input2"),
        _ => None,
    }
}

fn require_output(output: Option<&Path>) -> Result<PathBuf> {
    output
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("This reporter requires an output file (--output)"))
}

/// Builds the payloads of one reporter.
///
/// # Arguments
/// * `reporter` - Which tool's outputs are described.
/// * `ctx` - Shared payload fields.
/// * `inputs` - `--input` descriptors.
/// * `extra` - `--input_extra` descriptors (text, tabular or xml companions).
/// * `output` - Result file for single-payload reporters.
/// * `work_dir` - Parent of the per-input result directories.
pub async fn build_submissions(
    reporter: Reporter,
    ctx: &ReportContext,
    inputs: &[DatasetDescriptor],
    extra: &[DatasetDescriptor],
    output: Option<&Path>,
    work_dir: &Path,
) -> Result<Vec<Submission>> {
    let all: Vec<&DatasetDescriptor> = inputs.iter().chain(extra.iter()).collect();
    let empty_stats = |n: usize| vec![StatisticsMap::new(); n];

    let submissions = match reporter {
        Reporter::BedtoolsIntersectbed => {
            let statistics = inputs
                .iter()
                .map(|d| peak_stats(Path::new(&d.path)).map(|s| s.to_statistics()))
                .collect::<Result<Vec<_>>>()?;
            let datasets: Vec<&DatasetDescriptor> = inputs.iter().collect();
            vec![Submission {
                output: require_output(output)?,
                payload: ctx.payload(&ctx.genome(&datasets), statistics, &datasets, false),
            }]
        }
        Reporter::Cwpair2 => {
            let statistics = inputs
                .iter()
                .map(|d| peak_pair_wis(Path::new(&d.path)))
                .collect::<Result<Vec<_>>>()?;
            let datasets: Vec<&DatasetDescriptor> = inputs.iter().collect();
            vec![Submission {
                output: require_output(output)?,
                payload: ctx.payload(&ctx.genome(&datasets), statistics, &datasets, true),
            }]
        }
        Reporter::FastaNucleotideColorPlot | Reporter::Fastqc | Reporter::MemeMeme => vec![Submission {
            output: require_output(output)?,
            payload: ctx.payload(&ctx.genome(&all), empty_stats(all.len()), &all, false),
        }],
        Reporter::InputDataset => {
            let mut step_ctx = ctx.clone();
            step_ctx.workflow_step_id = input_step_id(&ctx.tool_id).map(str::to_string);
            if step_ctx.workflow_step_id.is_none() {
                warn!("Tool {} is not a paired-end input dataset tool", ctx.tool_id);
            }
            vec![Submission {
                output: require_output(output)?,
                payload: step_ctx.payload(&step_ctx.genome(&all), empty_stats(all.len()), &all, false),
            }]
        }
        Reporter::MarkDuplicatesBam => {
            let version = check_version(SAMTOOLS_TAG).await.map_err(|e| {
                anyhow!("Attempting to use functionality requiring samtools, but it cannot be located: {}", e)
            })?;
            info!("Using samtools {}", version);
            let mut statistics = Vec::new();
            for d in inputs {
                statistics.push(read_count_statistics(Path::new(&d.path)).await?);
            }
            let datasets: Vec<&DatasetDescriptor> = inputs.iter().collect();
            vec![Submission {
                output: require_output(output)?,
                payload: ctx.payload(&ctx.genome(&datasets), statistics, &datasets, false),
            }]
        }
        Reporter::MemeFimo => {
            let mut submissions = ctx.per_input(inputs, &work_dir.join("output_gff"));
            submissions.extend(ctx.per_input(extra, &work_dir.join("output_xml")));
            submissions
        }
        Reporter::PeHistogram => {
            let mut statistics = empty_stats(inputs.len());
            let tabular: Vec<&DatasetDescriptor> = extra.iter().collect();
            statistics.extend(tabular.iter().map(|_| pe_histogram()));
            vec![Submission {
                output: require_output(output)?,
                payload: ctx.payload(&ctx.genome(&all), statistics, &all, true),
            }]
        }
        Reporter::TagPileupFrequency => {
            let mut submissions = ctx.per_input(inputs, &work_dir.join("heatmap"));
            if !extra.is_empty() {
                let tabular: Vec<&DatasetDescriptor> = extra.iter().collect();
                submissions.push(Submission {
                    output: require_output(output)?,
                    payload: ctx.payload(&ctx.genome(&tabular), empty_stats(tabular.len()), &tabular, false),
                });
            }
            submissions
        }
    };
    Ok(submissions)
}

/// Looks up the id of the workflow named by the history, if it exists.
pub async fn workflow_id_for<W: Workbench>(workbench: &W, history: &HistoryNameParts) -> Result<Option<String>> {
    let found = workbench.workflows_named(&history.workflow).await?;
    Ok(found.first().map(|w| w.id.clone()))
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let settings = &config.settings;
    let args = &config.args;

    let reporter = args
        .reporter
        .ok_or_else(|| PipelineError::MissingConfig("reporter (--reporter)".to_string()))?;
    let history_name = args
        .history_name
        .as_deref()
        .ok_or_else(|| PipelineError::MissingConfig("history_name (--history_name)".to_string()))?;
    let history_id = args
        .history_id
        .clone()
        .ok_or_else(|| PipelineError::MissingConfig("history_id (--history_id)".to_string()))?;
    let tool_id = args
        .tool_id
        .clone()
        .ok_or_else(|| PipelineError::MissingConfig("tool_id (--tool_id)".to_string()))?;

    let history = parse_history_name(history_name).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    let inputs = DatasetDescriptor::from_values(&args.inputs).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    let extra =
        DatasetDescriptor::from_values(&args.extra_inputs).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

    let workbench = galaxy_client(&config)?;
    let workflow_id = workflow_id_for(&workbench, &history)
        .await
        .map_err(|e| PipelineError::Workbench(e.to_string()))?;
    let registry = RegistryClient::new(
        &settings.require(args.registry_url.as_deref(), "REGISTRY_URL")?,
        &settings.require(args.registry_api_key.as_deref(), "REGISTRY_API_KEY")?,
    );

    let ctx = ReportContext {
        galaxy_base_url: workbench.base_url().to_string(),
        history_id,
        history,
        workflow_id,
        tool_category: settings.tool_category(&tool_id),
        tool_id,
        parameters: args.tool_parameters.as_deref().map(format_tool_parameters).unwrap_or_default(),
        user_email: args.user_email.clone(),
        workflow_step_id: args.workflow_step_id.clone(),
        dbkey: args.dbkey.clone(),
    };

    let submissions = build_submissions(
        reporter,
        &ctx,
        &inputs,
        &extra,
        args.output.as_deref().map(Path::new),
        &config.cwd,
    )
    .await
    .map_err(|e| PipelineError::ToolExecution { tool: format!("{:?}", reporter), error: e.to_string() })?;

    for submission in &submissions {
        let response = registry.submit(&submission.payload).await;
        let verdict = settle_response(&submission.output, registry.url(), &submission.payload, &response)
            .map_err(|e| PipelineError::Registry(e.to_string()))?;
        if verdict == RegistryVerdict::Accepted {
            info!("Statistics accepted, results in {}", submission.output.display());
        }
    }
    Ok(())
}
