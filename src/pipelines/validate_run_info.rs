/// Prints a human-readable summary of a run manifest to stdout.
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use log::info;
use crate::config::defs::{PipelineError, RunConfig, UNKNOWN_DBKEY};
use crate::pipelines::load_manifest;
use crate::utils::manifest::Manifest;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunInfoSummary {
    pub source: String,
    pub lines: usize,
    pub invalid_lines: usize,
    pub blank_lines: usize,
    pub comment_lines: usize,
    pub run_directory: String,
    pub runs: usize,
    pub samples: usize,
    pub indexes: usize,
    pub known_datatypes: usize,
    pub unknown_datatypes: usize,
    pub workflow_invocations: usize,
    pub warnings: Vec<String>,
}

impl RunInfoSummary {
    pub fn from_manifest(source: &str, manifest: &Manifest) -> Self {
        let mut runs = HashSet::new();
        let mut samples = HashSet::new();
        let mut indexes = HashSet::new();
        let mut invocations = HashSet::new();
        let mut known_datatypes = 0;

        for entry in &manifest.entries {
            runs.insert(entry.run.as_str());
            samples.insert(entry.sample.as_str());
            indexes.extend(entry.indexes.iter().map(String::as_str));
            invocations.extend(entry.workflow_config_refs.iter().map(String::as_str));
            if entry.datatype.as_deref().is_some_and(|d| d != UNKNOWN_DBKEY) {
                known_datatypes += 1;
            }
        }

        let warnings = manifest
            .rejected
            .iter()
            .map(|r| format!("Line {} is invalid, {}:\nHere is the line:\n{}", r.line, r.issue, r.text))
            .collect();

        RunInfoSummary {
            source: source.to_string(),
            lines: manifest.total_lines,
            invalid_lines: manifest.rejected.len(),
            blank_lines: manifest.blank_lines,
            comment_lines: manifest.comment_lines,
            run_directory: manifest.run_directory.clone(),
            runs: runs.len(),
            samples: samples.len(),
            indexes: indexes.len(),
            known_datatypes,
            unknown_datatypes: manifest.entries.len() - known_datatypes,
            workflow_invocations: invocations.len(),
            warnings,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.invalid_lines == 0
    }
}

impl fmt::Display for RunInfoSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nResults for {}\n", self.source)?;
        if self.is_valid() {
            writeln!(f, "Good news, the contents of the file look valid!\n")?;
        } else {
            writeln!(f, "Bad news, one or more lines in the file look invalid!\n")?;
        }
        writeln!(f, "Number of lines: {}", self.lines)?;
        writeln!(f, "Number of invalid lines: {}", self.invalid_lines)?;
        writeln!(f, "Number of blank lines: {}", self.blank_lines)?;
        writeln!(f, "Number of comment lines: {}", self.comment_lines)?;
        writeln!(f, "Full path to the raw run directory: {}", self.run_directory)?;
        writeln!(f, "Number of runs defined: {}", self.runs)?;
        writeln!(f, "Number of samples defined: {}", self.samples)?;
        writeln!(f, "Number of indexes defined: {}", self.indexes)?;
        writeln!(f, "Number of known datatypes defined: {}", self.known_datatypes)?;
        writeln!(
            f,
            "Number of unknown datatypes that will be set to the default fastqsanger: {}",
            self.unknown_datatypes
        )?;
        writeln!(f, "Number of workflow invocations defined: {}", self.workflow_invocations)?;
        writeln!(f, "\nNumber of warnings: {}", self.warnings.len())?;
        for warning in &self.warnings {
            writeln!(f, "{}\n", warning)?;
        }
        Ok(())
    }
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let (path, manifest) = load_manifest(&config)?;
    let summary = RunInfoSummary::from_manifest(&path.display().to_string(), &manifest);
    info!("Validated {} manifest lines in {}", summary.lines, summary.source);
    println!("{}", summary);
    Ok(())
}
