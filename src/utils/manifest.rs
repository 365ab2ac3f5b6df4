//! Run manifest parsing.
//!
//! The first significant line of a manifest is the raw run directory; every
//! following line is `run;sample;indexes;workflow_configs[;datatype[;description[;synonym]]]`.
//! Bad lines are rejected one at a time, never the whole file.

use std::fmt;
use std::fs;
use std::path::Path;
use anyhow::{anyhow, Result};
use log::warn;
use crate::config::defs::{MAX_MANIFEST_FIELDS, MIN_MANIFEST_FIELDS};

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// 1-based line in the manifest file.
    pub line: usize,
    pub run: String,
    pub sample: String,
    pub indexes: Vec<String>,
    pub workflow_config_refs: Vec<String>,
    pub datatype: Option<String>,
    pub library_description: Option<String>,
    pub library_synonym: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManifestIssue {
    FieldCount(usize),
    MissingRun,
    MissingSample,
    MissingIndex,
    MissingWorkflowConfig,
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestIssue::FieldCount(n) => write!(
                f,
                "it must have between {} and {} strings separated by semicolons, found {}",
                MIN_MANIFEST_FIELDS, MAX_MANIFEST_FIELDS, n
            ),
            ManifestIssue::MissingRun => write!(f, "it does not contain a required run value"),
            ManifestIssue::MissingSample => write!(f, "it does not contain a required sample value"),
            ManifestIssue::MissingIndex => write!(f, "it does not contain a required index value"),
            ManifestIssue::MissingWorkflowConfig => {
                write!(f, "it does not contain a required workflow config file name")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedLine {
    pub line: usize,
    pub text: String,
    pub issue: ManifestIssue,
}

impl ManifestEntry {
    /// Builds an entry from the semicolon-separated fields of one line.
    pub fn from_fields(line: usize, fields: &[&str]) -> Result<Self, ManifestIssue> {
        if fields.len() < MIN_MANIFEST_FIELDS || fields.len() > MAX_MANIFEST_FIELDS {
            return Err(ManifestIssue::FieldCount(fields.len()));
        }

        let run = fields[0].trim();
        if run.is_empty() {
            return Err(ManifestIssue::MissingRun);
        }
        let sample = fields[1].trim();
        if sample.is_empty() {
            return Err(ManifestIssue::MissingSample);
        }
        let indexes = split_list(fields[2]);
        if indexes.is_empty() {
            return Err(ManifestIssue::MissingIndex);
        }
        let workflow_config_refs = split_list(fields[3]);
        if workflow_config_refs.is_empty() {
            return Err(ManifestIssue::MissingWorkflowConfig);
        }

        Ok(ManifestEntry {
            line,
            run: run.to_string(),
            sample: sample.to_string(),
            indexes,
            workflow_config_refs,
            datatype: optional_field(fields, 4),
            library_description: optional_field(fields, 5),
            library_synonym: optional_field(fields, 6),
        })
    }
}

fn split_list(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional_field(fields: &[&str], i: usize) -> Option<String> {
    fields
        .get(i)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub run_directory: String,
    pub entries: Vec<ManifestEntry>,
    pub rejected: Vec<RejectedLine>,
    pub total_lines: usize,
    pub blank_lines: usize,
    pub comment_lines: usize,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read manifest {}: {}", path.display(), e))?;
        Self::parse(&text).map_err(|e| anyhow!("{}: {}", path.display(), e))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Manifest::default();
        let mut run_directory: Option<String> = None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            manifest.total_lines += 1;
            let line = raw.trim();
            if line.is_empty() {
                manifest.blank_lines += 1;
                continue;
            }
            if line.starts_with('#') {
                manifest.comment_lines += 1;
                continue;
            }
            if run_directory.is_none() {
                run_directory = Some(line.to_string());
                continue;
            }

            let fields: Vec<&str> = line.split(';').collect();
            match ManifestEntry::from_fields(line_no, &fields) {
                Ok(entry) => manifest.entries.push(entry),
                Err(issue) => {
                    warn!("Skipping invalid line {}, {}:\n{}", line_no, issue, line);
                    manifest.rejected.push(RejectedLine { line: line_no, text: line.to_string(), issue });
                }
            }
        }

        manifest.run_directory = run_directory.ok_or_else(|| {
            anyhow!("Required run directory is missing (it must be the first non-blank, non-comment line)")
        })?;
        Ok(manifest)
    }

    /// Final path component of the run directory, used to name per-run directories locally.
    pub fn run_folder(&self) -> String {
        run_folder_name(&self.run_directory)
    }
}

pub fn run_folder_name(run_directory: &str) -> String {
    Path::new(run_directory.trim_end_matches('/'))
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| run_directory.to_string())
}

/// Reads only the run directory line of a manifest.
pub fn read_run_directory(path: &Path) -> Result<Option<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read manifest {}: {}", path.display(), e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string))
}
