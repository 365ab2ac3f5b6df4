/// INI-style settings and the explicit > config-file resolution chain.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use ini::{Ini, ParseOption};
use crate::config::defs::PipelineError;

pub const DEFAULTS_SECTION: &str = "defaults";
pub const WORKFLOWS_SECTION: &str = "workflows";
pub const WORKFLOW_INVOCATION_SECTION: &str = "workflow_invocation";
pub const LEN_FILES_SECTION: &str = "len_files";
pub const TOOL_CATEGORIES_SECTION: &str = "tool_categories";

/// Sections of the settings file, keys lower-cased.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    source: Option<PathBuf>,
    sections: HashMap<String, HashMap<String, String>>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let mut settings = Self::parse(&text)?;
        settings.source = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Parses `[section]` headers and `key = value` / `key: value` lines.
    /// Backslashes and quotes are kept verbatim so paths survive unchanged.
    pub fn parse(text: &str) -> Result<Self> {
        let options = ParseOption { enabled_quote: false, enabled_escape: false, ..Default::default() };
        let ini = Ini::load_from_str_opt(text, options).map_err(|e| anyhow!("Malformed config file: {}", e))?;

        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (section, properties) in ini.iter() {
            let name = match section {
                Some(name) => name.trim().to_lowercase(),
                None if properties.is_empty() => continue,
                None => {
                    let keys: Vec<&str> = properties.iter().map(|(k, _)| k).collect();
                    return Err(anyhow!("Settings outside of any section: {}", keys.join(", ")));
                }
            };
            let entries = sections.entry(name).or_default();
            for (key, value) in properties.iter() {
                entries.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Ok(Settings { source: None, sections })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_lowercase())
            .and_then(|s| s.get(&key.to_lowercase()))
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn section(&self, section: &str) -> Option<&HashMap<String, String>> {
        self.sections.get(&section.to_lowercase())
    }

    /// Explicit value first, then `[defaults]`.
    pub fn resolve(&self, explicit: Option<&str>, key: &str) -> Option<String> {
        match explicit {
            Some(value) => Some(value.to_string()),
            None => self.get(DEFAULTS_SECTION, key).map(str::to_string),
        }
    }

    pub fn require(&self, explicit: Option<&str>, key: &str) -> Result<String, PipelineError> {
        self.resolve(explicit, key)
            .ok_or_else(|| PipelineError::MissingConfig(key.to_string()))
    }

    /// Resolves a path setting to an absolute path, creating the directory when asked.
    pub fn resolve_path(
        &self,
        explicit: Option<&str>,
        key: &str,
        create_dir: bool,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let value = match self.resolve(explicit, key) {
            Some(v) => PathBuf::from(v),
            None => return Ok(None),
        };
        if create_dir && !value.is_dir() {
            fs::create_dir_all(&value)?;
        }
        Ok(Some(absolute(&value)?))
    }

    pub fn require_path(
        &self,
        explicit: Option<&str>,
        key: &str,
        create_dir: bool,
    ) -> Result<PathBuf, PipelineError> {
        self.resolve_path(explicit, key, create_dir)?
            .ok_or_else(|| PipelineError::MissingConfig(key.to_string()))
    }

    /// `[workflows]` single / paired names.
    pub fn workflow_names(&self) -> Result<WorkflowNames, PipelineError> {
        let single = self
            .get(WORKFLOWS_SECTION, "single")
            .ok_or_else(|| PipelineError::MissingConfig("workflows.single".to_string()))?;
        let paired = self
            .get(WORKFLOWS_SECTION, "paired")
            .ok_or_else(|| PipelineError::MissingConfig("workflows.paired".to_string()))?;
        Ok(WorkflowNames { single: single.to_string(), paired: paired.to_string() })
    }

    /// Genome keys for which no workflow is ever invoked.
    pub fn no_invocation_dbkeys(&self) -> Vec<String> {
        self.get(WORKFLOW_INVOCATION_SECTION, "no_invocation")
            .map(listify)
            .unwrap_or_default()
    }

    /// Chromosome length files keyed by lower-cased genome key.
    pub fn len_files(&self) -> HashMap<String, String> {
        self.section(LEN_FILES_SECTION).cloned().unwrap_or_default()
    }

    pub fn tool_category(&self, tool_id: &str) -> String {
        self.get(TOOL_CATEGORIES_SECTION, tool_id)
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowNames {
    pub single: String,
    pub paired: String,
}

/// Splits a comma-separated setting into trimmed, non-empty tokens.
pub fn listify(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
# pipeline settings
[defaults]
GALAXY_BASE_URL = http://localhost:8080
api_key: abc123
empty =

[workflows]
SINGLE = single_001
PAIRED = paired_001

[workflow_invocation]
no_invocation = Salmonella, ycp50

[len_files]
hg19 = /len/hg19.len
";

    #[test]
    fn test_parse_sections_case_insensitive() -> anyhow::Result<()> {
        let settings = Settings::parse(SAMPLE)?;
        assert_eq!(settings.get("defaults", "galaxy_base_url"), Some("http://localhost:8080"));
        assert_eq!(settings.get("DEFAULTS", "API_KEY"), Some("abc123"));
        assert_eq!(settings.get("defaults", "empty"), None);
        assert_eq!(settings.len_files().get("hg19").map(String::as_str), Some("/len/hg19.len"));
        assert_eq!(settings.no_invocation_dbkeys(), vec!["Salmonella".to_string(), "ycp50".to_string()]);
        assert_eq!(
            settings.workflow_names()?,
            WorkflowNames { single: "single_001".to_string(), paired: "paired_001".to_string() }
        );
        Ok(())
    }

    #[test]
    fn test_explicit_value_wins() -> anyhow::Result<()> {
        let settings = Settings::parse(SAMPLE)?;
        assert_eq!(settings.resolve(Some("override"), "API_KEY"), Some("override".to_string()));
        assert_eq!(settings.resolve(None, "API_KEY"), Some("abc123".to_string()));
        assert!(matches!(
            settings.require(None, "RAW_DATA_DIR"),
            Err(PipelineError::MissingConfig(key)) if key == "RAW_DATA_DIR"
        ));
        Ok(())
    }

    #[test]
    fn test_resolve_path_creates_directory_idempotently() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let target = tmp.path().join("logs").join("nested");
        let settings = Settings::parse(&format!("[defaults]\nlog_dir = {}\n", target.display()))?;

        let first = settings.require_path(None, "LOG_DIR", true)?;
        let second = settings.require_path(None, "LOG_DIR", true)?;
        assert!(target.is_dir());
        assert_eq!(first, second);
        assert!(first.is_absolute());
        Ok(())
    }

    #[test]
    fn test_setting_outside_section_is_rejected() {
        assert!(Settings::parse("key = value\n").is_err());
    }

    #[test]
    fn test_values_are_kept_verbatim() -> anyhow::Result<()> {
        let settings = Settings::parse("; shared host\n[defaults]\nraw_data_dir = C:\\runs\\raw\nname = \"quoted\"\n")?;
        assert_eq!(settings.get("defaults", "RAW_DATA_DIR"), Some("C:\\runs\\raw"));
        assert_eq!(settings.get("defaults", "name"), Some("\"quoted\""));
        Ok(())
    }
}
