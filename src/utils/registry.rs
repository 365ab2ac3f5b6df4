//! Sample-tracking registry payloads, submission and response policy.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use log::{info, warn};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::defs::{REGISTRY_ACCEPTED, REGISTRY_REJECTED};
use crate::utils::galaxy::make_url;

/// Characters the workbench escapes in tool parameter strings.
pub const MAPPED_CHARS: [(char, &str); 13] = [
    ('>', "__gt__"),
    ('<', "__lt__"),
    ('\'', "__sq__"),
    ('"', "__dq__"),
    ('[', "__ob__"),
    (']', "__cb__"),
    ('{', "__oc__"),
    ('}', "__cc__"),
    ('@', "__at__"),
    ('\n', "__cn__"),
    ('\r', "__cr__"),
    ('\t', "__tc__"),
    ('#', "__pd__"),
];

pub const PARAMETER_SEPARATOR: &str = "__SeP__";

pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match MAPPED_CHARS.iter().find(|(k, _)| *k == c) {
            Some((_, escaped)) => out.push_str(escaped),
            None => out.push(c),
        }
    }
    out
}

/// Single left-to-right scan; a token is only recognised where it starts.
pub fn restore_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        match MAPPED_CHARS.iter().find(|(_, escaped)| rest.starts_with(escaped)) {
            Some((original, escaped)) => {
                out.push(*original);
                rest = &rest[escaped.len()..];
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// `__SeP__k1__SeP__v1__SeP__k2__SeP__v2` -> `k1=v1,k2=v2` with escapes restored.
/// A trailing key without a value is dropped.
pub fn format_tool_parameters(raw: &str) -> String {
    let trimmed = raw.strip_prefix(PARAMETER_SEPARATOR).unwrap_or(raw);
    if trimmed.is_empty() {
        return String::new();
    }
    let items: Vec<&str> = trimmed.split(PARAMETER_SEPARATOR).collect();
    items
        .chunks_exact(2)
        .map(|pair| format!("{}={}", restore_text(pair[0]), restore_text(pair[1])))
        .collect::<Vec<_>>()
        .join(",")
}


/// One `--input` / `--input_extra` group: path, hid, id, datatype, dbkey.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDescriptor {
    pub path: String,
    pub hid: String,
    pub id: String,
    pub datatype: String,
    pub dbkey: String,
}

impl DatasetDescriptor {
    pub fn from_values(values: &[String]) -> Result<Vec<DatasetDescriptor>> {
        if values.len() % 5 != 0 {
            return Err(anyhow!(
                "Dataset descriptors take 5 values (path, hid, id, datatype, dbkey); got {}",
                values.len()
            ));
        }
        Ok(values
            .chunks_exact(5)
            .map(|c| DatasetDescriptor {
                path: c[0].clone(),
                hid: c[1].clone(),
                id: c[2].clone(),
                datatype: c[3].clone(),
                dbkey: c[4].clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRef {
    #[serde(rename = "type")]
    pub datatype: String,
    pub uri: String,
}

pub fn dataset_ref(galaxy_base_url: &str, dataset: &DatasetDescriptor) -> DatasetRef {
    DatasetRef {
        datatype: dataset.datatype.clone(),
        uri: format!("{}/datasets/{}/display?preview=True", galaxy_base_url.trim_end_matches('/'), dataset.id),
    }
}

pub fn history_url(galaxy_base_url: &str, history_id: &str) -> String {
    format!("{}/histories/view?id={}", galaxy_base_url.trim_end_matches('/'), history_id)
}

pub type StatisticsMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsPayload {
    pub genome: String,
    pub history_id: String,
    pub parameters: String,
    pub run: i64,
    pub sample: i64,
    pub tool_category: String,
    pub tool_id: String,
    pub user_email: Option<String>,
    pub workflow_id: Option<String>,
    pub workflow_step_id: Option<String>,
    pub statistics: Vec<StatisticsMap>,
    pub datasets: Vec<DatasetRef>,
    #[serde(rename = "history_url", skip_serializing_if = "Option::is_none")]
    pub history_url: Option<String>,
}

/// Workflow, run and sample encoded in a history name `<workflow>-<run>-<sample>.<suffix>`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryNameParts {
    pub workflow: String,
    pub run: i64,
    pub sample: i64,
}

pub fn parse_history_name(name: &str) -> Result<HistoryNameParts> {
    let items: Vec<&str> = name.split('-').collect();
    let workflow = items
        .first()
        .filter(|w| !w.is_empty())
        .ok_or_else(|| anyhow!("History name {} does not contain a workflow name", name))?
        .to_string();
    let run = items
        .get(1)
        .and_then(|r| r.trim().parse::<i64>().ok())
        .ok_or_else(|| anyhow!("History name {} is likely invalid, it does not contain a run", name))?;
    let sample = items
        .get(2)
        .and_then(|s| s.split('.').next())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| anyhow!("History name {} is likely invalid, it does not contain a sample", name))?;
    Ok(HistoryNameParts { workflow, run, sample })
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegistryVerdict {
    Accepted,
    Rejected,
    Failed,
}

/// `"200"` is accepted, `"500"` is a tolerated rejection, anything else (including a missing code) fails.
pub fn check_response(response: &Value) -> RegistryVerdict {
    match response.get("response_code") {
        Some(Value::String(code)) if code == REGISTRY_ACCEPTED => RegistryVerdict::Accepted,
        Some(Value::String(code)) if code == REGISTRY_REJECTED => RegistryVerdict::Rejected,
        _ => RegistryVerdict::Failed,
    }
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    url: String,
    api_key: String,
    client: Client,
}

impl RegistryClient {
    pub fn new(url: &str, api_key: &str) -> Self {
        RegistryClient { url: url.to_string(), api_key: api_key.to_string(), client: Client::new() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs a payload. Never fails: HTTP errors yield the decoded error body and
    /// transport errors a `{"response_code": null, "message": ...}` document.
    pub async fn submit(&self, payload: &StatisticsPayload) -> Value {
        let url = make_url(&self.url, "apiKey", &self.api_key);
        let response = match self.client.post(&url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => return json!({ "response_code": null, "message": e.to_string() }),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return json!({ "response_code": null, "message": e.to_string() }),
        };
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => value,
            Err(_) => json!({ "response_code": null, "message": format!("HTTP {}: {}", status, body) }),
        }
    }
}

/// Writes the registry URL, payload and response for the workbench to display.
pub fn store_results(path: &Path, registry_url: &str, payload: &StatisticsPayload, response: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let text = format!(
        "registry_url:\n{}\n\npayload:\n{}\n\nresponse:\n{}\n",
        registry_url,
        serde_json::to_string(payload)?,
        response
    );
    fs::write(path, text)?;
    info!("Stored registry results in {}", path.display());
    Ok(())
}

/// Applies the response policy, storing results unless the submission failed.
pub fn settle_response(
    path: &Path,
    registry_url: &str,
    payload: &StatisticsPayload,
    response: &Value,
) -> Result<RegistryVerdict> {
    let verdict = check_response(response);
    match verdict {
        RegistryVerdict::Accepted => store_results(path, registry_url, payload, response)?,
        RegistryVerdict::Rejected => {
            warn!("The registry rejected the statistics (response code {}): {}", REGISTRY_REJECTED, response);
            store_results(path, registry_url, payload, response)?;
        }
        RegistryVerdict::Failed => {
            return Err(anyhow!(
                "Error sending statistics to the registry!\n\nURL:\n{}\n\nPayload:\n{}\n\nResponse:\n{}",
                registry_url,
                serde_json::to_string(payload)?,
                response
            ));
        }
    }
    Ok(verdict)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn payload() -> StatisticsPayload {
        StatisticsPayload {
            genome: "hg19".to_string(),
            history_id: "h1".to_string(),
            parameters: "a=1".to_string(),
            run: 199,
            sample: 10749,
            tool_category: "Unknown".to_string(),
            tool_id: "fastqc".to_string(),
            user_email: None,
            workflow_id: Some("wf1".to_string()),
            workflow_step_id: None,
            statistics: vec![StatisticsMap::new()],
            datasets: vec![],
            history_url: None,
        }
    }

    #[test]
    fn test_escape_round_trip() {
        let text = "a>b<c'd\"e[f]g{h}i@j\nk\rl\tm#n";
        let sanitized = sanitize_text(text);
        assert!(!sanitized.contains('>'));
        assert!(sanitized.contains("__gt__"));
        assert_eq!(restore_text(&sanitized), text);
    }

    #[test]
    fn test_escape_round_trip_with_token_fragments() {
        for text in ["<gt__", "a>lt__b", "[ob__x", "__<__", "é<ü"] {
            assert_eq!(restore_text(&sanitize_text(text)), text, "round trip of {:?}", text);
        }
        assert_eq!(restore_text("__lt__gt__"), "<gt__");
    }

    #[test]
    fn test_format_tool_parameters() {
        assert_eq!(
            format_tool_parameters("__SeP__input__SeP____ob__1__cb____SeP__SeP_flag__SeP__true"),
            "input=[1],SeP_flag=true"
        );
        assert_eq!(format_tool_parameters(""), "");
        assert_eq!(format_tool_parameters("__SeP__k__SeP__v__SeP__dangling"), "k=v");
    }

    #[test]
    fn test_parse_history_name() -> Result<()> {
        let parts = parse_history_name("paired_001-199-10749.001")?;
        assert_eq!(parts, HistoryNameParts { workflow: "paired_001".to_string(), run: 199, sample: 10749 });
        assert!(parse_history_name("paired_001-abc-1.001").is_err());
        assert!(parse_history_name("paired_001").is_err());
        Ok(())
    }

    #[test]
    fn test_check_response_policy() {
        assert_eq!(check_response(&json!({"response_code": "200"})), RegistryVerdict::Accepted);
        assert_eq!(check_response(&json!({"response_code": "500"})), RegistryVerdict::Rejected);
        assert_eq!(check_response(&json!({"response_code": null})), RegistryVerdict::Failed);
        assert_eq!(check_response(&json!({"message": "x"})), RegistryVerdict::Failed);
        assert_eq!(check_response(&json!({"response_code": "404"})), RegistryVerdict::Failed);
    }

    #[test]
    fn test_settle_response_stores_or_fails() -> Result<()> {
        let tmp = tempdir()?;
        let out = tmp.path().join("out").join("stats.txt");

        let verdict = settle_response(&out, "http://reg/api", &payload(), &json!({"response_code": "500"}))?;
        assert_eq!(verdict, RegistryVerdict::Rejected);
        let text = fs::read_to_string(&out)?;
        assert!(text.starts_with("registry_url:\nhttp://reg/api\n\npayload:\n"));
        assert!(text.contains("\"historyId\":\"h1\""));

        let failed = tmp.path().join("failed.txt");
        assert!(settle_response(&failed, "http://reg/api", &payload(), &json!({"response_code": null})).is_err());
        assert!(!failed.exists());
        Ok(())
    }

    #[test]
    fn test_payload_field_names() -> Result<()> {
        let mut p = payload();
        p.history_url = Some(history_url("http://galaxy/", "h1"));
        let value = serde_json::to_value(&p)?;
        for key in ["genome", "historyId", "parameters", "run", "sample", "toolCategory", "toolId",
                    "userEmail", "workflowId", "workflowStepId", "statistics", "datasets", "history_url"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["history_url"], json!("http://galaxy/histories/view?id=h1"));
        Ok(())
    }

    #[test]
    fn test_dataset_descriptors() -> Result<()> {
        let values: Vec<String> = ["a.bam", "3", "id3", "bam", "hg19"].iter().map(|s| s.to_string()).collect();
        let ds = DatasetDescriptor::from_values(&values)?;
        assert_eq!(ds[0].hid, "3");
        let r = dataset_ref("http://galaxy", &ds[0]);
        assert_eq!(r.uri, "http://galaxy/datasets/id3/display?preview=True");
        assert!(DatasetDescriptor::from_values(&values[..4]).is_err());
        Ok(())
    }
}
