//! Data-analysis workbench (Galaxy) REST client.
//!
//! Pipelines talk to the workbench through the [`Workbench`] trait so that the
//! library and workflow logic can run against an in-memory implementation.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use crate::utils::workflow::StepParameters;


/// Accepts `true`/`false` as JSON booleans or strings.
fn bool_from_value<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("expected a boolean, found {}", other))),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "bool_from_value")]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl LibraryItem {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    pub fn is_folder(&self) -> bool {
        self.kind == "folder"
    }

    /// Name without the leading `/` the workbench prefixes to library paths.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowInput {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub tool_inputs: serde_json::Map<String, Value>,
}

impl WorkflowStep {
    /// A tool input that may be stored either as an object or as a JSON-encoded string.
    pub fn tool_input_object(&self, name: &str) -> Option<serde_json::Map<String, Value>> {
        match self.tool_inputs.get(name)? {
            Value::Object(map) => Some(map.clone()),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn tool_input_str(&self, name: &str) -> Option<String> {
        match self.tool_inputs.get(name)? {
            Value::String(text) => Some(text.trim_matches('"').to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowDetails {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, WorkflowInput>,
    #[serde(default)]
    pub steps: BTreeMap<String, WorkflowStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct History {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryDataset {
    pub id: String,
    pub name: String,
}

/// Maps a workflow input index to a history dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputBinding {
    pub src: String,
    pub id: String,
}

impl InputBinding {
    pub fn history_dataset(id: &str) -> Self {
        InputBinding { src: "hda".to_string(), id: id.to_string() }
    }
}

/// Operations the pipelines need from the workbench.
#[allow(async_fn_in_trait)]
pub trait Workbench {
    async fn libraries(&self) -> Result<Vec<Library>>;

    async fn create_library(&self, name: &str, description: Option<&str>, synopsis: Option<&str>) -> Result<Library>;

    /// Every file and folder of a library, recursively.
    async fn library_contents(&self, library_id: &str) -> Result<Vec<LibraryItem>>;

    /// Creates a folder at the root of a library.
    async fn create_folder(&self, library_id: &str, name: &str) -> Result<Folder>;

    async fn folder_item_count(&self, folder_id: &str) -> Result<usize>;

    async fn upload_file(
        &self,
        library_id: &str,
        folder_id: &str,
        path: &Path,
        file_type: &str,
        dbkey: &str,
    ) -> Result<Value>;

    async fn workflows_named(&self, name: &str) -> Result<Vec<WorkflowSummary>>;

    async fn workflow(&self, workflow_id: &str) -> Result<WorkflowDetails>;

    async fn create_history(&self, name: &str) -> Result<History>;

    async fn import_library_dataset(&self, history_id: &str, dataset_id: &str) -> Result<HistoryDataset>;

    async fn invoke_workflow(
        &self,
        workflow_id: &str,
        inputs: &BTreeMap<String, InputBinding>,
        parameters: &StepParameters,
        history_id: &str,
    ) -> Result<Value>;
}


/// Appends the API key query parameter unless the URL already carries one.
pub fn make_url(url: &str, key_name: &str, key: &str) -> String {
    if url.contains(&format!("?{}=", key_name)) || url.contains(&format!("&{}=", key_name)) {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, sep, key_name, key)
}

#[derive(Debug, Clone)]
pub struct GalaxyClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl GalaxyClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        GalaxyClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        make_url(&format!("{}/api/{}", self.base_url, path), "key", &self.api_key)
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Request to /api/{} returned {}: {}", path, status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("Failed to decode response from {}: {}", path, e))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET /api/{}", path);
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        debug!("POST /api/{}", path);
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(path, response).await
    }
}

#[derive(Deserialize)]
struct LibraryDetails {
    root_folder_id: String,
}

#[derive(Deserialize)]
struct FolderDetails {
    #[serde(default)]
    item_count: usize,
}

impl Workbench for GalaxyClient {
    async fn libraries(&self) -> Result<Vec<Library>> {
        self.get_json("libraries").await
    }

    async fn create_library(&self, name: &str, description: Option<&str>, synopsis: Option<&str>) -> Result<Library> {
        let mut body = json!({ "name": name });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        if let Some(synopsis) = synopsis {
            body["synopsis"] = json!(synopsis);
        }
        self.post_json("libraries", &body).await
    }

    async fn library_contents(&self, library_id: &str) -> Result<Vec<LibraryItem>> {
        self.get_json(&format!("libraries/{}/contents", library_id)).await
    }

    async fn create_folder(&self, library_id: &str, name: &str) -> Result<Folder> {
        let details: LibraryDetails = self.get_json(&format!("libraries/{}", library_id)).await?;
        self.post_json(&format!("folders/{}", details.root_folder_id), &json!({ "name": name }))
            .await
    }

    async fn folder_item_count(&self, folder_id: &str) -> Result<usize> {
        let details: FolderDetails = self.get_json(&format!("folders/{}", folder_id)).await?;
        Ok(details.item_count)
    }

    async fn upload_file(
        &self,
        library_id: &str,
        folder_id: &str,
        path: &Path,
        file_type: &str,
        dbkey: &str,
    ) -> Result<Value> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| anyhow!("Failed to open {} for upload: {}", path.display(), e))?;
        let length = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(file_name);
        let form = Form::new()
            .text("folder_id", folder_id.to_string())
            .text("file_type", file_type.to_string())
            .text("dbkey", dbkey.to_string())
            .text("upload_option", "upload_file")
            .text("create_type", "file")
            .part("files_0|file_data", part);

        let route = format!("libraries/{}/contents", library_id);
        debug!("POST /api/{} ({} bytes)", route, length);
        let response = self.client.post(self.url(&route)).multipart(form).send().await?;
        Self::decode(&route, response).await
    }

    async fn workflows_named(&self, name: &str) -> Result<Vec<WorkflowSummary>> {
        let all: Vec<WorkflowSummary> = self.get_json("workflows").await?;
        Ok(all.into_iter().filter(|w| w.name == name).collect())
    }

    async fn workflow(&self, workflow_id: &str) -> Result<WorkflowDetails> {
        self.get_json(&format!("workflows/{}", workflow_id)).await
    }

    async fn create_history(&self, name: &str) -> Result<History> {
        self.post_json("histories", &json!({ "name": name })).await
    }

    async fn import_library_dataset(&self, history_id: &str, dataset_id: &str) -> Result<HistoryDataset> {
        self.post_json(
            &format!("histories/{}/contents", history_id),
            &json!({ "source": "library", "content": dataset_id }),
        )
        .await
    }

    async fn invoke_workflow(
        &self,
        workflow_id: &str,
        inputs: &BTreeMap<String, InputBinding>,
        parameters: &StepParameters,
        history_id: &str,
    ) -> Result<Value> {
        let body = json!({
            "inputs": inputs,
            "parameters": parameters,
            "history": format!("hist_id={}", history_id),
        });
        self.post_json(&format!("workflows/{}/invocations", workflow_id), &body).await
    }
}
