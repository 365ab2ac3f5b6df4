#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use seqrun_pipelines::utils::galaxy::{
    Folder, History, HistoryDataset, InputBinding, Library, LibraryItem, Workbench, WorkflowDetails, WorkflowSummary,
};
use seqrun_pipelines::utils::workflow::StepParameters;

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub library_id: String,
    pub folder_id: Option<String>,
    pub item: LibraryItem,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub folder_id: String,
    pub path: PathBuf,
    pub file_type: String,
    pub dbkey: String,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub workflow_id: String,
    pub inputs: BTreeMap<String, InputBinding>,
    pub parameters: StepParameters,
    pub history_id: String,
}

#[derive(Debug, Default)]
pub struct State {
    next_id: usize,
    pub libraries: Vec<Library>,
    pub items: Vec<StoredItem>,
    pub workflows: Vec<WorkflowDetails>,
    pub histories: Vec<History>,
    pub imports: Vec<(String, String)>,
    pub uploads: Vec<Upload>,
    pub invocations: Vec<Invocation>,
    pub fail_history_creation: bool,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }
}

/// Workbench kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryWorkbench {
    pub state: Mutex<State>,
}

impl MemoryWorkbench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_library(&self, name: &str) -> String {
        self.with_state(|s| {
            let id = s.id("lib");
            s.libraries.push(Library { id: id.clone(), name: name.to_string(), deleted: false });
            id
        })
    }

    pub fn add_folder(&self, library_id: &str, name: &str) -> String {
        self.with_state(|s| {
            let id = s.id("F");
            s.items.push(StoredItem {
                library_id: library_id.to_string(),
                folder_id: None,
                item: LibraryItem { id: id.clone(), name: format!("/{}", name), kind: "folder".to_string() },
            });
            id
        })
    }

    /// Adds a file; `name` is the full library path, e.g. `/10674/reads_R1.fastq.gz`.
    pub fn add_file(&self, library_id: &str, folder_id: Option<&str>, name: &str) -> String {
        self.with_state(|s| {
            let id = s.id("ds");
            s.items.push(StoredItem {
                library_id: library_id.to_string(),
                folder_id: folder_id.map(str::to_string),
                item: LibraryItem { id: id.clone(), name: name.to_string(), kind: "file".to_string() },
            });
            id
        })
    }

    pub fn add_workflow(&self, workflow: WorkflowDetails) {
        self.with_state(|s| s.workflows.push(workflow));
    }

    pub fn libraries_named(&self, name: &str) -> usize {
        self.with_state(|s| s.libraries.iter().filter(|l| l.name == name).count())
    }

    pub fn folders_in(&self, library_id: &str) -> Vec<String> {
        self.with_state(|s| {
            s.items
                .iter()
                .filter(|i| i.library_id == library_id && i.item.is_folder())
                .map(|i| i.item.name.clone())
                .collect()
        })
    }
}

impl Workbench for MemoryWorkbench {
    async fn libraries(&self) -> Result<Vec<Library>> {
        Ok(self.with_state(|s| s.libraries.clone()))
    }

    async fn create_library(&self, name: &str, _description: Option<&str>, _synopsis: Option<&str>) -> Result<Library> {
        let id = self.add_library(name);
        Ok(Library { id, name: name.to_string(), deleted: false })
    }

    async fn library_contents(&self, library_id: &str) -> Result<Vec<LibraryItem>> {
        Ok(self.with_state(|s| {
            s.items
                .iter()
                .filter(|i| i.library_id == library_id)
                .map(|i| i.item.clone())
                .collect()
        }))
    }

    async fn create_folder(&self, library_id: &str, name: &str) -> Result<Folder> {
        let id = self.add_folder(library_id, name);
        Ok(Folder { id, name: name.to_string() })
    }

    async fn folder_item_count(&self, folder_id: &str) -> Result<usize> {
        Ok(self.with_state(|s| {
            s.items
                .iter()
                .filter(|i| i.folder_id.as_deref() == Some(folder_id))
                .count()
        }))
    }

    async fn upload_file(
        &self,
        library_id: &str,
        folder_id: &str,
        path: &Path,
        file_type: &str,
        dbkey: &str,
    ) -> Result<Value> {
        let folder_name = self
            .with_state(|s| {
                s.items
                    .iter()
                    .find(|i| i.item.id == folder_id)
                    .map(|i| i.item.name.clone())
            })
            .ok_or_else(|| anyhow!("No folder {}", folder_id))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("No file name in {}", path.display()))?;
        let id = self.add_file(library_id, Some(folder_id), &format!("{}/{}", folder_name, file_name));
        self.with_state(|s| {
            s.uploads.push(Upload {
                folder_id: folder_id.to_string(),
                path: path.to_path_buf(),
                file_type: file_type.to_string(),
                dbkey: dbkey.to_string(),
            })
        });
        Ok(json!([{ "id": id, "name": file_name }]))
    }

    async fn workflows_named(&self, name: &str) -> Result<Vec<WorkflowSummary>> {
        Ok(self.with_state(|s| {
            s.workflows
                .iter()
                .filter(|w| w.name == name)
                .map(|w| WorkflowSummary { id: w.id.clone(), name: w.name.clone() })
                .collect()
        }))
    }

    async fn workflow(&self, workflow_id: &str) -> Result<WorkflowDetails> {
        self.with_state(|s| s.workflows.iter().find(|w| w.id == workflow_id).cloned())
            .ok_or_else(|| anyhow!("No workflow {}", workflow_id))
    }

    async fn create_history(&self, name: &str) -> Result<History> {
        self.with_state(|s| {
            if s.fail_history_creation {
                return Err(anyhow!("Request to /api/histories returned 500 Internal Server Error: boom"));
            }
            let history = History { id: s.id("hist"), name: name.to_string() };
            s.histories.push(history.clone());
            Ok(history)
        })
    }

    async fn import_library_dataset(&self, history_id: &str, dataset_id: &str) -> Result<HistoryDataset> {
        self.with_state(|s| {
            let name = s
                .items
                .iter()
                .find(|i| i.item.id == dataset_id)
                .map(|i| i.item.bare_name().to_string())
                .ok_or_else(|| anyhow!("No library dataset {}", dataset_id))?;
            s.imports.push((history_id.to_string(), dataset_id.to_string()));
            Ok(HistoryDataset { id: s.id("hda"), name })
        })
    }

    async fn invoke_workflow(
        &self,
        workflow_id: &str,
        inputs: &BTreeMap<String, InputBinding>,
        parameters: &StepParameters,
        history_id: &str,
    ) -> Result<Value> {
        self.with_state(|s| {
            s.invocations.push(Invocation {
                workflow_id: workflow_id.to_string(),
                inputs: inputs.clone(),
                parameters: parameters.clone(),
                history_id: history_id.to_string(),
            })
        });
        Ok(json!({ "state": "new", "workflow_id": workflow_id }))
    }
}
