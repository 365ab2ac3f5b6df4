/// Data library lookups and create-if-absent helpers on top of a [`Workbench`].
use std::path::Path;
use anyhow::Result;
use log::info;
use serde_json::Value;
use crate::config::defs::{DEFAULT_DATATYPE, UNKNOWN_DBKEY};
use crate::utils::galaxy::Workbench;
use crate::utils::manifest::ManifestEntry;

/// A library file selected as workflow input.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryDataset {
    pub id: String,
    pub name: String,
}

/// Id of the non-deleted library whose name matches exactly.
pub async fn find_library<W: Workbench>(workbench: &W, name: &str) -> Result<Option<String>> {
    info!("Searching for data library named {}.", name);
    let libraries = workbench.libraries().await?;
    Ok(libraries
        .into_iter()
        .find(|lib| lib.name == name && !lib.deleted)
        .map(|lib| lib.id))
}

pub async fn ensure_library<W: Workbench>(
    workbench: &W,
    name: &str,
    description: Option<&str>,
    synopsis: Option<&str>,
) -> Result<String> {
    if let Some(id) = find_library(workbench, name).await? {
        info!("Found data library named {}.", name);
        return Ok(id);
    }
    let library = workbench.create_library(name, description, synopsis).await?;
    info!("Created data library named {} with id {}.", name, library.id);
    Ok(library.id)
}

/// Id of the library folder named `name`, ignoring the leading `/`.
pub async fn find_folder<W: Workbench>(workbench: &W, library_id: &str, name: &str) -> Result<Option<String>> {
    info!("Searching for folder named {} in data library {}.", name, library_id);
    let contents = workbench.library_contents(library_id).await?;
    Ok(contents
        .into_iter()
        .find(|item| item.is_folder() && item.bare_name() == name)
        .map(|item| item.id))
}

pub async fn ensure_folder<W: Workbench>(workbench: &W, library_id: &str, name: &str) -> Result<String> {
    if let Some(id) = find_folder(workbench, library_id, name).await? {
        return Ok(id);
    }
    let folder = workbench.create_folder(library_id, name).await?;
    info!("Created folder named {} in data library {}.", name, library_id);
    Ok(folder.id)
}

/// Datatype an entry's files are uploaded as.
pub fn upload_datatype(entry: &ManifestEntry) -> &str {
    match entry.datatype.as_deref() {
        Some(datatype) if datatype != UNKNOWN_DBKEY => datatype,
        _ => DEFAULT_DATATYPE,
    }
}

pub async fn upload<W: Workbench>(
    workbench: &W,
    library_id: &str,
    folder_id: &str,
    path: &Path,
    datatype: &str,
) -> Result<Value> {
    info!("Uploading {} as {} into folder {}.", path.display(), datatype, folder_id);
    workbench.upload_file(library_id, folder_id, path, datatype, UNKNOWN_DBKEY).await
}

/// Library files whose name (without the leading `/`) starts with `sample`, in library order.
pub async fn sample_datasets<W: Workbench>(workbench: &W, library_id: &str, sample: &str) -> Result<Vec<LibraryDataset>> {
    let contents = workbench.library_contents(library_id).await?;
    let datasets: Vec<LibraryDataset> = contents
        .into_iter()
        .filter(|item| item.is_file() && item.bare_name().starts_with(sample))
        .map(|item| LibraryDataset { id: item.id, name: item.name })
        .collect();
    info!("Found {} datasets for sample {}.", datasets.len(), sample);
    Ok(datasets)
}

/// Whether a (lower-cased, bare) library file name is the blacklist filter for `dbkey`.
///
/// `sacCer3` and the in-house `sacCer3_cegr` share a prefix, so each excludes the other.
pub fn is_blacklist_for(dataset_name: &str, dbkey: &str) -> bool {
    let name = dataset_name.trim_start_matches('/').to_lowercase();
    let key = dbkey.to_lowercase();
    if !name.starts_with(&key) {
        return false;
    }
    match key.as_str() {
        "saccer3" => !name.starts_with("saccer3_cegr"),
        _ => true,
    }
}

pub async fn blacklist_dataset_id<W: Workbench>(workbench: &W, library_id: &str, dbkey: &str) -> Result<Option<String>> {
    info!("Searching for blacklist filter dataset for dbkey {}.", dbkey);
    let contents = workbench.library_contents(library_id).await?;
    Ok(contents
        .into_iter()
        .find(|item| item.is_file() && is_blacklist_for(&item.name, dbkey))
        .map(|item| item.id))
}
