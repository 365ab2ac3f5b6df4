/// Demultiplexer sample sheet generation from a run manifest.
use std::fs::File;
use std::io::Write;
use std::path::Path;
use anyhow::{anyhow, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::info;
use crate::utils::manifest::{Manifest, ManifestEntry};

pub const DATA_SECTION: &str = "[Data]";
pub const HEADER: [&str; 3] = ["SampleID", "SampleName", "index"];

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSheetRow {
    pub sample_id: usize,
    pub sample_name: String,
    pub index_columns: Vec<String>,
}

impl SampleSheetRow {
    fn record(&self) -> Vec<String> {
        let mut record = vec![self.sample_id.to_string(), self.sample_name.clone()];
        record.extend(self.index_columns.iter().cloned());
        record
    }
}

/// Splits an index token into sample sheet columns.
///
/// A dash anywhere after the first character marks a dual index and every
/// dash becomes a column break. A leading dash (or no dash) keeps the token whole.
pub fn index_columns(token: &str) -> Vec<String> {
    let token = token.trim();
    match token.find('-') {
        Some(pos) if pos > 0 => token.split('-').map(|p| p.trim().to_string()).collect(),
        _ => vec![token.to_string()],
    }
}

/// One row per index token; all rows of an entry share its sample id.
pub fn sample_sheet_rows(entries: &[ManifestEntry]) -> Vec<SampleSheetRow> {
    let mut rows = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let sample_name = format!("{}-{}", entry.run, entry.sample);
        for token in &entry.indexes {
            rows.push(SampleSheetRow {
                sample_id: i + 1,
                sample_name: sample_name.clone(),
                index_columns: index_columns(token),
            });
        }
    }
    rows
}

/// Writes the sample sheet for every valid manifest entry.
///
/// # Arguments
/// * `manifest` - Parsed run manifest.
/// * `path` - Destination of the sample sheet; overwritten if present.
///
/// # Returns
/// Number of data rows written.
pub fn write_sample_sheet(manifest: &Manifest, path: &Path) -> Result<usize> {
    let mut file = File::create(path)
        .map_err(|e| anyhow!("Failed to create sample sheet {}: {}", path.display(), e))?;
    writeln!(file, "{}", DATA_SECTION)?;

    let mut writer = WriterBuilder::new().flexible(true).from_writer(file);
    writer.write_record(HEADER)?;

    let rows = sample_sheet_rows(&manifest.entries);
    for row in &rows {
        writer.write_record(row.record())?;
    }
    writer.flush()?;

    info!("Wrote {} sample sheet rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Run number of the first data row (the text before the first dash of its sample name).
pub fn run_from_sample_sheet(path: &Path) -> Result<Option<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow!("Failed to open sample sheet {}: {}", path.display(), e))?;

    for record in reader.records() {
        let record = record?;
        let first = record.get(0).unwrap_or("").trim();
        if first.is_empty() || first.starts_with('[') || first == HEADER[0] {
            continue;
        }
        return Ok(record
            .get(1)
            .and_then(|name| name.split('-').next())
            .map(|run| run.trim().to_string())
            .filter(|run| !run.is_empty()));
    }
    Ok(None)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST: &str = "\
/seq/runs/160630_NS500168_0158_AH5HGWBGXY
199;10-674;ATCACG-CGATGT;wf1.xml
199;10675;CGATGT,-TTAGGC;wf1.xml
";

    #[test]
    fn test_index_columns() {
        assert_eq!(index_columns("ATCACG-CGATGT"), vec!["ATCACG", "CGATGT"]);
        assert_eq!(index_columns("ATCACG"), vec!["ATCACG"]);
        assert_eq!(index_columns("-TTAGGC"), vec!["-TTAGGC"]);
        assert_eq!(index_columns("A-B-C"), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_rows_share_entry_id() -> anyhow::Result<()> {
        let manifest = Manifest::parse(MANIFEST)?;
        let rows = sample_sheet_rows(&manifest.entries);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].sample_id, 1);
        assert_eq!(rows[1].sample_id, 2);
        assert_eq!(rows[2].sample_id, 2);
        assert_eq!(rows[2].sample_name, "199-10675");
        Ok(())
    }

    #[test]
    fn test_write_and_read_back_run() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("SampleSheet.csv");
        let manifest = Manifest::parse(MANIFEST)?;

        let written = write_sample_sheet(&manifest, &path)?;
        assert_eq!(written, 3);

        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[Data]");
        assert_eq!(lines[1], "SampleID,SampleName,index");
        assert_eq!(lines[2], "1,199-10-674,ATCACG,CGATGT");
        assert_eq!(lines[3], "2,199-10675,CGATGT");
        assert_eq!(lines[4], "2,199-10675,-TTAGGC");

        assert_eq!(run_from_sample_sheet(&path)?, Some("199".to_string()));
        Ok(())
    }

    #[test]
    fn test_run_from_empty_sample_sheet() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("SampleSheet.csv");
        fs::write(&path, "[Data]\nSampleID,SampleName,index\n")?;
        assert_eq!(run_from_sample_sheet(&path)?, None);
        Ok(())
    }
}
