/// Splits a motif GFF into one `MOTIF<id>.gff` per motif.
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{anyhow, Result};
use log::info;
use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::file::file_name_component;

const DEFAULT_OUTPUT_DIR: &str = "output";

/// Value of the first attribute of column 9, e.g. `3` for `Name=3;...`.
fn motif_id(line: &str) -> Option<&str> {
    let attributes = line.split('\t').nth(8)?;
    let first = attributes.split(';').next()?;
    first.split('=').nth(1).map(str::trim)
}

/// # Arguments
/// * `input` - Motif GFF; lines starting with `#` are headers.
/// * `out_dir` - Created if missing.
///
/// # Returns
/// Written files in order of first occurrence of each motif.
pub fn split_motifs(input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let reader = BufReader::new(
        File::open(input).map_err(|e| anyhow!("Failed to open {}: {}", input.display(), e))?,
    );

    let mut header: Option<String> = None;
    let mut order: Vec<PathBuf> = Vec::new();
    let mut writers: HashMap<String, BufWriter<File>> = HashMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with('#') {
            if header.is_none() {
                header = Some(line);
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let id = motif_id(&line)
            .ok_or_else(|| anyhow!("Line {} of {} has no motif attribute", i + 1, input.display()))?;

        let file_name = format!("MOTIF{}.gff", file_name_component(id));
        if !writers.contains_key(&file_name) {
            let path = out_dir.join(&file_name);
            let mut writer = BufWriter::new(File::create(&path)?);
            if let Some(h) = &header {
                writeln!(writer, "{}", h)?;
            }
            order.push(path);
            writers.insert(file_name.clone(), writer);
        }
        if let Some(writer) = writers.get_mut(&file_name) {
            writeln!(writer, "{}", line)?;
        }
    }

    for writer in writers.values_mut() {
        writer.flush()?;
    }
    Ok(order)
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let args = &config.args;
    let input = args
        .gff
        .as_deref()
        .ok_or_else(|| PipelineError::MissingConfig("gff (--gff)".to_string()))?;
    let out_dir = match args.output.as_deref() {
        Some(dir) => PathBuf::from(dir),
        None => config.cwd.join(DEFAULT_OUTPUT_DIR),
    };

    let written = split_motifs(Path::new(input), &out_dir).map_err(|e| PipelineError::IOError(e.to_string()))?;
    info!("Wrote {} motif files to {}", written.len(), out_dir.display());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const GFF: &str = "\
##gff-version 3
##second header
chr1\tfimo\tnucleotide_motif\t10\t20\t50.1\t+\t.\tName=1;Alias=ABF1;pvalue=1e-5
chr1\tfimo\tnucleotide_motif\t30\t40\t48.0\t-\t.\tName=2;Alias=REB1;pvalue=2e-5
chr2\tfimo\tnucleotide_motif\t15\t25\t47.2\t+\t.\tName=1;Alias=ABF1;pvalue=3e-5
";

    #[test]
    fn test_split_by_motif() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let input = tmp.path().join("fimo.gff");
        fs::write(&input, GFF)?;
        let out = tmp.path().join("output");

        let written = split_motifs(&input, &out)?;
        assert_eq!(written, vec![out.join("MOTIF1.gff"), out.join("MOTIF2.gff")]);

        let motif1 = fs::read_to_string(out.join("MOTIF1.gff"))?;
        let lines: Vec<&str> = motif1.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "##gff-version 3");
        assert!(lines[1].starts_with("chr1"));
        assert!(lines[2].starts_with("chr2"));

        let motif2 = fs::read_to_string(out.join("MOTIF2.gff"))?;
        assert_eq!(motif2.lines().count(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_attribute_fails() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let input = tmp.path().join("bad.gff");
        fs::write(&input, "chr1\tfimo\tmotif\t1\t2\n")?;
        assert!(split_motifs(&input, &tmp.path().join("output")).is_err());
        Ok(())
    }

    #[test]
    fn test_motif_id_cannot_escape_output_dir() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let input = tmp.path().join("fimo.gff");
        fs::write(&input, "chr1\tfimo\tmotif\t1\t2\t1\t+\t.\tName=../../x;Alias=A\n")?;
        let out = tmp.path().join("nested").join("output");

        let written = split_motifs(&input, &out)?;
        assert_eq!(written, vec![out.join("MOTIF.._.._x.gff")]);
        assert!(written[0].is_file());
        assert!(!tmp.path().join("x.gff").exists());
        Ok(())
    }

    #[test]
    fn test_motif_id() {
        assert_eq!(motif_id("a\tb\tc\td\te\tf\tg\th\tName=7;x=y"), Some("7"));
        assert_eq!(motif_id("a\tb"), None);
    }
}
