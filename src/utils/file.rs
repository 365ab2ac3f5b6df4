use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::info;
use crate::config::defs::{ARCHIVE_DIR, COMPLETE_EXT, FASTQ_GZ_EXT};


/// Timestamp in the form `Thu, 30 Jun 2016 14:02:11` (GMT).
pub fn gmt_timestamp() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S").to_string()
}

/// Moves a processed file to `<dir>/archive/<name>.<run>.complete`.
///
/// # Arguments
///
/// * `path` - File to archive.
/// * `run` - Run identifier embedded in the archived name.
///
/// # Returns
///
/// The archived path.
pub fn archive_file(path: &Path, run: &str) -> Result<PathBuf> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Cannot archive {}: no file name", path.display()))?
        .to_string_lossy();
    let archive_dir = dir.join(ARCHIVE_DIR);
    fs::create_dir_all(&archive_dir)?;

    let archived = archive_dir.join(format!("{}.{}.{}", name, run, COMPLETE_EXT));
    fs::rename(path, &archived)
        .map_err(|e| anyhow!("Failed to archive {} to {}: {}", path.display(), archived.display(), e))?;
    info!("Archived {} to {}", path.display(), archived.display());
    Ok(archived)
}

/// Writes the `<dir>/<name>.complete` marker signalling that a step finished.
pub fn create_script_complete_file(dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", name, COMPLETE_EXT));
    let mut file = fs::File::create(&path)?;
    writeln!(file, "{}", gmt_timestamp())?;
    info!("Wrote completion marker {}", path.display());
    Ok(path)
}

/// Compressed FASTQ files in `dir` whose names begin with `prefix`, sorted.
pub fn find_fastq_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}*{}",
        glob::Pattern::escape(&dir.display().to_string()),
        glob::Pattern::escape(prefix),
        FASTQ_GZ_EXT
    );
    let mut files = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Makes an untrusted value safe to use as a single path component.
pub fn file_name_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_name_component_strips_separators() {
        assert_eq!(file_name_component("3"), "3");
        assert_eq!(file_name_component("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(file_name_component("a\\b"), "a_b");
        assert_eq!(file_name_component(".."), "__");
        assert_eq!(file_name_component(""), "_");
    }

    #[test]
    fn test_archive_file_moves_into_archive() -> Result<()> {
        let tmp = tempdir()?;
        let manifest = tmp.path().join("run_info.txt");
        fs::write(&manifest, "/seq/run\n")?;

        let archived = archive_file(&manifest, "199")?;
        assert!(!manifest.exists());
        assert_eq!(archived, tmp.path().join("archive").join("run_info.txt.199.complete"));
        assert_eq!(fs::read_to_string(archived)?, "/seq/run\n");
        Ok(())
    }

    #[test]
    fn test_complete_file_holds_timestamp() -> Result<()> {
        let tmp = tempdir()?;
        let path = create_script_complete_file(tmp.path(), "send_data")?;
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("send_data.complete"));
        let text = fs::read_to_string(path)?;
        assert!(text.contains(','));
        assert_eq!(text.trim().len(), "Thu, 30 Jun 2016 14:02:11".len());
        Ok(())
    }

    #[test]
    fn test_find_fastq_files_by_prefix() -> Result<()> {
        let tmp = tempdir()?;
        for name in ["199-10674_R1.fastq.gz", "199-10674_R2.fastq.gz", "199-10675_R1.fastq.gz", "199-10674.txt"] {
            fs::write(tmp.path().join(name), "")?;
        }
        let files = find_fastq_files(tmp.path(), "199-10674")?;
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["199-10674_R1.fastq.gz", "199-10674_R2.fastq.gz"]);
        Ok(())
    }
}
