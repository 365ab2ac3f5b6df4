use std::path::Path;
use anyhow::{anyhow, Result};
use serde_json::json;
use crate::config::defs::SamtoolsSubcommand;
use crate::utils::command::samtools::SamtoolsConfig;
use crate::utils::command::samtools_command;
use crate::utils::system::{capture_cmd, ExternalCommand};
use crate::utils::registry::StatisticsMap;


/// Read counts reported for a BAM dataset, with the samtools flags that define them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadCount {
    Total,
    Mapped,
    UniquelyMapped,
    DedupUniquelyMapped,
}

impl ReadCount {
    pub const ALL: [ReadCount; 4] = [
        ReadCount::DedupUniquelyMapped,
        ReadCount::Mapped,
        ReadCount::Total,
        ReadCount::UniquelyMapped,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ReadCount::Total => "totalReads",
            ReadCount::Mapped => "mappedReads",
            ReadCount::UniquelyMapped => "uniquelyMappedReads",
            ReadCount::DedupUniquelyMapped => "dedupUniquelyMappedReads",
        }
    }

    pub fn filter_args(&self) -> Vec<&'static str> {
        match self {
            ReadCount::Total => vec!["-f", "0x40"],
            ReadCount::Mapped => vec!["-f", "0x40", "-F", "4"],
            ReadCount::UniquelyMapped => vec!["-f", "0x40", "-F", "4", "-q", "5"],
            ReadCount::DedupUniquelyMapped => vec!["-f", "0x43", "-F", "0x404", "-q", "5"],
        }
    }

    pub fn samtools_config(&self, bam: &Path) -> SamtoolsConfig {
        let mut fields: Vec<String> = self.filter_args().into_iter().map(str::to_string).collect();
        fields.push("-c".to_string());
        fields.push(bam.display().to_string());
        SamtoolsConfig { subcommand: SamtoolsSubcommand::View, subcommand_fields: fields }
    }

    pub fn command(&self, bam: &Path) -> ExternalCommand {
        samtools_command(&self.samtools_config(bam))
    }
}

/// `samtools view -c` output as a count rounded to two decimals.
pub fn parse_count(output: &str) -> Result<f64> {
    let value: f64 = output
        .trim()
        .parse()
        .map_err(|e| anyhow!("Error getting reads from samtools output {:?}: {}", output.trim(), e))?;
    Ok((value * 100.0).round() / 100.0)
}

pub async fn count_reads(bam: &Path, count: ReadCount) -> Result<f64> {
    let (rc, stdout) = capture_cmd(&count.command(bam)).await?;
    if rc != 0 {
        return Err(anyhow!("samtools view on {} failed with exit code {}", bam.display(), rc));
    }
    parse_count(&stdout)
}

/// All four read counts of a BAM dataset.
pub async fn read_count_statistics(bam: &Path) -> Result<StatisticsMap> {
    let mut map = StatisticsMap::new();
    for count in ReadCount::ALL {
        map.insert(count.key().to_string(), json!(count_reads(bam, count).await?));
    }
    Ok(map)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_read_count_flags() {
        let bam = PathBuf::from("sample.bam");
        let fields = ReadCount::DedupUniquelyMapped.samtools_config(&bam).subcommand_fields;
        assert_eq!(fields, vec!["-f", "0x43", "-F", "0x404", "-q", "5", "-c", "sample.bam"]);
        let fields = ReadCount::Total.samtools_config(&bam).subcommand_fields;
        assert_eq!(fields, vec!["-f", "0x40", "-c", "sample.bam"]);
        assert_eq!(ReadCount::Mapped.key(), "mappedReads");
    }

    #[test]
    fn test_read_count_command() {
        let cmd = ReadCount::Mapped.command(&PathBuf::from("sample.bam"));
        assert_eq!(cmd.program, crate::config::defs::SAMTOOLS_TAG);
        assert_eq!(cmd.args, vec!["view", "-f", "0x40", "-F", "4", "-c", "sample.bam"]);
    }

    #[test]
    fn test_parse_count() -> Result<()> {
        assert_eq!(parse_count("12345\n")?, 12345.0);
        assert_eq!(parse_count(" 7 ")?, 7.0);
        assert!(parse_count("samtools: error").is_err());
        Ok(())
    }
}
