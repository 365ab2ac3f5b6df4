use std::path::PathBuf;
use std::time::Duration;
use std::collections::HashMap;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::cli::Arguments;
use crate::config::settings::Settings;

// External software
pub const BCL2FASTQ_TAG: &str = "bcl2fastq";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const FASTQ_VALIDATOR_TAG: &str = "fastQValidator";
pub const RSYNC_TAG: &str = "rsync";
pub const SCP_TAG: &str = "scp";
pub const SSH_TAG: &str = "ssh";
pub const CP_TAG: &str = "cp";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
}

// Static Filenames
pub const LOG_FILE_SUFFIX: &str = "analysis_prep.log";
pub const COMPLETE_EXT: &str = "complete";
pub const ARCHIVE_DIR: &str = "archive";
pub const FASTQ_GZ_EXT: &str = ".fastq.gz";
pub const DEFAULT_CONFIG_FILE: &str = "config/seqrun_config.ini";

// Static Parameters
pub const DEFAULT_DATATYPE: &str = "fastqsanger";
pub const UNKNOWN_DBKEY: &str = "?";
pub const BLACKLIST_LABEL: &str = "blacklist";
pub const MIN_MANIFEST_FIELDS: usize = 4;
pub const MAX_MANIFEST_FIELDS: usize = 7;
pub const BCL2FASTQ_BARCODE_MISMATCHES: u32 = 1;

// Fixed waits imposed by the external systems
pub const REMOTE_POLL_INTERVAL: Duration = Duration::from_secs(300);
pub const SETTLE_DELAY: Duration = Duration::from_secs(10);
pub const INVOCATION_SETTLE_DELAY: Duration = Duration::from_secs(60);
pub const UPLOAD_SETTLE_DELAY: Duration = Duration::from_secs(1800);

// Registry response codes
pub const REGISTRY_ACCEPTED: &str = "200";
pub const REGISTRY_REJECTED: &str = "500";

lazy_static! {
    pub static ref GENOME_SPECIES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("bosTau7", "cow");
        m.insert("ce10", "elegans");
        m.insert("dm3", "anopheles");
        m.insert("dm5", "anopheles");
        m.insert("ec2", "?");
        m.insert("hg18", "human");
        m.insert("hg19", "human");
        m.insert("hg38", "human");
        m.insert("kl21", "fungi");
        m.insert("mm9", "mouse");
        m.insert("mm10", "mouse");
        m.insert("NC003552", "?");
        m.insert("osaindica", "rice");
        m.insert("osaIRGSP", "rice");
        m.insert("pa01", "?");
        m.insert("pf25", "?");
        m.insert("rn5", "rat");
        m.insert("sacCer3", "fungi");
        m.insert("sacCer3_cegr", "fungi");
        m.insert("Salmonella", "?");
        m.insert("tair10", "arabidopsis");
        m.insert("Xac306", "?");
        m.insert("ycp50", "?");

        m
    };
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Required setting {0} is missing from both the command line and the config file")]
    MissingConfig(String),
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },
    #[error("Workbench request failed: {0}")]
    Workbench(String),
    #[error("Registry request failed: {0}")]
    Registry(String),
    #[error("I/O error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub args: Arguments,
    pub settings: Settings,
    pub log_dir: PathBuf,
}
