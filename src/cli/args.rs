use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[clap(rename_all = "snake_case")]
pub enum Reporter {
    BedtoolsIntersectbed,
    Cwpair2,
    FastaNucleotideColorPlot,
    Fastqc,
    InputDataset,
    MarkDuplicatesBam,
    MemeFimo,
    MemeMeme,
    PeHistogram,
    TagPileupFrequency,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "seqrun-pipelines", version = "0.1.1", about = "Sequencing run preparation and Galaxy workflow automation")]
pub struct Arguments {

    #[arg(short, long, help = "One of: copy_raw_data, bcl2fastq, send_data, start_workflows, validate_run_info, validate_fastq, output_stats, split_motifs")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long, env = "SEQRUN_CONFIG", help = "INI settings file; defaults to config/seqrun_config.ini")]
    pub config: Option<String>,

    #[arg(short = 'c', long = "run_info_file", help = "Run manifest file")]
    pub run_info_file: Option<String>,

    #[arg(short = 'l', long = "log_file", help = "File for storing logging output")]
    pub log_file: Option<String>,

    #[arg(short = 'r', long = "raw_data_directory", help = "Directory containing datasets produced by the sequencer")]
    pub raw_data_directory: Option<String>,

    #[arg(short = 'p', long = "prep_directory", help = "Directory containing demultiplexed datasets")]
    pub prep_directory: Option<String>,

    // Remote sequencer host
    #[arg(long = "raw_data_login")]
    pub raw_data_login: Option<String>,

    #[arg(long = "run_complete_file", help = "File produced by the sequencer when a run is complete")]
    pub run_complete_file: Option<String>,

    // Demultiplexing
    #[arg(long = "bcl2fastq_binary")]
    pub bcl2fastq_binary: Option<String>,

    #[arg(long = "bcl2fastq_report_dir")]
    pub bcl2fastq_report_dir: Option<String>,

    #[arg(short = 's', long = "sample_sheet")]
    pub sample_sheet: Option<String>,

    #[arg(long, default_value_t = 24, help = "Threads for each of bcl2fastq's loading, demultiplexing, processing and writing stages")]
    pub threads: usize,

    // Workbench
    #[arg(short = 'a', long = "api_key", env = "GALAXY_API_KEY")]
    pub api_key: Option<String>,

    #[arg(short = 'u', long = "galaxy_base_url", env = "GALAXY_BASE_URL")]
    pub galaxy_base_url: Option<String>,

    #[arg(short = 'b', long = "blacklist_filter_library_name")]
    pub blacklist_filter_library_name: Option<String>,

    #[arg(short = 'w', long = "remote_workflow_config_dir_name", help = "Name of the run subdirectory holding workflow config XML files")]
    pub remote_workflow_config_dir_name: Option<String>,

    #[arg(short = 'i', long = "history_name_id", default_value = "001")]
    pub history_name_id: String,

    // Validation
    #[arg(short = 'f', long = "fastq_validator_binary")]
    pub fastq_validator_binary: Option<String>,

    #[arg(long)]
    pub run: Option<String>,

    // Statistics reporters
    #[arg(long, value_enum)]
    pub reporter: Option<Reporter>,

    #[arg(long = "registry_url", env = "REGISTRY_URL")]
    pub registry_url: Option<String>,

    #[arg(long = "registry_api_key", env = "REGISTRY_API_KEY")]
    pub registry_api_key: Option<String>,

    #[arg(long = "history_id")]
    pub history_id: Option<String>,

    #[arg(long = "history_name")]
    pub history_name: Option<String>,

    #[arg(
        long = "input",
        num_args = 5,
        value_names = ["PATH", "HID", "ID", "DATATYPE", "DBKEY"],
        action = clap::ArgAction::Append,
        help = "Input dataset descriptor; repeatable"
    )]
    pub inputs: Vec<String>,

    #[arg(long = "input_extra", num_args = 5, value_names = ["PATH", "HID", "ID", "DATATYPE", "DBKEY"], action = clap::ArgAction::Append, help = "Secondary input dataset descriptor (txt, tabular or xml); repeatable")]
    pub extra_inputs: Vec<String>,

    #[arg(long)]
    pub dbkey: Option<String>,

    #[arg(long, help = "Motif GFF to split (split_motifs)")]
    pub gff: Option<String>,

    #[arg(short = 'o', long = "output", help = "Output file or directory for results")]
    pub output: Option<String>,

    #[arg(long = "tool_id")]
    pub tool_id: Option<String>,

    #[arg(long = "tool_parameters", allow_hyphen_values = true)]
    pub tool_parameters: Option<String>,

    #[arg(long = "workflow_step_id")]
    pub workflow_step_id: Option<String>,

    #[arg(long = "user_email")]
    pub user_email: Option<String>,
}
