/// Functions and structs for working with creating command-line arguments

use std::path::Path;
use anyhow::{anyhow, Result};
use crate::config::defs::{CP_TAG, FASTQ_VALIDATOR_TAG, RSYNC_TAG, SAMTOOLS_TAG, SCP_TAG, SSH_TAG};
use crate::utils::system::ExternalCommand;


pub mod bcl2fastq {
    use std::path::Path;
    use crate::config::defs::BCL2FASTQ_BARCODE_MISMATCHES;

    /// Locations bcl2fastq reads from and writes to for one run.
    #[derive(Debug, Clone)]
    pub struct Bcl2FastqConfig<'a> {
        pub raw_run_dir: &'a Path,
        pub prep_dir: &'a Path,
        pub sample_sheet: &'a Path,
        pub threads: usize,
    }

    pub fn arg_generator(config: &Bcl2FastqConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        let raw = config.raw_run_dir.display();
        let prep = config.prep_dir.display();
        let threads = config.threads.max(1).to_string();

        args_vec.push("-l".to_string());
        args_vec.push("ERROR".to_string());
        args_vec.push("-i".to_string());
        args_vec.push(format!("{}/Data/Intensities/BaseCalls", raw));
        args_vec.push("-R".to_string());
        args_vec.push(raw.to_string());
        args_vec.push("-o".to_string());
        args_vec.push(prep.to_string());
        args_vec.push("--interop-dir".to_string());
        args_vec.push(format!("{}/InterOp", raw));
        args_vec.push("--stats-dir".to_string());
        args_vec.push(format!("{}/Stats", prep));
        args_vec.push("--reports-dir".to_string());
        args_vec.push(format!("{}/Reports", prep));
        args_vec.push("--no-lane-splitting".to_string());
        args_vec.push("--sample-sheet".to_string());
        args_vec.push(config.sample_sheet.display().to_string());
        for flag in ["-r", "-d", "-p", "-w"] {
            args_vec.push(flag.to_string());
            args_vec.push(threads.clone());
        }
        args_vec.push("--barcode-mismatches".to_string());
        args_vec.push(BCL2FASTQ_BARCODE_MISMATCHES.to_string());
        args_vec
    }
}

pub mod samtools {
    use anyhow::anyhow;
    use tokio::process::Command;
    use crate::config::defs::{SamtoolsSubcommand, SAMTOOLS_TAG};
    use crate::utils::system::{read_child_output_to_vec, ChildStream};

    #[derive(Debug)]
    pub struct SamtoolsConfig {
        pub subcommand: SamtoolsSubcommand,
        pub subcommand_fields: Vec<String>,
    }

    pub async fn samtools_presence_check() -> anyhow::Result<String> {
        let args: Vec<&str> = vec!["--version"];

        let mut child = Command::new(SAMTOOLS_TAG)
            .args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn: {}. Is samtools installed?", e))?;

        let lines = read_child_output_to_vec(&mut child, ChildStream::Stdout).await?;
        let first_line = lines
            .first()
            .ok_or_else(|| anyhow!("No output from samtools --version"))?;
        let version = first_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("Invalid samtools --version output: {}", first_line))?
            .to_string();
        Ok(version)
    }

    pub fn arg_generator(config: &SamtoolsConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        match config.subcommand {
            SamtoolsSubcommand::View => args_vec.push("view".to_string()),
        }
        args_vec.extend(config.subcommand_fields.iter().cloned());
        args_vec
    }
}

pub mod fastq_validator {
    use std::path::Path;

    pub fn arg_generator(fastq: &Path) -> Vec<String> {
        vec!["--noeof".to_string(), "--file".to_string(), fastq.display().to_string()]
    }
}

/// ssh, scp, rsync and cp invocations against the sequencer host.
pub mod remote {
    use std::borrow::Cow;

    pub fn quote(path: &str) -> String {
        shell_escape::escape(Cow::from(path)).into_owned()
    }

    pub fn ssh_test_file_args(host: &str, path: &str) -> Vec<String> {
        vec![host.to_string(), format!("test -f {}", quote(path))]
    }

    pub fn ssh_remove_file_args(host: &str, path: &str) -> Vec<String> {
        vec![host.to_string(), format!("rm {}", quote(path))]
    }

    pub fn scp_args(host: &str, remote_path: &str, local_path: &str) -> Vec<String> {
        vec![format!("{}:{}", host, quote(remote_path)), local_path.to_string()]
    }

    pub fn rsync_args(host: &str, remote_dir: &str, local_dir: &str) -> Vec<String> {
        vec!["-avh".to_string(), format!("{}:{}", host, remote_dir), local_dir.to_string()]
    }

    pub fn cp_args(source_dir: &str, dest_dir: &str) -> Vec<String> {
        vec!["-n".to_string(), "-R".to_string(), source_dir.to_string(), dest_dir.to_string()]
    }
}


/// Builds the command for a tool whose arguments depend on a single path.
///
/// # Arguments
/// * `tool` - Tool tag from config::defs.
/// * `binary` - Executable to run; defaults to the tool tag.
/// * `path` - File the tool operates on.
pub fn generate_cli(tool: &str, binary: Option<&str>, path: &Path) -> Result<ExternalCommand> {
    let args = match tool {
        FASTQ_VALIDATOR_TAG => fastq_validator::arg_generator(path),
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };
    Ok(ExternalCommand::new(binary.unwrap_or(tool)).args(args))
}

pub fn bcl2fastq_command(binary: &str, config: &bcl2fastq::Bcl2FastqConfig) -> ExternalCommand {
    ExternalCommand::new(binary).args(bcl2fastq::arg_generator(config))
}

pub fn samtools_command(config: &samtools::SamtoolsConfig) -> ExternalCommand {
    ExternalCommand::new(SAMTOOLS_TAG).args(samtools::arg_generator(config))
}

pub fn ssh_test_file(host: &str, path: &str) -> ExternalCommand {
    ExternalCommand::new(SSH_TAG).args(remote::ssh_test_file_args(host, path))
}

pub fn ssh_remove_file(host: &str, path: &str) -> ExternalCommand {
    ExternalCommand::new(SSH_TAG).args(remote::ssh_remove_file_args(host, path))
}

pub fn scp(host: &str, remote_path: &str, local_path: &str) -> ExternalCommand {
    ExternalCommand::new(SCP_TAG).args(remote::scp_args(host, remote_path, local_path))
}

pub fn rsync(host: &str, remote_dir: &str, local_dir: &str) -> ExternalCommand {
    ExternalCommand::new(RSYNC_TAG).args(remote::rsync_args(host, remote_dir, local_dir))
}

pub fn cp_no_clobber(source_dir: &str, dest_dir: &str) -> ExternalCommand {
    ExternalCommand::new(CP_TAG).args(remote::cp_args(source_dir, dest_dir))
}

pub async fn check_version(tool: &str) -> Result<String> {
    let version = match tool {
        SAMTOOLS_TAG => samtools::samtools_presence_check().await,
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };
    Ok(version?)
}
