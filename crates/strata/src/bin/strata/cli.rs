//! strata cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

/// Config directory used when none is given and the work directory has no `common.yaml`
pub const SYSTEM_CONFIG_DIR: &str = "/etc/strata";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; strata ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    /// Log debug output
    ///
    /// Raises the level set by STRATA_LOG
    #[clap(short = 'v', long = "verbose", global(true))]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve an environment and write its files
    Deploy(DeployCommand),

    /// Print the resolved specs of an environment without writing anything
    Specs(SpecsCommand),

    /// List all known environments
    #[command(alias = "envs")]
    Environments(EnvironmentsCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config directory
    ///
    /// Defaults to the work directory if it contains common.yaml, /etc/strata otherwise
    #[clap(short = 'd', long = "config-dir")]
    pub config_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn config_dir(&self) -> PathBuf {
        if let Some(config_dir) = &self.config_dir {
            return config_dir.clone();
        }

        let workdir = PathBuf::from(".");
        if workdir.join(strata::config::CONFIG_FILE).is_file() {
            workdir
        } else {
            PathBuf::from(SYSTEM_CONFIG_DIR)
        }
    }
}

#[derive(Parser, Debug)]
pub struct DeployCommand {
    #[clap(flatten)]
    pub config: ConfigArgs,

    /// Write every target below this directory instead of its own path
    #[clap(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Environment to deploy, defaults to default_environment of the config
    pub environment: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SpecsCommand {
    #[clap(flatten)]
    pub config: ConfigArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Environment to resolve, defaults to default_environment of the config
    pub environment: Option<String>,
}

#[derive(Parser, Debug)]
pub struct EnvironmentsCommand {
    #[clap(flatten)]
    pub config: ConfigArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Templates known to each source and where they are read from
    Templates,
    /// Everything each source ingested, in order
    History,
}
