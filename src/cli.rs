//! CLI arguments and subcommands for bbs-discovery.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format for collected templates
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "bbs-discovery",
    about = "Cloud Foundry BBS state cache and auto-discovery config provider",
    long_about = "Cloud Foundry BBS state cache and auto-discovery config provider.\n\n\
                  Polls the BBS API for actual and desired LRPs, keeps the latest \
                  consistent snapshot in memory and extracts monitoring check templates \
                  from the AD_DATADOGHQ_COM environment variable of each app.",
    author = "Michael Moll <proc-mem@herakles.io> - Herakles IO",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// BBS API endpoint URL
    #[arg(long)]
    pub bbs_url: Option<String>,

    /// Only list LRPs of this BBS domain
    #[arg(long)]
    pub bbs_domain: Option<String>,

    /// Seconds between BBS refreshes
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Accept any BBS server certificate
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// Extra PEM root certificate for the BBS
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Path to JSON fixture file (serves records instead of querying the BBS)
    #[arg(short = 't', long)]
    pub fixture_file: Option<PathBuf>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable /metrics endpoint
    #[arg(long)]
    pub disable_telemetry: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh once and print the extracted config templates
    Collect {
        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Also print extraction errors
        #[arg(long)]
        errors: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Generate synthetic BBS fixture JSON file
    GenerateFixture {
        /// Output file path
        #[arg(short = 'o', long, default_value = "fixture.json")]
        output: PathBuf,

        /// Number of desired LRPs to generate
        #[arg(long, default_value_t = 10)]
        apps: usize,

        /// Actual LRPs per desired LRP
        #[arg(long, default_value_t = 2)]
        instances_per_app: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}
