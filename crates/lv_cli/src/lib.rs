//! lv_cli - CLI commands for lvstat
//!
//! This crate provides:
//! - clap-based command definitions
//! - One-shot collection and domain listing
//! - Config inspection and scaffolding
//! - JSON-lines and text renderings of metrics

use clap::{Parser, Subcommand, ValueEnum};
use lv_collect::{Collector, LibvirtCollector, MemorySink, Metric};
use lv_config::LvConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// CLI errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Config error: {0}")]
    ConfigError(#[from] lv_config::ConfigError),

    #[error("Collect error: {0}")]
    CollectError(#[from] lv_collect::CollectError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Line-protocol style text
    Text,
}

/// Main CLI application
#[derive(Parser, Debug)]
#[command(name = "lvstat")]
#[command(author, version, about = "lvstat - per-domain libvirt statistics collector")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for commands
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one collection cycle and print the records
    Collect {
        /// libvirt connection URI (overrides config)
        #[arg(short, long)]
        uri: Option<String>,
    },

    /// List the domains known to the host
    List {
        /// libvirt connection URI (overrides config)
        #[arg(short, long)]
        uri: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Destination path
        #[arg(short, long, default_value = "lvstat.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config lookup paths
    Paths,
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> Result<(), CliError> {
        match &self.command {
            Commands::Collect { uri } => {
                let config = self.effective_config(uri.as_deref())?;
                let collector = LibvirtCollector::from_config(&config);
                if !collector.check_availability().await {
                    return Err(CliError::CommandFailed(format!(
                        "{} is not available",
                        config.libvirt.virsh_path
                    )));
                }

                let sink = MemorySink::new();
                let report = collector.collect(&sink).await?;
                for line in render_metrics(&sink.metrics(), self.format)? {
                    println!("{line}");
                }

                if !report.is_complete() {
                    for failure in &report.failures {
                        warn!(domain = %failure.domain, error = %failure.error, "Domain skipped");
                    }
                    return Err(CliError::CommandFailed(format!(
                        "{} of {} domains failed",
                        report.failures.len(),
                        report.domains
                    )));
                }
            }
            Commands::List { uri } => {
                let config = self.effective_config(uri.as_deref())?;
                let collector = LibvirtCollector::from_config(&config);
                let domains = collector.list_domains().await?;
                print!("{}", render_domains(&domains, self.format)?);
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    let config = self.effective_config(None)?;
                    match self.format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&config)?);
                        }
                        OutputFormat::Text => {
                            let text = toml::to_string_pretty(&config).map_err(|e| {
                                CliError::CommandFailed(format!("Failed to render config: {e}"))
                            })?;
                            print!("{text}");
                        }
                    }
                }
                ConfigCommands::Init { path, force } => {
                    write_default_config(path, *force)?;
                    println!("Wrote {}", path.display());
                }
                ConfigCommands::Paths => {
                    for path in LvConfig::config_paths() {
                        let marker = if path.is_file() { "found" } else { "missing" };
                        println!("{} ({marker})", path.display());
                    }
                }
            },
        }

        Ok(())
    }

    /// Config from `--config` or discovery, env overrides, then `--uri`
    fn effective_config(&self, uri: Option<&str>) -> Result<LvConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => LvConfig::load_with_env(path)?,
            None => LvConfig::discover_with_env()?,
        };
        if let Some(uri) = uri {
            config.libvirt.uri = uri.to_string();
            config.validate()?;
        }
        Ok(config)
    }
}

/// Render metrics one per line; text output skips metrics without fields
pub fn render_metrics(metrics: &[Metric], format: OutputFormat) -> Result<Vec<String>, CliError> {
    let mut lines = Vec::with_capacity(metrics.len());
    for metric in metrics {
        match format {
            OutputFormat::Json => lines.push(metric.to_json_line()?),
            OutputFormat::Text => match metric.to_line() {
                Some(line) => lines.push(line),
                None => debug!(tags = ?metric.tags, "Skipping metric without fields"),
            },
        }
    }
    Ok(lines)
}

/// Render a domain listing
pub fn render_domains(domains: &[String], format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string(domains)?)),
        OutputFormat::Text => Ok(domains.iter().map(|d| format!("{d}\n")).collect()),
    }
}

/// Write the default config, refusing to clobber unless `force`
pub fn write_default_config(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::CommandFailed(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, LvConfig::generate_default_toml())?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
