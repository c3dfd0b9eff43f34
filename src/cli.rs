// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "inbox_harvest", version, about = "Download recent Gmail attachments to disk")]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true, default_value = ".config/harvest.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the mailbox once (or on a timer) and save new attachments
    Process {
        /// Repeat every N seconds instead of exiting
        #[arg(long, value_name = "SECONDS")]
        every: Option<u64>,

        /// Pull invoice and order numbers out of downloaded PDFs
        #[arg(long)]
        extract: bool,
    },
    /// Readiness report as JSON
    Status,
    /// Downloaded files, newest first
    Files,
    /// Effective settings, without secrets
    Config,
    /// Extract invoice and order numbers from one PDF
    ExtractInvoice { path: PathBuf },
}
