// src/main.rs

mod auth;
mod cli;
mod config;
mod error;
mod extractor;
mod gmail_source;
mod heuristics;
mod inventory;
mod invoice;
mod llm_extract;
mod message;
mod naming;
mod pdf_text;
mod processor;
mod source;
mod store;

use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::Config;
use error::HarvestError;
use gmail_source::GmailSource;
use llm_extract::LlmClient;
use processor::ProcessingResult;
use store::RunStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // init tracing; stdout is reserved for JSON reports
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let cli = Cli::parse();

    match cli.command {
        Command::Process { every, extract } => run_process(&cli.config, every, extract).await?,
        Command::Status => {
            let cfg = Config::load(&cli.config)?;
            let store = open_store(&cfg)?;
            let last_run = store.latest_run()?;
            let files = match &last_run {
                Some(run) => store.downloads_for_run(run.id)?,
                None => Vec::new(),
            };
            print_json(&inventory::status(&cfg, last_run, files))?;
        }
        Command::Files => {
            let cfg = Config::load(&cli.config)?;
            print_json(&inventory::list_files(&cfg.mailbox.data_dir)?)?;
        }
        Command::Config => {
            let cfg = Config::load(&cli.config)?;
            print_json(&inventory::config_report(&cfg))?;
        }
        Command::ExtractInvoice { path } => {
            let cfg = Config::load(&cli.config)?;
            let store = open_store(&cfg)?;

            let previous = store.extractions_for_path(&path)?;
            if let Some(last) = previous.first() {
                info!(
                    runs = previous.len(),
                    invoice_number = ?last.invoice_number,
                    method = %last.method,
                    "File was extracted before"
                );
            }

            let details = invoice::run_workflow(&path, &cfg.llm).await?;
            store.record_extraction(&path, &details.refs, &details.method.to_string())?;
            print_json(&details)?;
        }
    }

    Ok(())
}

async fn run_process(
    config_path: &Path,
    every: Option<u64>,
    extract: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load(config_path)?;
    let store = open_store(&cfg)?;
    let refresh = std::env::var("REFRESH").is_ok_and(|v| v == "1");

    let hub = match auth::create_hub(&cfg, config_path, refresh).await {
        Ok(hub) => hub,
        Err(e) => {
            error!(error = %e, "Gmail authentication failed");
            let result = ProcessingResult::failed(
                "Failed to authenticate with Gmail API",
                &e,
                Vec::new(),
                0,
            );
            store.record_run(&result)?;
            print_json(&result)?;
            return Err(e.into());
        }
    };

    let source = GmailSource::new(hub, cfg.mailbox.user.clone());
    if let Err(e) = source
        .check_account(cfg.mailbox.target_email.as_deref())
        .await
    {
        warn!(error = %e, "Could not confirm the authenticated account");
    }

    let llm = if extract {
        match LlmClient::from_config(&cfg.llm) {
            Ok(Some(client)) => {
                info!(model = client.model(), "Invoice extraction via LLM");
                Some(client)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "LLM unavailable, using heuristics only");
                None
            }
        }
    } else {
        None
    };

    loop {
        let result = processor::process_new_emails(&source, &cfg.mailbox).await;
        store.record_run(&result)?;

        if extract {
            for path in invoice::pdf_paths(result.files_downloaded()) {
                match invoice::process_file(llm.as_ref(), path).await {
                    Ok(details) => {
                        store.record_extraction(path, &details.refs, &details.method.to_string())?;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Invoice extraction failed"),
                }
            }
        }

        print_json(&result)?;

        let (runs, successful, downloads, extractions) = store.get_counts()?;
        info!(
            runs_total = runs,
            runs_successful = successful,
            downloads_total = downloads,
            extractions_total = extractions,
            "Ledger statistics"
        );

        match every {
            Some(secs) => {
                info!(seconds = secs, "Sleeping until next check");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            None => break,
        }
    }

    Ok(())
}

fn open_store(cfg: &Config) -> error::Result<RunStore> {
    let db_path = Path::new(&cfg.db_path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HarvestError::fs(parent, e))?;
    }
    Ok(RunStore::new(db_path)?)
}

fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
