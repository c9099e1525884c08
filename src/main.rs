// src/main.rs

//! sitewatch: Website Change Monitor CLI
//!
//! Registers pages for monitoring, extracts files on demand, and runs the
//! scheduler loop that polls every tracked target.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use sitewatch::error::{AppError, Result};
use sitewatch::models::{Config, Subject};
use sitewatch::monitor::{JobScheduler, MonitorEngine, SystemClock};
use sitewatch::services::{
    AccessPolicy, DirNotifier, FileFetcher, HttpFileFetcher, HttpPageFetcher, Notifier,
    PageFetcher, SubjectAllowList,
};
use sitewatch::storage::{JsonStore, TrackingStore};
use sitewatch::utils::http::create_async_client;

#[derive(Parser, Debug)]
#[command(
    name = "sitewatch",
    version = "0.1.0",
    about = "Website change monitor with file forwarding"
)]

/// CLI Arguments
struct Cli {
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

/// CLI Commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Start tracking a URL for a subject
    Track {
        subject: String,
        url: String,
        /// Polling interval in minutes
        #[arg(default_value_t = 30)]
        interval: u64,
        /// Suppress polls outside the daytime window
        #[arg(long)]
        quiet: bool,
    },
    /// Stop tracking a URL
    Untrack { subject: String, url: String },
    /// List tracked URLs for a subject
    List { subject: String },
    /// One-shot file extraction without tracking
    Documents { url: String },
    /// Restore persisted jobs and poll until interrupted
    Watch,
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.logging.level),
    )
    .init();

    config.validate()?;

    let client = create_async_client(&config.fetch)?;
    let store: Arc<dyn TrackingStore> = Arc::new(JsonStore::new(&config.storage.data_dir));
    let pages: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(client.clone()));
    let files: Arc<dyn FileFetcher> = Arc::new(HttpFileFetcher::new(
        client,
        config.monitor.max_file_bytes,
        &config.monitor.download_dir,
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(DirNotifier::new(&config.storage.outbox_dir));

    let engine = Arc::new(MonitorEngine::new(
        Arc::clone(&store),
        pages,
        files,
        notifier,
    ));
    let scheduler = JobScheduler::new(
        Arc::clone(&store),
        Arc::new(SystemClock),
        Arc::clone(&engine) as Arc<dyn sitewatch::monitor::PollHandler>,
        config.scheduler.clone(),
    );
    let policy = SubjectAllowList::new(&config.authorized_subjects);

    match cli.command {
        Command::Track {
            subject,
            url,
            interval,
            quiet,
        } => {
            let subject = authorize(&policy, subject)?;
            let effective = scheduler.track(&subject, &url, interval, quiet).await?;
            println!("Now tracking {url} every {effective} minutes");
        }
        Command::Untrack { subject, url } => {
            let subject = authorize(&policy, subject)?;
            if scheduler.untrack(&subject, &url).await? {
                println!("Stopped tracking {url}");
            } else {
                println!("Not tracking {url}");
            }
        }
        Command::List { subject } => {
            let subject = authorize(&policy, subject)?;
            let targets = store.list_by_subject(&subject).await?;
            if targets.is_empty() {
                println!("No tracked URLs.");
            } else {
                println!("Tracked URLs:");
                for (url, target) in targets {
                    println!(
                        "{}",
                        target.format(&url, "{url} (every {interval} mins, quiet hours: {quiet})")
                    );
                }
            }
        }
        Command::Documents { url } => {
            let found = engine.extract_once(&url).await?;
            if found.is_empty() {
                println!("No files found on this website.");
            } else {
                println!("Files found:");
                for file in found {
                    println!("{} ({}): {}", file.name, file.kind, file.url);
                }
            }
        }
        Command::Watch => {
            let armed = scheduler.restore().await?;
            log::info!("watching {armed} target(s); press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown().await;
            log::info!("scheduler stopped");
        }
    }

    Ok(())
}

/// Gate a command behind the configured access policy.
fn authorize(policy: &SubjectAllowList, subject: String) -> Result<Subject> {
    let subject = Subject::new(subject);
    if !policy.is_authorized(&subject) {
        return Err(AppError::validation(format!(
            "subject {subject} is not authorized"
        )));
    }
    Ok(subject)
}
