use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use log::{info, warn};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use shelfsync::config::load_config;
use shelfsync::db::account_repo;
use shelfsync::store::{register_account, JobStore};
use shelfsync::{
    telemetry, AppConfig, CleanupSweeper, Credential, Database, DriveUploader, EpubConverter,
    Intake, JobProcessor, JobStatus, NewAccount, OAuthCredential, QueueWorker, RetryPolicy,
    Result, TempWorkspace, WorkerError,
};

/// Queue-driven EPUB to kepub conversion with upload to Drive folders
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "SHELFSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the queue worker and the cleanup sweeper until Ctrl-C
    Serve,
    /// Manage storage accounts
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
    /// Stage EPUB files and queue them for an account
    Enqueue {
        #[arg(long)]
        account: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print recent jobs as JSON, newest first
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print one job as JSON
    Job { id: String },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Register an account bound to a Drive folder
    #[command(group(ArgGroup::new("credential").required(true).args(["access_token", "service_token"])))]
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        folder_id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, requires = "expires_at")]
        access_token: Option<String>,
        #[arg(long, requires = "access_token")]
        refresh_token: Option<String>,
        /// Access token expiry (RFC 3339)
        #[arg(long, requires = "access_token")]
        expires_at: Option<DateTime<Utc>>,
        #[arg(long)]
        service_token: Option<String>,
    },
    /// List registered accounts
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    telemetry::init_tracing(config.log_format)?;

    match cli.command {
        Command::Serve => serve(&config),
        Command::Account { action } => account(&config, action),
        Command::Enqueue { account, files } => enqueue(&config, &account, &files),
        Command::Jobs { limit } => {
            let intake = open_intake(&config)?;
            print_json(&intake.recent_jobs(limit)?)
        }
        Command::Job { id } => {
            let intake = open_intake(&config)?;
            print_json(&intake.job(&id)?)
        }
    }
}

fn serve(config: &AppConfig) -> Result<()> {
    info!("Starting shelfsync v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.database_path)?;
    let store: Arc<dyn JobStore> = Arc::new(db);

    let orphaned = store.count_by_status(JobStatus::Processing)?;
    if orphaned > 0 {
        warn!(
            "{} job(s) were left in processing by a previous run and will not be resumed",
            orphaned
        );
    }

    let workspace = TempWorkspace::new(&config.temp_directory);
    if let Err(e) = workspace.ensure_root() {
        warn!(
            "Cannot create temp directory {}: {}",
            config.temp_directory.display(),
            e
        );
    }

    let uploader = Arc::new(DriveUploader::from_config(&config.drive, Arc::clone(&store))?);
    let processor = Arc::new(JobProcessor::new(
        Arc::clone(&store),
        Arc::new(EpubConverter::new()),
        uploader,
        workspace.clone(),
        RetryPolicy::new(config.persist_attempts, config.persist_backoff()),
    ));

    let cancel = CancellationToken::new();
    let worker = QueueWorker::new(store, processor).spawn(config.poll_interval(), cancel.clone())?;
    let sweeper = CleanupSweeper::new(workspace, config.stale_after())
        .spawn(config.cleanup_interval(), cancel.clone())?;

    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown requested, waiting for the current job to finish");
        on_signal.cancel();
    })
    .map_err(|e| WorkerError::Signal(e.to_string()))?;

    info!(
        "Polling every {}s, sweeping {} every {}s",
        config.poll_interval_secs,
        config.temp_directory.display(),
        config.cleanup_interval_secs
    );

    worker
        .join()
        .map_err(|_| WorkerError::Panicked("queue-worker".to_string()))?;
    sweeper
        .join()
        .map_err(|_| WorkerError::Panicked("cleanup-sweeper".to_string()))?;

    info!("Shutdown complete");
    Ok(())
}

fn account(config: &AppConfig, action: AccountCommand) -> Result<()> {
    let db = Database::open(&config.database_path)?;

    match action {
        AccountCommand::Add {
            name,
            folder_id,
            email,
            access_token,
            refresh_token,
            expires_at,
            service_token,
        } => {
            let credential = match (service_token, access_token, expires_at) {
                (Some(token), None, _) => Credential::ServiceToken(SecretString::from(token)),
                (None, Some(access), Some(expires_at)) => Credential::OAuth(OAuthCredential {
                    access_token: SecretString::from(access),
                    refresh_token: refresh_token.map(SecretString::from),
                    expires_at,
                }),
                _ => Cli::command()
                    .error(
                        clap::error::ErrorKind::ArgumentConflict,
                        "pass either --service-token or --access-token with --expires-at",
                    )
                    .exit(),
            };

            let account = register_account(
                &db,
                &NewAccount {
                    name,
                    folder_id,
                    credential,
                    user_email: email,
                },
            )?;
            info!("Registered account {} ({})", account.name, account.id);
            print_json(&account.summary())
        }
        AccountCommand::List => {
            let summaries: Vec<_> = account_repo::list(&db)?
                .iter()
                .map(|a| a.summary())
                .collect();
            print_json(&summaries)
        }
    }
}

fn enqueue(config: &AppConfig, account: &str, files: &[PathBuf]) -> Result<()> {
    let intake = open_intake(config)?;
    let mut jobs = Vec::with_capacity(files.len());
    for file in files {
        jobs.push(intake.enqueue(account, Path::new(file))?);
    }
    print_json(&jobs)
}

fn open_intake(config: &AppConfig) -> Result<Intake> {
    let db = Database::open(&config.database_path)?;
    Ok(Intake::new(db, TempWorkspace::new(&config.temp_directory)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
