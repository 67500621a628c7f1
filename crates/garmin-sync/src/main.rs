use std::path::PathBuf;

use chrono::{Datelike, Days, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use garmin_sync::client::{GarminClient, TokenStore};
use garmin_sync::config::SyncProfile;
use garmin_sync::error::{Result, SyncError};
use garmin_sync::store::CsvFolderStore;
use garmin_sync::sync::{self, SyncOptions};

/// Days covered by a sync when no window is given.
const DEFAULT_WINDOW_DAYS: u64 = 7;

#[derive(Parser)]
#[command(name = "garmin-sync")]
#[command(author, version, about = "Sync Garmin Connect daily health metrics into tab stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Profile to use
    #[arg(short, long, global = true, env = "GARMIN_SYNC_PROFILE")]
    profile: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a window of days (default: the last 7)
    Sync {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<String>,
        /// Output folder (overrides the profile setting)
        #[arg(short, long)]
        output: Option<String>,
        /// Skip retention pruning after dispatch
        #[arg(long)]
        no_prune: bool,
    },
    /// Recompute monthly averages from stored daily rows
    Monthly {
        /// Month (YYYY-MM), defaults to the current month
        #[arg(long)]
        month: Option<String>,
        /// Recompute every month from --month up to this one (YYYY-MM)
        #[arg(long)]
        to_month: Option<String>,
        /// Output folder (overrides the profile setting)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Authentication commands
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Drop rows older than the retention windows
    Prune {
        /// Output folder (overrides the profile setting)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Show authentication status
    Status,
    /// Clear the stored token
    Logout,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("garmin_sync=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync {
            from,
            to,
            output,
            no_prune,
        } => run_sync(cli.profile, from, to, output, no_prune).await,
        Commands::Monthly {
            month,
            to_month,
            output,
        } => run_monthly(cli.profile, month, to_month, output),
        Commands::Auth { command } => match command {
            AuthCommands::Status => auth_status(cli.profile),
            AuthCommands::Logout => auth_logout(cli.profile),
        },
        Commands::Prune { output } => run_prune(cli.profile, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn profile_name(profile: &Option<String>) -> &str {
    profile.as_deref().unwrap_or("default")
}

fn open_store(profile: &SyncProfile, output: Option<String>) -> Result<CsvFolderStore> {
    let dir = output
        .map(PathBuf::from)
        .unwrap_or_else(|| profile.output_dir.clone());
    CsvFolderStore::open(dir)
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| SyncError::InvalidDateFormat(raw.to_string()))
}

fn parse_month(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d")
        .map_err(|_| SyncError::InvalidDateFormat(raw.to_string()))
}

async fn run_sync(
    profile: Option<String>,
    from: Option<String>,
    to: Option<String>,
    output: Option<String>,
    no_prune: bool,
) -> Result<()> {
    let settings = SyncProfile::load(profile_name(&profile))?;
    let tokens = TokenStore::new(profile)?;
    let token = tokens.require()?;

    let today = Local::now().date_naive();
    let to = to.as_deref().map(parse_date).transpose()?.unwrap_or(today);
    let from = match from.as_deref().map(parse_date).transpose()? {
        Some(d) => d,
        None => to
            .checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS - 1))
            .unwrap_or(to),
    };

    let client = GarminClient::new(&settings.domain)?;
    let mut store = open_store(&settings, output)?;

    let mut options = SyncOptions::window(from, to);
    options.today = today;
    options.health_retention_days = settings.health_retention_days;
    options.activity_retention_days = settings.activity_retention_days;
    options.prune = !no_prune;

    let stats = sync::run_sync(&client, &token, &mut store, &options).await?;

    println!("Synced {} day(s) into {}", stats.days_synced, store.dir().display());
    println!(
        "Rows: {} updated, {} appended, {} activities added",
        stats.rows_updated, stats.rows_appended, stats.activities_appended
    );
    if stats.days_degraded > 0 {
        println!("Degraded days (no data fetched): {}", stats.days_degraded);
    }
    if stats.tabs_failed > 0 {
        println!("Tabs that failed to update: {}", stats.tabs_failed);
    }
    if stats.rows_pruned > 0 {
        println!("Pruned {} row(s) past retention", stats.rows_pruned);
    }
    Ok(())
}

fn run_monthly(
    profile: Option<String>,
    month: Option<String>,
    to_month: Option<String>,
    output: Option<String>,
) -> Result<()> {
    let settings = SyncProfile::load(profile_name(&profile))?;
    let mut store = open_store(&settings, output)?;

    let first = match month.as_deref().map(parse_month).transpose()? {
        Some(m) => m,
        None => {
            let today = Local::now().date_naive();
            parse_month(&today.format("%Y-%m").to_string())?
        }
    };
    let last = to_month
        .as_deref()
        .map(parse_month)
        .transpose()?
        .unwrap_or(first);
    if first > last {
        return Err(SyncError::config("--month is after --to-month"));
    }

    let mut month = first;
    while month <= last {
        match sync::refresh_monthly(&mut store, month)? {
            Some(days) => println!("{}: averaged {} day(s)", month.format("%Y-%m"), days),
            None => println!("{}: no daily rows, skipped", month.format("%Y-%m")),
        }
        month = match month.checked_add_days(Days::new(32)).and_then(|d| d.with_day(1)) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(())
}

fn auth_status(profile: Option<String>) -> Result<()> {
    let tokens = TokenStore::new(profile)?;
    println!("Profile: {}", tokens.profile());
    match tokens.load()? {
        None => println!("No token stored. Provision one at {}", tokens.token_path().display()),
        Some(token) if token.is_expired() => {
            println!("Token present but expired. Refresh it before syncing.")
        }
        Some(_) => println!("Token present and valid."),
    }
    Ok(())
}

fn auth_logout(profile: Option<String>) -> Result<()> {
    let tokens = TokenStore::new(profile)?;
    tokens.clear()?;
    println!("Cleared token for profile '{}'", tokens.profile());
    Ok(())
}

fn run_prune(profile: Option<String>, output: Option<String>) -> Result<()> {
    let settings = SyncProfile::load(profile_name(&profile))?;
    let mut store = open_store(&settings, output)?;
    let removed = sync::prune_all(
        &mut store,
        Local::now().date_naive(),
        settings.health_retention_days,
        settings.activity_retention_days,
    )?;
    println!("Pruned {} row(s)", removed);
    Ok(())
}
