// ABOUTME: CLI entry point for sheet-sync
// ABOUTME: Parses commands, layers flags over the config file, and routes to handlers

use clap::{Args, Parser, Subcommand};
use sheet_sync::commands::{self, RunOptions};
use sheet_sync::config::{load_config_from_file, SyncConfig};
use sheet_sync::sync::Row;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheet-sync")]
#[command(about = "Bidirectional sync between a PostgreSQL table and a Google Sheets range", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a sheet-sync TOML config file
    #[arg(long, global = true, env = "SHEET_SYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values that may also come from the config file.
#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    /// PostgreSQL connection string
    #[arg(long = "database-url", env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    /// Schema of the synced table
    #[arg(long, global = true)]
    schema: Option<String>,
    /// Name of the synced table
    #[arg(long, global = true)]
    table: Option<String>,
    /// Change notification channel
    #[arg(long, global = true)]
    channel: Option<String>,
    /// Google spreadsheet id
    #[arg(long = "spreadsheet-id", env = "SPREADSHEET_ID", global = true)]
    spreadsheet_id: Option<String>,
    /// A1 range holding the rows (e.g. Sheet1!A2:D)
    #[arg(long, env = "SHEET_RANGE", global = true)]
    range: Option<String>,
    /// OAuth access token for the Sheets API
    #[arg(long = "sheets-token", env = "GOOGLE_SHEETS_TOKEN", global = true, hide_env_values = true)]
    sheets_token: Option<String>,
    /// Base URL of the Sheets API
    #[arg(long = "sheets-api", global = true)]
    sheets_api_base: Option<String>,
    /// Where to keep the last known sheet snapshot
    #[arg(long = "state-file", global = true)]
    state_file: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct RowArgs {
    /// Row id (first column)
    #[arg(long)]
    id: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    age: String,
    #[arg(long, default_value = "")]
    email: String,
}

impl RowArgs {
    fn into_row(self) -> Row {
        Row::new(self.id, self.name, self.age, self.email)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the synced table and the change notification trigger
    Init,
    /// Run the sync daemon: poll the sheet on a timer, push on store changes
    Run {
        /// Poll the sheet once and exit
        #[arg(long)]
        once: bool,
        /// Seconds between sheet polls
        #[arg(long = "poll-interval-seconds")]
        poll_interval_seconds: Option<u64>,
        /// Do not listen for store change notifications
        #[arg(long)]
        no_listen: bool,
    },
    /// Apply sheet edits to the store once
    Sync,
    /// Overwrite the sheet with the store once
    Push,
    /// Insert a row, then push to the sheet
    Create(RowArgs),
    /// Update a row by id, then push to the sheet
    Update(RowArgs),
    /// Delete a row by id, then push to the sheet
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Show the persisted sheet snapshot state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log when set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    sheet_sync::postgres::init_tls_policy(cli.allow_self_signed_certs);

    let mut config = match cli.config {
        Some(ref path) => load_config_from_file(path)?,
        None => SyncConfig::default(),
    };
    apply_overrides(&mut config, cli.connection);

    match cli.command {
        Commands::Init => commands::init(&config).await,
        Commands::Run {
            once,
            poll_interval_seconds,
            no_listen,
        } => {
            if let Some(seconds) = poll_interval_seconds {
                config.poll_interval_seconds = seconds;
            }
            commands::run(
                &config,
                RunOptions {
                    once,
                    listen: !no_listen,
                },
            )
            .await
        }
        Commands::Sync => commands::sync(&config).await,
        Commands::Push => commands::push(&config).await,
        Commands::Create(row) => commands::create(&config, row.into_row()).await,
        Commands::Update(row) => commands::update(&config, row.into_row()).await,
        Commands::Delete { id } => commands::delete(&config, &id).await,
        Commands::Status => commands::status(&config).await,
    }
}

fn apply_overrides(config: &mut SyncConfig, args: ConnectionArgs) {
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }
    if let Some(schema) = args.schema {
        config.schema = schema;
    }
    if let Some(table) = args.table {
        config.table = table;
    }
    if let Some(channel) = args.channel {
        config.channel = channel;
    }
    if args.spreadsheet_id.is_some() {
        config.spreadsheet_id = args.spreadsheet_id;
    }
    if let Some(range) = args.range {
        config.range = range;
    }
    if args.sheets_token.is_some() {
        config.sheets_token = args.sheets_token;
    }
    if let Some(base) = args.sheets_api_base {
        config.sheets_api_base = base;
    }
    if args.state_file.is_some() {
        config.state_file = args.state_file;
    }
}
