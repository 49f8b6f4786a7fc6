mod config;
mod error;
mod inbox;
mod watch;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use notify_realtime::TokenSource;
use tracing_subscriber::fmt::time::FormatTime;

use crate::config::WatchConfig;
use crate::error::WatchResult;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "notify-watch", version)]
struct Cli {
    #[command(flatten)]
    client: ClientArgs,
    #[command(subcommand)]
    command: Command,
}

/// Connection settings shared by every subcommand.
#[derive(Args)]
pub struct ClientArgs {
    /// Path to notify-watch.yaml
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// Push endpoint URL (overrides config)
    #[arg(long, env = "NOTIFY_PUSH_URL", global = true)]
    push_url: Option<String>,
    /// REST API base URL (overrides config)
    #[arg(long, env = "NOTIFY_API_URL", global = true)]
    api_url: Option<String>,
    /// Bearer token for push and REST
    #[arg(long, env = "NOTIFY_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
}

impl ClientArgs {
    /// Load the config file (if any) and apply overrides.
    pub async fn resolve(&self) -> WatchResult<WatchConfig> {
        let config = match &self.config {
            Some(path) => config::load(path).await?,
            None => WatchConfig::default(),
        };
        let config = config.with_overrides(self.push_url.clone(), self.api_url.clone());
        config.realtime.validate()?;
        Ok(config)
    }

    pub fn token_source(&self) -> TokenSource {
        let token = self.token.clone().filter(|t| !t.is_empty());
        Arc::new(move || token.clone())
    }
}

#[derive(Subcommand)]
enum Command {
    /// Stream notifications until interrupted
    Watch(watch::WatchArgs),
    /// Print the server-side unread count
    Unread,
    /// List one page of notifications
    List(inbox::ListArgs),
    /// Mark one notification read
    MarkRead {
        id: notify_realtime::NotificationId,
    },
    /// Mark every notification read
    MarkAllRead,
    /// Delete notifications matching a filter
    Clear(inbox::ClearArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Watch(args) => watch::run_watch(&cli.client, args).await,
        Command::Unread => inbox::run_unread(&cli.client).await,
        Command::List(args) => inbox::run_list(&cli.client, args).await,
        Command::MarkRead { id } => inbox::run_mark_read(&cli.client, id).await,
        Command::MarkAllRead => inbox::run_mark_all_read(&cli.client).await,
        Command::Clear(args) => inbox::run_clear(&cli.client, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
