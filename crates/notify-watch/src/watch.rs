//! `watch`: keep a push session open and print what arrives.

use clap::Args;
use notify_realtime::{ConnectionState, ErrorKind, Event, NotificationClient};
use tracing::{info, warn};

use crate::ClientArgs;
use crate::error::WatchResult;
use crate::inbox::render;

#[derive(Args)]
pub struct WatchArgs {
    /// Topic to subscribe to (repeatable, added to the config's topics)
    #[arg(long = "topic")]
    topics: Vec<String>,
    /// Ask for this many recent notifications after each connect
    #[arg(long)]
    history: Option<u32>,
    /// Exit once push has failed instead of continuing on polling
    #[arg(long)]
    exit_on_failure: bool,
}

pub async fn run_watch(client_args: &ClientArgs, args: WatchArgs) -> WatchResult<()> {
    let config = client_args.resolve().await?;
    let mut topics = config.topics;
    topics.extend(args.topics);

    let mut client = NotificationClient::start(config.realtime, client_args.token_source())?;
    if !topics.is_empty() {
        info!(?topics, "subscribing");
        client.subscribe(topics)?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing");
                break;
            }
            event = client.next() => {
                let Some(event) = event else {
                    warn!("session ended");
                    break;
                };
                match event {
                    Event::Notification(n) => println!("{}", render(&n)),
                    Event::StateChanged(state) => {
                        info!(%state, "push state");
                        if state == ConnectionState::Connected {
                            if let Some(limit) = args.history {
                                if let Err(e) = client.request_history(limit).await {
                                    warn!(error = %e, "history request failed");
                                }
                            }
                        }
                    }
                    Event::UnreadCount(count) => info!(count, "unread count"),
                    Event::ServerStatus(status) => info!(%status, "server status"),
                    Event::Error { kind, message } => {
                        warn!(?kind, %message, "notification error");
                        if kind == ErrorKind::RetriesExhausted && args.exit_on_failure {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!(unread = client.unread_count(), "done");
    client.close();
    Ok(())
}
