//! Realtime notification delivery client.
//!
//! Keeps a push channel (WebSocket, JSON text frames) open to a notification
//! server and mirrors what arrives into a deduplicated local store.
//!
//! # Features
//! - Explicit connection state machine with a fixed-delay retry ceiling
//! - Application-level heartbeat while connected
//! - Topic subscriptions replayed on every reconnect
//! - REST polling once push has failed, stopped when push recovers
//! - Read/unread tracking where the unread count always equals the number of
//!   `pending` notifications
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), notify_realtime::Error> {
//! use std::sync::Arc;
//!
//! use notify_realtime::{Config, Event, NotificationClient};
//!
//! let config = Config {
//!     push_url: "wss://push.example.com/ws/notifications".to_string(),
//!     api_base_url: "https://api.example.com/api".to_string(),
//!     ..Default::default()
//! };
//! let get_token = Arc::new(|| std::env::var("NOTIFY_TOKEN").ok());
//!
//! let mut client = NotificationClient::start(config, get_token)?;
//! client.subscribe(["billing", "security"])?;
//! while let Some(event) = client.next().await {
//!     match event {
//!         Event::Notification(n) => println!("{}: {}", n.title, n.message),
//!         Event::StateChanged(state) => println!("push is {state}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
pub mod codec;
mod config;
mod connection;
mod heartbeat;
mod poll;
mod reconnect;
mod store;
mod subscriptions;
mod types;

pub use api::{ClearFilter, ListPage, ListQuery, NotificationApi};
pub use client::NotificationClient;
pub use config::Config;
pub use store::{NotificationFilter, NotificationStore, Page, Query, SharedStore};
pub use types::{
    ConnectionState, Error, ErrorKind, Event, Notification, NotificationId, NotificationKind,
    NotificationStatus, Priority, Result, TokenSource,
};
