//! One-shot REST subcommands.

use clap::{Args, ValueEnum};
use notify_realtime::{
    ClearFilter, ListQuery, Notification, NotificationApi, NotificationId, NotificationKind,
    NotificationStatus, Priority,
};

use crate::ClientArgs;
use crate::error::{WatchError, WatchResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Pending,
    Delivered,
    Failed,
}

impl From<StatusArg> for NotificationStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => NotificationStatus::Pending,
            StatusArg::Delivered => NotificationStatus::Delivered,
            StatusArg::Failed => NotificationStatus::Failed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
        }
    }
}

#[derive(Args)]
pub struct ListArgs {
    /// Notification type (email, sms, push, in_app, ...)
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,
    #[arg(long)]
    unread_only: bool,
    /// Search title and message
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    per_page: u32,
}

impl From<ListArgs> for ListQuery {
    fn from(args: ListArgs) -> Self {
        ListQuery {
            kind: args.kind.map(NotificationKind::from),
            status: args.status.map(Into::into),
            priority: args.priority.map(Into::into),
            unread_only: args.unread_only,
            search: args.search,
            page: args.page,
            per_page: args.per_page,
        }
    }
}

#[derive(Args)]
pub struct ClearArgs {
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
    /// Required when no filter is given
    #[arg(long)]
    all: bool,
}

/// Single-line rendering used by `list` and `watch`.
pub fn render(n: &Notification) -> String {
    let marker = if n.is_unread() { "*" } else { " " };
    let when = n
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{marker} #{} {when} [{}] {}: {}",
        n.id,
        n.priority.as_str(),
        n.kind,
        n.title
    );
    if !n.message.is_empty() {
        line.push_str(" - ");
        line.push_str(&n.message);
    }
    line
}

async fn api(client: &ClientArgs) -> WatchResult<NotificationApi> {
    let config = client.resolve().await?;
    Ok(NotificationApi::new(
        &config.realtime.api_base_url,
        config.realtime.request_timeout,
        client.token_source(),
    )?)
}

pub async fn run_unread(client: &ClientArgs) -> WatchResult<()> {
    let count = api(client).await?.unread_count().await?;
    println!("{count}");
    Ok(())
}

pub async fn run_list(client: &ClientArgs, args: ListArgs) -> WatchResult<()> {
    let query = ListQuery::from(args);
    let page = api(client).await?.list(&query).await?;
    for n in &page.notifications {
        println!("{}", render(n));
    }
    if page.has_next {
        println!("(more on page {})", query.page + 1);
    }
    Ok(())
}

pub async fn run_mark_read(client: &ClientArgs, id: NotificationId) -> WatchResult<()> {
    api(client).await?.mark_read(id).await?;
    Ok(())
}

pub async fn run_mark_all_read(client: &ClientArgs) -> WatchResult<()> {
    api(client).await?.mark_all_read().await?;
    Ok(())
}

pub async fn run_clear(client: &ClientArgs, args: ClearArgs) -> WatchResult<()> {
    let filter = ClearFilter {
        kind: args.kind.map(NotificationKind::from),
        status: args.status.map(Into::into),
    };
    if filter.kind.is_none() && filter.status.is_none() && !args.all {
        return Err(WatchError::Config(
            "clear without --type or --status needs --all".into(),
        ));
    }
    api(client).await?.clear(&filter).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(status: NotificationStatus, message: &str) -> Notification {
        Notification {
            id: 12,
            kind: NotificationKind::Email,
            title: "Invoice ready".to_string(),
            message: message.to_string(),
            priority: Priority::High,
            status,
            created_at: None,
        }
    }

    #[test]
    fn render_marks_unread() {
        assert_eq!(
            render(&notification(NotificationStatus::Pending, "March invoice")),
            "* #12 - [high] email: Invoice ready - March invoice"
        );
    }

    #[test]
    fn render_read_without_message() {
        assert_eq!(
            render(&notification(NotificationStatus::Delivered, "")),
            "  #12 - [high] email: Invoice ready"
        );
    }

    #[test]
    fn list_args_map_to_query() {
        let args = ListArgs {
            kind: Some("in-app".to_string()),
            status: Some(StatusArg::Pending),
            priority: None,
            unread_only: true,
            search: Some("invoice".to_string()),
            page: 2,
            per_page: 50,
        };
        let query = ListQuery::from(args);
        assert_eq!(query.kind, Some(NotificationKind::InApp));
        assert_eq!(query.status, Some(NotificationStatus::Pending));
        assert!(query.unread_only);
        assert_eq!(query.page, 2);
        assert_eq!(query.per_page, 50);
    }
}
