//! REST client for the notification endpoints used by polling, manual
//! refresh and read-state synchronisation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    Error, Notification, NotificationId, NotificationKind, NotificationStatus, Priority, Result,
    TokenSource,
};

/// Query parameters for `GET /notifications`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub kind: Option<NotificationKind>,
    pub status: Option<NotificationStatus>,
    pub priority: Option<Priority>,
    pub unread_only: bool,
    pub search: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            kind: None,
            status: None,
            priority: None,
            unread_only: false,
            search: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl ListQuery {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(kind) = &self.kind {
            params.push(("type", kind.as_str().to_string()));
        }
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            params.push(("priority", priority.as_str().to_string()));
        }
        if self.unread_only {
            params.push(("unread_only", "true".to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        params.push(("page", self.page.to_string()));
        params.push(("per_page", self.per_page.to_string()));
        params
    }
}

/// One page of the list endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub notifications: Vec<Notification>,
    pub has_next: bool,
    pub total: Option<u64>,
}

/// Body of `POST /notifications/clear`. Empty means "clear everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearFilter {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NotificationStatus>,
}

#[derive(Debug, Deserialize)]
struct UnreadCountResponse {
    success: bool,
    #[serde(default)]
    unread_count: u32,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    success: bool,
    #[serde(default)]
    notifications: Vec<Notification>,
    #[serde(default)]
    pagination: Pagination,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_next: bool,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Authenticated client for the notification REST API. Clone is a cheap Arc
/// refcount bump.
#[derive(Clone)]
pub struct NotificationApi {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
    get_token: TokenSource,
}

impl NotificationApi {
    pub fn new(base_url: &str, timeout: Duration, get_token: TokenSource) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                get_token,
            }),
        })
    }

    /// Build a bearer-authenticated request. `path` is appended to the base URL.
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = (self.inner.get_token)().ok_or(Error::NoCredential)?;
        let url = format!("{}{path}", self.inner.base_url);
        Ok(self.inner.client.request(method, url).bearer_auth(token))
    }

    /// `GET /notifications/unread-count`
    pub async fn unread_count(&self) -> Result<u32> {
        let resp = self
            .request(Method::GET, "/notifications/unread-count")?
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body: UnreadCountResponse = check_status(resp).await?.json().await?;
        if !body.success {
            return Err(envelope_error(status, "unread-count", body.message));
        }
        Ok(body.unread_count)
    }

    /// `GET /notifications?<filters>&page&per_page`
    pub async fn list(&self, query: &ListQuery) -> Result<ListPage> {
        let resp = self
            .request(Method::GET, "/notifications")?
            .query(&query.to_params())
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body: ListResponse = check_status(resp).await?.json().await?;
        if !body.success {
            return Err(envelope_error(status, "list", body.message));
        }
        debug!(
            count = body.notifications.len(),
            has_next = body.pagination.has_next,
            page = query.page,
            "fetched notification page"
        );
        Ok(ListPage {
            notifications: body.notifications,
            has_next: body.pagination.has_next,
            total: body.pagination.total,
        })
    }

    /// `POST /notifications/{id}/read`
    pub async fn mark_read(&self, id: NotificationId) -> Result<()> {
        let path = format!("/notifications/{id}/read");
        self.post_ack(&path, "mark-read", &serde_json::json!({}))
            .await
    }

    /// `POST /notifications/mark-all-read`
    pub async fn mark_all_read(&self) -> Result<()> {
        self.post_ack(
            "/notifications/mark-all-read",
            "mark-all-read",
            &serde_json::json!({}),
        )
        .await
    }

    /// `POST /notifications/clear`
    pub async fn clear(&self, filter: &ClearFilter) -> Result<()> {
        self.post_ack("/notifications/clear", "clear", filter).await
    }

    async fn post_ack(&self, path: &str, op: &str, body: &impl Serialize) -> Result<()> {
        let resp = self.request(Method::POST, path)?.json(body).send().await?;
        let status = resp.status().as_u16();
        let ack: AckResponse = check_status(resp).await?.json().await?;
        if !ack.success {
            return Err(envelope_error(status, op, ack.message));
        }
        Ok(())
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: body,
    })
}

fn envelope_error(status: u16, op: &str, message: Option<String>) -> Error {
    Error::Api {
        status,
        message: format!(
            "{op}: {}",
            message.unwrap_or_else(|| "request unsuccessful".to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_params() {
        let params = ListQuery::default().to_params();
        assert_eq!(
            params,
            vec![("page", "1".to_string()), ("per_page", "20".to_string())]
        );
    }

    #[test]
    fn filtered_query_params() {
        let query = ListQuery {
            kind: Some(NotificationKind::InApp),
            status: Some(NotificationStatus::Pending),
            priority: Some(Priority::High),
            unread_only: true,
            search: Some("invoice".to_string()),
            page: 3,
            per_page: 10,
        };
        let params = query.to_params();
        assert!(params.contains(&("type", "in_app".to_string())));
        assert!(params.contains(&("status", "pending".to_string())));
        assert!(params.contains(&("priority", "high".to_string())));
        assert!(params.contains(&("unread_only", "true".to_string())));
        assert!(params.contains(&("search", "invoice".to_string())));
        assert!(params.contains(&("page", "3".to_string())));
    }

    #[test]
    fn empty_search_is_omitted() {
        let query = ListQuery {
            search: Some(String::new()),
            ..Default::default()
        };
        assert!(query.to_params().iter().all(|(k, _)| *k != "search"));
    }

    #[test]
    fn clear_filter_body() {
        let all = serde_json::to_value(ClearFilter::default()).unwrap();
        assert_eq!(all, serde_json::json!({}));

        let filtered = serde_json::to_value(ClearFilter {
            kind: Some(NotificationKind::Email),
            status: Some(NotificationStatus::Delivered),
        })
        .unwrap();
        assert_eq!(
            filtered,
            serde_json::json!({"type": "email", "status": "delivered"})
        );
    }

    #[test]
    fn list_response_pagination_defaults() {
        let body: ListResponse =
            serde_json::from_str(r#"{"success": true, "notifications": []}"#).unwrap();
        assert!(!body.pagination.has_next);
        assert!(body.pagination.total.is_none());
    }

    #[test]
    fn request_without_token_fails_fast() {
        let api = NotificationApi::new(
            "http://localhost:1/api/",
            Duration::from_secs(1),
            Arc::new(|| None),
        )
        .unwrap();
        assert!(matches!(
            api.request(Method::GET, "/notifications"),
            Err(Error::NoCredential)
        ));
        assert_eq!(api.inner.base_url, "http://localhost:1/api");
    }
}
