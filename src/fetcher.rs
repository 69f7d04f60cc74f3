//! Remote fetcher abstraction
//!
//! The collector drives a `PageFetcher`; single-shot lookups (media-id
//! resolution, profile enrichment) go through `ProfileApi`. Both are
//! traits so the HTTP implementation can be swapped for a scripted one
//! in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::http_client::GraphHttpClient;
use crate::sources::profile::{parse_profile, LeadProfile, PROFILE_DOC_ID, PROFILE_FRIENDLY_NAME};
use crate::sources::{QueryDescriptor, SourceKind};

/// One page of raw entries from the remote service.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<Value>,
    pub has_next: bool,
    pub end_cursor: Option<String>,
}

/// Fetches one page of a collection stream.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, query: &QueryDescriptor, cursor: Option<&str>) -> Result<Page>;
}

/// Single-shot lookups against the remote service.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Resolves a post shortcode to its media id, if the post exists.
    async fn media_id(&self, shortcode: &str) -> Result<Option<String>>;

    /// Fetches profile attributes for a handle, if the account exists.
    async fn profile(&self, handle: &str) -> Result<Option<LeadProfile>>;
}

/// HTTP implementation speaking the GraphQL-style wire protocol.
pub struct GraphApiFetcher {
    client: Arc<GraphHttpClient>,
    base_url: String,
}

impl GraphApiFetcher {
    pub fn new(client: Arc<GraphHttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql/query", self.base_url)
    }

    /// Walks the response down to the source's connection object and
    /// splits it into entries plus pagination state.
    fn parse_page(source: SourceKind, body: &Value) -> Result<Page> {
        let mut connection = body;
        for key in source.connection_path() {
            connection = connection.get(key).ok_or_else(|| {
                HarvestError::Malformed(format!("missing '{}' in {} response", key, source))
            })?;
        }

        let entries = connection
            .get("edges")
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default();

        let page_info = connection.get("page_info").cloned().unwrap_or_default();
        let has_next = page_info
            .get("has_next_page")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let end_cursor = page_info
            .get("end_cursor")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(Page {
            entries,
            has_next,
            end_cursor,
        })
    }
}

#[async_trait]
impl PageFetcher for GraphApiFetcher {
    async fn fetch(&self, query: &QueryDescriptor, cursor: Option<&str>) -> Result<Page> {
        let form = [
            (
                "fb_api_req_friendly_name",
                query.source.friendly_name().to_string(),
            ),
            ("variables", query.variables(cursor).to_string()),
            ("doc_id", query.source.doc_id().to_string()),
        ];

        debug!(
            source = %query.source,
            subject = %query.subject,
            cursor = ?cursor,
            "Fetching page"
        );

        let body = self.client.post_form(&self.graphql_url(), &form, None).await?;
        Self::parse_page(query.source, &body)
    }
}

#[async_trait]
impl ProfileApi for GraphApiFetcher {
    async fn media_id(&self, shortcode: &str) -> Result<Option<String>> {
        let url = format!("{}/api/v1/media/shortcode/{}/info", self.base_url, shortcode);
        let body = self.client.get_json(&url, &[]).await?;

        let item = match body.get("items").and_then(|i| i.as_array()).and_then(|i| i.first()) {
            Some(item) => item,
            None => return Ok(None),
        };

        let media_id = match item.get("pk") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(media_id)
    }

    async fn profile(&self, handle: &str) -> Result<Option<LeadProfile>> {
        // Resolve the internal user id first; unknown accounts are a
        // skip, not an error.
        let info_url = format!("{}/api/v1/users/web_profile_info/", self.base_url);
        let body = self
            .client
            .get_json(&info_url, &[("username", handle.to_string())])
            .await?;

        let user_id = match body
            .pointer("/data/user/id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            Some(id) => id.to_string(),
            None => {
                debug!(handle = %handle, "No user id in profile info response");
                return Ok(None);
            }
        };

        let variables = serde_json::json!({
            "id": user_id,
            "render_surface": "PROFILE",
        });
        let form = [
            ("fb_api_req_friendly_name", PROFILE_FRIENDLY_NAME.to_string()),
            ("variables", variables.to_string()),
            ("doc_id", PROFILE_DOC_ID.to_string()),
        ];
        let referer = format!("{}/{}/", self.base_url, handle);
        let body = self
            .client
            .post_form(&self.graphql_url(), &form, Some(&referer))
            .await?;

        match body.pointer("/data/user") {
            Some(user) if !user.is_null() => Ok(Some(parse_profile(user))),
            _ => Ok(None),
        }
    }
}

/// Scripted outcome for one fetch call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Page(Page),
    Transient,
    Auth,
    Malformed,
}

/// Scripted fetcher for tests: replays a fixed sequence of outcomes.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<ScriptedResponse>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Convenience: pages only, last page terminates the stream.
    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self::new(pages.into_iter().map(ScriptedResponse::Page).collect())
    }

    fn next(&self) -> ScriptedResponse {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.script
            .lock()
            .pop_front()
            .unwrap_or(ScriptedResponse::Page(Page::default()))
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _query: &QueryDescriptor, _cursor: Option<&str>) -> Result<Page> {
        match self.next() {
            ScriptedResponse::Page(page) => Ok(page),
            ScriptedResponse::Transient => {
                Err(HarvestError::Transient("scripted failure".to_string()))
            }
            ScriptedResponse::Auth => Err(HarvestError::Auth("scripted rejection".to_string())),
            ScriptedResponse::Malformed => {
                Err(HarvestError::Malformed("scripted shape mismatch".to_string()))
            }
        }
    }
}
