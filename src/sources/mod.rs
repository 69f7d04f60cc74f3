//! Collection sources
//!
//! Each source module knows how to describe its remote query (doc id,
//! variables, pagination parameters) and how to normalize a raw page
//! entry into its record type. Only a fixed whitelist of fields is
//! retained per record; missing numerics default to 0 and missing text
//! to the empty string.

pub mod comments;
pub mod followers;
pub mod likers;
pub mod posts;
pub mod profile;

use serde_json::Value;

/// The collection streams the harvester understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Post shortcodes from a profile timeline
    Posts,
    /// Commenters on a media item
    Comments,
    /// Accounts that liked a media item
    Likers,
    /// Accounts following the subject
    Followers,
}

impl SourceKind {
    pub fn id(&self) -> &'static str {
        match self {
            SourceKind::Posts => "posts",
            SourceKind::Comments => "comments",
            SourceKind::Likers => "likers",
            SourceKind::Followers => "followers",
        }
    }

    pub fn doc_id(&self) -> &'static str {
        match self {
            SourceKind::Posts => "25461702053427256",
            SourceKind::Comments => "25060748103519434",
            SourceKind::Likers => "25086134797389861",
            SourceKind::Followers => "25248232871358254",
        }
    }

    pub fn friendly_name(&self) -> &'static str {
        match self {
            SourceKind::Posts => "PolarisProfilePostsQuery",
            SourceKind::Comments => "PolarisPostCommentsPaginationQuery",
            SourceKind::Likers => "PolarisPostLikersPaginationQuery",
            SourceKind::Followers => "PolarisProfileFollowersPaginationQuery",
        }
    }

    /// Path from the response root to the paginated connection object.
    pub fn connection_path(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Posts => &["data", "xdt_api__v1__feed__user_timeline_graphql_connection"],
            SourceKind::Comments => &[
                "data",
                "xdt_api__v1__media__media_id__comments__connection",
            ],
            SourceKind::Likers => &["data", "xdt_api__v1__media__media_id__likers__connection"],
            SourceKind::Followers => &["data", "xdt_api__v1__user__followers__connection"],
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Identifies one remote collection endpoint plus its fixed parameters.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub source: SourceKind,
    /// Subject identifier: username for posts/followers, media id for
    /// comments/likers.
    pub subject: String,
    pub page_size: u32,
    pub sort: Option<&'static str>,
}

impl QueryDescriptor {
    /// Builds the GraphQL variables payload for one page fetch.
    pub fn variables(&self, cursor: Option<&str>) -> Value {
        match self.source {
            SourceKind::Posts => {
                let mut vars = serde_json::json!({
                    "username": self.subject,
                    "first": self.page_size,
                    "data": { "count": self.page_size },
                });
                if let Some(after) = cursor {
                    vars["after"] = Value::String(after.to_string());
                }
                vars
            }
            SourceKind::Comments => serde_json::json!({
                "after": cursor,
                "before": null,
                "first": self.page_size,
                "last": null,
                "media_id": self.subject,
                "sort_order": self.sort.unwrap_or("popular"),
            }),
            SourceKind::Likers => serde_json::json!({
                "after": cursor,
                "first": self.page_size,
                "media_id": self.subject,
            }),
            SourceKind::Followers => serde_json::json!({
                "after": cursor,
                "first": self.page_size,
                "username": self.subject,
            }),
        }
    }
}

/// Extracts a text field, defaulting to the empty string.
pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Extracts a numeric count field, defaulting to 0.
pub fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Extracts a boolean field, defaulting to false.
pub fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}
