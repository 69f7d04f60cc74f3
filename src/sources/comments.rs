//! Post comments source

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{str_field, u64_field, QueryDescriptor, SourceKind};

pub const PAGE_SIZE: u32 = 20;
pub const SORT_ORDER: &str = "popular";

/// One comment, reduced to the whitelisted fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentRecord {
    pub media_id: String,
    pub username: String,
    pub text: String,
    pub likes: u64,
    pub created_at: u64,
}

pub fn descriptor(media_id: &str) -> QueryDescriptor {
    QueryDescriptor {
        source: SourceKind::Comments,
        subject: media_id.to_string(),
        page_size: PAGE_SIZE,
        sort: Some(SORT_ORDER),
    }
}

/// Normalizes a comment edge. Comments without a node are dropped;
/// missing fields take their defaults.
pub fn normalize(media_id: &str, entry: &Value) -> Option<CommentRecord> {
    let node = entry.get("node")?;
    let user = node.get("user").cloned().unwrap_or_default();
    Some(CommentRecord {
        media_id: media_id.to_string(),
        username: str_field(&user, "username"),
        text: str_field(node, "text"),
        likes: u64_field(node, "comment_like_count"),
        created_at: u64_field(node, "created_at"),
    })
}
