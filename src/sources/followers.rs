//! Followers source: yields handles of accounts following the subject.

use serde_json::Value;

use super::{QueryDescriptor, SourceKind};

pub const PAGE_SIZE: u32 = 50;

pub fn descriptor(username: &str) -> QueryDescriptor {
    QueryDescriptor {
        source: SourceKind::Followers,
        subject: username.to_string(),
        page_size: PAGE_SIZE,
        sort: None,
    }
}

pub fn normalize(entry: &Value) -> Option<String> {
    let username = entry.get("node")?.get("username")?.as_str()?;
    if username.is_empty() {
        return None;
    }
    Some(username.to_string())
}
