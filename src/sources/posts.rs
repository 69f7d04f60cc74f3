//! Profile timeline source: yields post shortcodes.

use serde_json::Value;

use super::{QueryDescriptor, SourceKind};

pub const PAGE_SIZE: u32 = 50;

pub fn descriptor(username: &str) -> QueryDescriptor {
    QueryDescriptor {
        source: SourceKind::Posts,
        subject: username.to_string(),
        page_size: PAGE_SIZE,
        sort: None,
    }
}

/// Pulls the shortcode out of a timeline edge.
pub fn normalize(entry: &Value) -> Option<String> {
    let code = entry.get("node")?.get("code")?.as_str()?;
    if code.is_empty() {
        return None;
    }
    Some(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_edge() {
        let edge = serde_json::json!({"node": {"code": "DQx1abc", "id": "9"}});
        assert_eq!(normalize(&edge), Some("DQx1abc".to_string()));
    }

    #[test]
    fn test_rejects_missing_or_empty_code() {
        assert_eq!(normalize(&serde_json::json!({"node": {}})), None);
        assert_eq!(normalize(&serde_json::json!({"node": {"code": ""}})), None);
        assert_eq!(normalize(&serde_json::json!({})), None);
    }
}
