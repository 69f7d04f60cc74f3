//! Profile enrichment: per-handle attribute lookup.
//!
//! Not a paginated stream; the enrichment dispatcher performs one lookup
//! per candidate through the `ProfileApi` trait in `fetcher`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{bool_field, str_field, u64_field};

pub const PROFILE_DOC_ID: &str = "24963806849976236";
pub const PROFILE_FRIENDLY_NAME: &str = "PolarisProfilePageContentQuery";

/// Profile attributes retained for a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadProfile {
    pub username: String,
    pub full_name: String,
    pub is_private: bool,
    pub biography: String,
    pub follower_count: u64,
    pub following_count: u64,
}

/// Extracts the whitelisted profile fields with defaults.
pub fn parse_profile(user: &Value) -> LeadProfile {
    LeadProfile {
        username: str_field(user, "username"),
        full_name: str_field(user, "full_name"),
        is_private: bool_field(user, "is_private"),
        biography: str_field(user, "biography"),
        follower_count: u64_field(user, "follower_count"),
        following_count: u64_field(user, "following_count"),
    }
}
