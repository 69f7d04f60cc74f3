//! Lead scoring and ranking
//!
//! Pure transformation of enriched profiles into scored, categorized,
//! descending-ordered leads. No I/O happens here; the runner decides
//! where the ranked output goes.
//!
//! The composite weights bio relevance far above the structural signals:
//! 70% keyword relevance, 20% name authenticity, 10% follow-ratio
//! balance. Classification additionally requires a non-zero bio score so
//! a record with no topical relevance can never reach High/Medium on
//! structural signals alone.

use serde::{Deserialize, Serialize};

use crate::sources::profile::LeadProfile;

/// Niche keyword set matched as substrings of the cleaned biography.
pub const BIO_KEYWORDS: [&str; 5] = ["fitness", "gym", "training", "health", "workout"];

const BIO_WEIGHT: f64 = 0.7;
const AUTHENTICITY_WEIGHT: f64 = 0.2;
const FOLLOW_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Category::High => "High",
            Category::Medium => "Medium",
            Category::Low => "Low",
        };
        f.write_str(label)
    }
}

/// A scored lead, ready for output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedLead {
    pub username: String,
    pub full_name: String,
    pub followers: u64,
    pub following: u64,
    pub bio: String,
    pub lead_score: f64,
    pub category: Category,
}

/// Tiered bio relevance: one keyword hit is a weak signal, two or more
/// is strong. Deliberately not linear.
pub fn bio_score(bio: &str) -> f64 {
    let matches = BIO_KEYWORDS.iter().filter(|kw| bio.contains(*kw)).count();
    match matches {
        0 => 0.0,
        1 => 0.6,
        _ => 1.0,
    }
}

/// Real personal names are usually multi-word; single-word names are
/// more likely brand or bot handles.
pub fn authenticity(full_name: &str) -> f64 {
    if full_name.split_whitespace().count() > 1 {
        1.0
    } else {
        0.0
    }
}

/// Peaks at 1.0 when following == followers, decays toward 0 as the
/// ratio becomes lopsided in either direction. Zero on either side
/// means no signal.
pub fn follow_score(followers: u64, following: u64) -> f64 {
    if followers == 0 || following == 0 {
        return 0.0;
    }
    let ratio = following as f64 / followers as f64;
    (ratio.min(1.0 / ratio)).clamp(0.0, 1.0)
}

pub fn classify(lead_score: f64, bio_score: f64) -> Category {
    if lead_score > 0.7 && bio_score > 0.0 {
        Category::High
    } else if lead_score >= 0.4 && bio_score > 0.0 {
        Category::Medium
    } else {
        Category::Low
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn score(profile: &CleanedLead) -> (f64, Category) {
    let bio = bio_score(&profile.bio);
    let name = authenticity(&profile.full_name);
    let follow = follow_score(profile.followers, profile.following);
    let composite = (BIO_WEIGHT * bio + AUTHENTICITY_WEIGHT * name + FOLLOW_WEIGHT * follow)
        .clamp(0.0, 1.0);
    (round4(composite), classify(composite, bio))
}

struct CleanedLead {
    username: String,
    full_name: String,
    followers: u64,
    following: u64,
    bio: String,
}

/// Normalizes and deduplicates the enriched records: lower-case and trim
/// handle/name/bio, drop empty handles, keep the first occurrence per
/// handle in input order.
fn clean(records: &[LeadProfile]) -> Vec<CleanedLead> {
    let mut seen = std::collections::HashSet::new();
    let mut cleaned = Vec::new();
    for record in records {
        let username = record.username.trim().to_lowercase();
        if username.is_empty() || !seen.insert(username.clone()) {
            continue;
        }
        cleaned.push(CleanedLead {
            username,
            full_name: record.full_name.trim().to_lowercase(),
            followers: record.follower_count,
            following: record.following_count,
            bio: record.biography.trim().to_lowercase(),
        });
    }
    cleaned
}

/// Scores, classifies and orders enriched records. The sort is stable
/// and descending by score, so ties retain the cleaned input order.
pub fn rank(records: &[LeadProfile]) -> Vec<RankedLead> {
    let mut ranked: Vec<RankedLead> = clean(records)
        .into_iter()
        .map(|lead| {
            let (lead_score, category) = score(&lead);
            RankedLead {
                username: lead.username,
                full_name: lead.full_name,
                followers: lead.followers,
                following: lead.following,
                bio: lead.bio,
                lead_score,
                category,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.lead_score
            .partial_cmp(&a.lead_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
