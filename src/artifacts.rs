//! Run artifacts and seed inputs
//!
//! Every phase reads and writes per-subject files under the output
//! directory. A phase whose artifact already has content is skipped, and
//! environment-style override lists (or files under the seed directory)
//! can stand in for live collection when it produced nothing.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;

/// Per-subject artifact locations.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    output_dir: PathBuf,
    subject: String,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, subject: &str) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            subject: subject.to_string(),
        }
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}", self.subject, suffix))
    }

    pub fn post_ids(&self) -> PathBuf {
        self.file("postid.txt")
    }

    pub fn media_ids(&self) -> PathBuf {
        self.file("media_ids.txt")
    }

    pub fn comments(&self) -> PathBuf {
        self.file("comments.json")
    }

    pub fn likers(&self) -> PathBuf {
        self.file("likers.txt")
    }

    pub fn followers(&self) -> PathBuf {
        self.file("followers.txt")
    }

    pub fn leads(&self) -> PathBuf {
        self.file("leads.txt")
    }

    pub fn leads_data(&self) -> PathBuf {
        self.file("leads_data.json")
    }

    pub fn ranked_json(&self) -> PathBuf {
        self.file("leads_ranked.json")
    }

    pub fn ranked_csv(&self) -> PathBuf {
        self.file("leads_ranked.csv")
    }

    pub fn all(&self) -> Vec<PathBuf> {
        vec![
            self.post_ids(),
            self.media_ids(),
            self.comments(),
            self.likers(),
            self.followers(),
            self.leads(),
            self.leads_data(),
            self.ranked_json(),
            self.ranked_csv(),
        ]
    }
}

/// True if the file exists and contains at least one non-blank line.
pub async fn has_lines(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content.lines().any(|l| !l.trim().is_empty()),
        Err(_) => false,
    }
}

/// Splits a comma/whitespace-separated override list.
pub fn parse_override_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Reads non-blank, trimmed lines; a missing file reads as empty.
pub async fn read_lines(path: &Path) -> Vec<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// A resolved `shortcode:media_id` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub shortcode: String,
    pub media_id: String,
}

impl MediaEntry {
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.shortcode, self.media_id)
    }
}

/// Parses `alias:internal_id` lines. Malformed lines are skipped with a
/// warning, not fatal.
pub async fn read_media_entries(path: &Path) -> Vec<MediaEntry> {
    let mut entries = Vec::new();
    for line in read_lines(path).await {
        let mut parts = line.splitn(2, ':');
        match (parts.next(), parts.next()) {
            (Some(shortcode), Some(media_id))
                if !shortcode.trim().is_empty() && !media_id.trim().is_empty() =>
            {
                entries.push(MediaEntry {
                    shortcode: shortcode.trim().to_string(),
                    media_id: media_id.trim().to_string(),
                });
            }
            _ => {
                warn!(line = %line, "Invalid media line format, skipping");
            }
        }
    }
    entries
}

/// Reads a streamed JSON array artifact back into records. Missing or
/// unparsable artifacts degrade to an empty list.
pub async fn read_json_records<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable JSON artifact");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Writes a newline-delimited list, creating parent directories.
pub async fn write_lines(path: &Path, items: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut content = items.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Makes sure the artifact exists, even if empty, so downstream phases
/// behave predictably.
pub async fn touch(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    write_lines(path, &[]).await
}

/// Fills an empty artifact from an override list or a seed-directory
/// copy. Returns how many items ended up seeded (0 when the artifact
/// already had content or no seed applied).
pub async fn seed_if_empty(
    path: &Path,
    override_list: Option<&str>,
    seed_file: &Path,
) -> Result<usize> {
    if has_lines(path).await {
        return Ok(0);
    }

    if let Some(raw) = override_list {
        let items = parse_override_list(raw);
        if !items.is_empty() {
            write_lines(path, &items).await?;
            info!(count = items.len(), path = %path.display(), "Seeded from override list");
            return Ok(items.len());
        }
    }

    if has_lines(seed_file).await {
        tokio::fs::copy(seed_file, path).await?;
        let count = read_lines(path).await.len();
        info!(from = %seed_file.display(), path = %path.display(), count, "Seeded from seed file");
        return Ok(count);
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let paths = ArtifactPaths::new(Path::new("/tmp/out"), "acme");
        assert_eq!(paths.post_ids(), PathBuf::from("/tmp/out/acme_postid.txt"));
        assert_eq!(
            paths.ranked_csv(),
            PathBuf::from("/tmp/out/acme_leads_ranked.csv")
        );
        assert_eq!(paths.all().len(), 9);
    }

    #[test]
    fn test_parse_override_list() {
        assert_eq!(
            parse_override_list("a, b\nc  d,,"),
            vec!["a", "b", "c", "d"]
        );
        assert!(parse_override_list("  ").is_empty());
    }

    #[tokio::test]
    async fn test_media_entries_skip_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.txt");
        write_lines(
            &path,
            &[
                "ABC:111".to_string(),
                "no-separator".to_string(),
                ":222".to_string(),
                "DEF:333".to_string(),
            ],
        )
        .await
        .unwrap();

        let entries = read_media_entries(&path).await;
        assert_eq!(
            entries,
            vec![
                MediaEntry {
                    shortcode: "ABC".into(),
                    media_id: "111".into()
                },
                MediaEntry {
                    shortcode: "DEF".into(),
                    media_id: "333".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_has_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        assert!(!has_lines(&path).await);

        write_lines(&path, &[]).await.unwrap();
        assert!(!has_lines(&path).await);

        write_lines(&path, &["one".to_string()]).await.unwrap();
        assert!(has_lines(&path).await);
    }

    #[tokio::test]
    async fn test_seed_if_empty_prefers_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        write_lines(&path, &["kept".to_string()]).await.unwrap();

        let seeded = seed_if_empty(&path, Some("a,b"), &dir.path().join("missing"))
            .await
            .unwrap();
        assert_eq!(seeded, 0);
        assert_eq!(read_lines(&path).await, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_seed_if_empty_uses_override_then_seed_file() {
        let dir = tempfile::tempdir().unwrap();

        let via_override = dir.path().join("a.txt");
        let seeded = seed_if_empty(&via_override, Some("x, y z"), &dir.path().join("missing"))
            .await
            .unwrap();
        assert_eq!(seeded, 3);

        let seed_file = dir.path().join("seed.txt");
        write_lines(&seed_file, &["from-seed".to_string()])
            .await
            .unwrap();
        let via_file = dir.path().join("b.txt");
        let seeded = seed_if_empty(&via_file, None, &seed_file).await.unwrap();
        assert_eq!(seeded, 1);
        assert_eq!(read_lines(&via_file).await, vec!["from-seed"]);
    }

    #[tokio::test]
    async fn test_read_json_records_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(read_json_records::<serde_json::Value>(&missing)
            .await
            .is_empty());

        let broken = dir.path().join("broken.json");
        tokio::fs::write(&broken, "[{not json").await.unwrap();
        assert!(read_json_records::<serde_json::Value>(&broken)
            .await
            .is_empty());
    }
}
