//! Harvest orchestration
//!
//! Drives one subject through the full pipeline: timeline posts, media-id
//! resolution, the three engagement streams, candidate aggregation,
//! parallel enrichment, and ranking. Each phase persists its artifact
//! before the next phase starts and is skipped when the artifact already
//! has content, so an interrupted run resumes where it left off. A phase
//! that yields nothing degrades the run instead of aborting it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregate::aggregate_candidates;
use crate::artifacts::{self, ArtifactPaths, MediaEntry};
use crate::budget::Budget;
use crate::collector::{retry_transient, Collector, CollectorConfig};
use crate::config::Config;
use crate::enrich::{EnrichmentDispatcher, EnrichmentPlan};
use crate::error::{HarvestError, Result};
use crate::fetcher::{GraphApiFetcher, PageFetcher, ProfileApi};
use crate::http_client::{GraphHttpClient, HttpClientConfig};
use crate::rank::{rank, RankedLead};
use crate::sink::{JsonArrayWriter, LineWriter};
use crate::sources::profile::LeadProfile;
use crate::sources::{comments, followers, likers, posts};

const CSV_HEADER: [&str; 7] = [
    "username",
    "full_name",
    "followers",
    "following",
    "bio",
    "lead_score",
    "category",
];

/// What a run produced, phase by phase, and which caps were hit.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub subject: String,
    pub posts: usize,
    pub media: usize,
    pub comments: usize,
    pub comments_capped: bool,
    pub likers: usize,
    pub likers_capped: bool,
    pub followers: usize,
    pub followers_capped: bool,
    pub candidates: usize,
    pub candidates_capped: bool,
    pub enriched: usize,
    pub ranked: usize,
}

fn cap_marker(capped: bool) -> &'static str {
    if capped {
        " (cap reached)"
    } else {
        ""
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Harvest summary for '{}':", self.subject)?;
        writeln!(f, "  posts:      {}", self.posts)?;
        writeln!(f, "  media ids:  {}", self.media)?;
        writeln!(
            f,
            "  comments:   {}{}",
            self.comments,
            cap_marker(self.comments_capped)
        )?;
        writeln!(
            f,
            "  likers:     {}{}",
            self.likers,
            cap_marker(self.likers_capped)
        )?;
        writeln!(
            f,
            "  followers:  {}{}",
            self.followers,
            cap_marker(self.followers_capped)
        )?;
        writeln!(
            f,
            "  candidates: {}{}",
            self.candidates,
            cap_marker(self.candidates_capped)
        )?;
        writeln!(f, "  enriched:   {}", self.enriched)?;
        write!(f, "  ranked:     {}", self.ranked)
    }
}

pub struct Harvest {
    config: Config,
    pages: Arc<dyn PageFetcher>,
    api: Arc<dyn ProfileApi>,
}

impl Harvest {
    /// Wires the pipeline to the live HTTP service.
    pub fn over_http(config: Config) -> Result<Self> {
        let client = Arc::new(GraphHttpClient::new(HttpClientConfig::from_config(
            &config,
        ))?);
        let fetcher = Arc::new(GraphApiFetcher::new(client, config.api_base_url.clone()));
        Ok(Self {
            pages: fetcher.clone(),
            api: fetcher,
            config,
        })
    }

    pub fn new(config: Config, pages: Arc<dyn PageFetcher>, api: Arc<dyn ProfileApi>) -> Self {
        Self {
            config,
            pages,
            api,
        }
    }

    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::from_config(&self.config)
    }

    fn seed_file(&self, subject: &str, suffix: &str) -> std::path::PathBuf {
        self.config.seed_dir.join(format!("{}_{}", subject, suffix))
    }

    /// Runs the full pipeline for one subject.
    pub async fn run(&self, subject: &str) -> Result<RunSummary> {
        let started = Utc::now();
        let paths = ArtifactPaths::new(&self.config.output_dir, subject);
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let mut summary = RunSummary {
            subject: subject.to_string(),
            ..RunSummary::default()
        };

        summary.posts = self.phase_posts(subject, &paths).await?;
        summary.media = self.phase_media(subject, &paths).await?;

        let media_entries = artifacts::read_media_entries(&paths.media_ids()).await;
        let (comments, likers, followers) = tokio::join!(
            self.phase_comments(&paths, &media_entries),
            self.phase_likers(&paths, &media_entries),
            self.phase_followers(subject, &paths),
        );
        (summary.comments, summary.comments_capped) = comments?;
        (summary.likers, summary.likers_capped) = likers?;
        (summary.followers, summary.followers_capped) = followers?;

        let (candidates, capped) = self.phase_aggregate(&paths).await?;
        summary.candidates = candidates;
        summary.candidates_capped = capped;

        summary.enriched = self.phase_enrich(&paths).await?;
        summary.ranked = self.phase_rank(&paths).await?;

        let elapsed = (Utc::now() - started).num_seconds();
        info!(
            subject = %subject,
            ranked = summary.ranked,
            elapsed_seconds = elapsed,
            "Harvest complete"
        );
        Ok(summary)
    }

    /// Re-ranks previously enriched data without touching the network.
    pub async fn rank_only(&self, subject: &str) -> Result<usize> {
        let paths = ArtifactPaths::new(&self.config.output_dir, subject);
        self.phase_rank(&paths).await
    }

    /// Phase 1: the subject's post shortcodes.
    async fn phase_posts(&self, subject: &str, paths: &ArtifactPaths) -> Result<usize> {
        let path = paths.post_ids();
        if artifacts::has_lines(&path).await {
            let count = artifacts::read_lines(&path).await.len();
            info!(subject = %subject, count, "Reusing existing post ids");
            return Ok(count);
        }

        let seeded = artifacts::seed_if_empty(
            &path,
            self.config.post_ids.as_deref(),
            &self.seed_file(subject, "postid.txt"),
        )
        .await?;
        if seeded > 0 {
            return Ok(seeded);
        }

        let budget = Budget::new(self.config.max_posts);
        let mut sink = LineWriter::create(&path).await?;
        let collector = Collector::new(self.pages.as_ref(), self.collector_config());
        match collector
            .collect(&posts::descriptor(subject), &budget, posts::normalize, &mut sink)
            .await
        {
            Ok(outcome) => Ok(outcome.collected),
            Err(e) if e.is_auth() => {
                warn!(subject = %subject, error = %e, "Post collection rejected, continuing without");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Phase 2: resolve each shortcode to its internal media id.
    async fn phase_media(&self, subject: &str, paths: &ArtifactPaths) -> Result<usize> {
        let path = paths.media_ids();
        if artifacts::has_lines(&path).await {
            let count = artifacts::read_media_entries(&path).await.len();
            info!(subject = %subject, count, "Reusing existing media ids");
            return Ok(count);
        }

        let shortcodes = artifacts::read_lines(&paths.post_ids()).await;
        if !shortcodes.is_empty() {
            let mut sink = LineWriter::create(&path).await?;
            let retry_attempts = self.config.retry_attempts;
            let retry_base_delay =
                std::time::Duration::from_millis(self.config.retry_base_delay_ms);

            for shortcode in &shortcodes {
                let lookup = retry_transient(retry_attempts, retry_base_delay, || {
                    self.api.media_id(shortcode)
                })
                .await;

                match lookup {
                    Ok(Some(media_id)) => {
                        let entry = MediaEntry {
                            shortcode: shortcode.clone(),
                            media_id,
                        };
                        sink.write_line(&entry.to_line()).await?;
                    }
                    Ok(None) => {
                        warn!(shortcode = %shortcode, "No media behind shortcode, skipping");
                    }
                    Err(e) if e.is_auth() => {
                        warn!(shortcode = %shortcode, error = %e,
                            "Media resolution rejected, stopping lookups");
                        break;
                    }
                    Err(e) => {
                        warn!(shortcode = %shortcode, error = %e, "Media resolution failed, skipping");
                    }
                }
            }
        }

        artifacts::seed_if_empty(
            &path,
            self.config.media_ids.as_deref(),
            &self.seed_file(subject, "media_ids.txt"),
        )
        .await?;
        // The artifact chain is complete even when nothing resolved
        artifacts::touch(&path).await?;
        Ok(artifacts::read_media_entries(&path).await.len())
    }

    /// Phase 3a: comment records across all resolved media, under one
    /// shared budget.
    async fn phase_comments(
        &self,
        paths: &ArtifactPaths,
        media_entries: &[MediaEntry],
    ) -> Result<(usize, bool)> {
        let budget = Budget::new(self.config.max_comments);
        let mut sink = JsonArrayWriter::create(&paths.comments()).await?;
        let collector = Collector::new(self.pages.as_ref(), self.collector_config());
        let mut total = 0usize;

        for entry in media_entries {
            if budget.is_exhausted() {
                break;
            }
            let media_id = entry.media_id.as_str();
            let outcome = collector
                .collect(
                    &comments::descriptor(media_id),
                    &budget,
                    |value| comments::normalize(media_id, value),
                    &mut sink,
                )
                .await;
            match outcome {
                Ok(outcome) => total += outcome.collected,
                Err(e) if e.is_auth() => {
                    warn!(media_id = %media_id, error = %e,
                        "Comment stream rejected, stopping comment collection");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        sink.finish().await?;
        Ok((total, budget.is_exhausted()))
    }

    /// Phase 3b: liker handles across all resolved media.
    async fn phase_likers(
        &self,
        paths: &ArtifactPaths,
        media_entries: &[MediaEntry],
    ) -> Result<(usize, bool)> {
        let budget = Budget::new(self.config.max_likers);
        let mut sink = LineWriter::create(&paths.likers()).await?;
        let collector = Collector::new(self.pages.as_ref(), self.collector_config());
        let mut total = 0usize;

        for entry in media_entries {
            if budget.is_exhausted() {
                break;
            }
            let outcome = collector
                .collect(
                    &likers::descriptor(&entry.media_id),
                    &budget,
                    likers::normalize,
                    &mut sink,
                )
                .await;
            match outcome {
                Ok(outcome) => total += outcome.collected,
                Err(e) if e.is_auth() => {
                    warn!(media_id = %entry.media_id, error = %e,
                        "Liker stream rejected, stopping liker collection");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((total, budget.is_exhausted()))
    }

    /// Phase 3c: the subject's follower handles.
    async fn phase_followers(&self, subject: &str, paths: &ArtifactPaths) -> Result<(usize, bool)> {
        let path = paths.followers();
        let budget = Budget::new(self.config.max_followers);
        let mut sink = LineWriter::create(&path).await?;
        let collector = Collector::new(self.pages.as_ref(), self.collector_config());

        let collected = match collector
            .collect(
                &followers::descriptor(subject),
                &budget,
                followers::normalize,
                &mut sink,
            )
            .await
        {
            Ok(outcome) => outcome.collected,
            Err(e) if e.is_auth() => {
                warn!(subject = %subject, error = %e,
                    "Follower stream rejected, continuing without");
                0
            }
            Err(e) => return Err(e),
        };
        drop(sink);

        let seeded = artifacts::seed_if_empty(
            &path,
            self.config.followers.as_deref(),
            &self.seed_file(subject, "followers.txt"),
        )
        .await?;
        Ok((collected.max(seeded), budget.is_exhausted()))
    }

    /// Phase 4: merge the three streams into the capped candidate list.
    async fn phase_aggregate(&self, paths: &ArtifactPaths) -> Result<(usize, bool)> {
        let path = paths.leads();
        if artifacts::has_lines(&path).await {
            let handles = artifacts::read_lines(&path).await;
            info!(count = handles.len(), "Reusing existing candidate list");
            return Ok((handles.len(), handles.len() >= self.config.max_leads));
        }

        let likers = artifacts::read_lines(&paths.likers()).await;
        let followers = artifacts::read_lines(&paths.followers()).await;
        let comments = artifacts::read_json_records(&paths.comments()).await;

        let candidates =
            aggregate_candidates(self.config.max_leads, &likers, &followers, &comments);
        let handles = candidates.sorted_handles();
        artifacts::write_lines(&path, &handles).await?;
        Ok((handles.len(), candidates.is_full()))
    }

    /// Phase 5: enrich every candidate with profile attributes.
    async fn phase_enrich(&self, paths: &ArtifactPaths) -> Result<usize> {
        let path = paths.leads_data();
        let existing: Vec<LeadProfile> = artifacts::read_json_records(&path).await;
        if !existing.is_empty() {
            info!(count = existing.len(), "Reusing existing enriched data");
            return Ok(existing.len());
        }

        let candidates = artifacts::read_lines(&paths.leads()).await;
        if candidates.is_empty() {
            warn!("No candidates to enrich");
        }

        let plan = EnrichmentPlan::derive(candidates.len(), &self.config);
        let dispatcher = EnrichmentDispatcher::new(self.api.clone(), &self.config);
        let mut sink = JsonArrayWriter::create(&path).await?;
        let enriched = dispatcher.enrich(&candidates, &plan, &mut sink).await?;
        if !candidates.is_empty() && !sink.wrote_any() {
            warn!(candidates = candidates.len(), "Enrichment produced no profiles");
        }
        sink.finish().await?;
        Ok(enriched)
    }

    /// Phase 6: score, order and emit the ranked outputs. Always
    /// recomputed; scoring is pure and cheap.
    async fn phase_rank(&self, paths: &ArtifactPaths) -> Result<usize> {
        let profiles: Vec<LeadProfile> = artifacts::read_json_records(&paths.leads_data()).await;
        let ranked = rank(&profiles);

        let mut json = JsonArrayWriter::create(&paths.ranked_json()).await?;
        for lead in &ranked {
            json.write_next(lead).await?;
        }
        json.finish().await?;

        let csv = render_csv(&ranked)?;
        tokio::fs::write(paths.ranked_csv(), csv).await?;

        info!(ranked = ranked.len(), "Ranking complete");
        Ok(ranked.len())
    }
}

fn render_csv(ranked: &[RankedLead]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for lead in ranked {
        writer.write_record(&[
            lead.username.clone(),
            lead.full_name.clone(),
            lead.followers.to_string(),
            lead.following.to_string(),
            lead.bio.clone(),
            format!("{:.4}", lead.lead_score),
            lead.category.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| HarvestError::IoError(e.into_error()))
}
