//! Parallel enrichment dispatcher
//!
//! Partitions the canonical-ordered candidate list into contiguous
//! batches and runs a bounded pool of in-process workers, each doing
//! sequential per-candidate lookups. Completed batches are merged into
//! the single output stream in completion order; a worker that fails
//! outright contributes an empty batch instead of aborting its siblings.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::collector::retry_transient;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::ProfileApi;
use crate::sink::RecordSink;
use crate::sources::profile::LeadProfile;

/// Derived worker-pool and batch sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentPlan {
    pub pool_size: usize,
    pub batch_size: usize,
}

impl EnrichmentPlan {
    /// Derives sizing from available parallelism: the pool scales with
    /// the machine between a fixed floor and ceiling, and the batch size
    /// aims for a few batches per worker so workers stay busy without
    /// excessive per-batch overhead.
    pub fn derive(total_candidates: usize, config: &Config) -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::derive_with_parallelism(total_candidates, config, parallelism)
    }

    pub fn derive_with_parallelism(
        total_candidates: usize,
        config: &Config,
        parallelism: usize,
    ) -> Self {
        let pool_size = (parallelism * 2)
            .max(config.worker_pool_floor)
            .min(config.worker_pool_ceiling);
        let target_batches = pool_size * config.batches_per_worker;
        let batch_size = config
            .min_batch_size
            .max(total_candidates.div_ceil(target_batches.max(1)));
        Self {
            pool_size,
            batch_size,
        }
    }
}

pub struct EnrichmentDispatcher {
    api: Arc<dyn ProfileApi>,
    retry_attempts: u32,
    retry_base_delay: Duration,
    lookup_delay: Duration,
}

impl EnrichmentDispatcher {
    pub fn new(api: Arc<dyn ProfileApi>, config: &Config) -> Self {
        Self {
            api,
            retry_attempts: config.retry_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            lookup_delay: Duration::from_millis(config.enrich_delay_ms),
        }
    }

    /// Enriches every candidate, streaming profiles to `sink` as each
    /// batch completes. Returns the number of records written. Produces
    /// at most one record per candidate (candidates are unique by
    /// construction).
    pub async fn enrich<S>(
        &self,
        candidates: &[String],
        plan: &EnrichmentPlan,
        sink: &mut S,
    ) -> Result<usize>
    where
        S: RecordSink<LeadProfile>,
    {
        if candidates.is_empty() {
            return Ok(0);
        }

        let batches: Vec<Vec<String>> = candidates
            .chunks(plan.batch_size)
            .map(|c| c.to_vec())
            .collect();

        info!(
            candidates = candidates.len(),
            batches = batches.len(),
            batch_size = plan.batch_size,
            workers = plan.pool_size,
            "Starting enrichment"
        );

        let permits = Arc::new(Semaphore::new(plan.pool_size));
        let mut tasks: JoinSet<Vec<LeadProfile>> = JoinSet::new();

        for (index, batch) in batches.into_iter().enumerate() {
            let api = self.api.clone();
            let permits = permits.clone();
            let retry_attempts = self.retry_attempts;
            let retry_base_delay = self.retry_base_delay;
            let lookup_delay = self.lookup_delay;

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };
                let mut results = Vec::with_capacity(batch.len());

                for handle in &batch {
                    // Retry is scoped per candidate, not per batch
                    let lookup = retry_transient(retry_attempts, retry_base_delay, || {
                        api.profile(handle)
                    })
                    .await;

                    match lookup {
                        Ok(Some(profile)) => results.push(profile),
                        Ok(None) => {
                            debug!(batch = index, handle = %handle, "No profile, skipping");
                        }
                        Err(e) => {
                            warn!(batch = index, handle = %handle, error = %e,
                                "Lookup failed, skipping candidate");
                        }
                    }

                    if !lookup_delay.is_zero() {
                        tokio::time::sleep(lookup_delay).await;
                    }
                }

                debug!(batch = index, enriched = results.len(), "Batch complete");
                results
            });
        }

        // Consume batches in completion order; the sink is the only
        // shared output and this loop is its single writer.
        let mut written = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(records) => {
                    for record in &records {
                        sink.write(record).await?;
                        written += 1;
                    }
                }
                Err(e) => {
                    // Partial failure isolation: the batch contributes
                    // nothing, siblings and the run continue.
                    warn!(error = %e, "Enrichment worker failed, dropping its batch");
                }
            }
        }

        info!(enriched = written, "Enrichment complete");
        Ok(written)
    }
}
