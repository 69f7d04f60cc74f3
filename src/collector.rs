//! Paginated collector
//!
//! Drives one fetch stream to completion: normalizes each page entry,
//! claims budget for the prefix that fits, streams accepted records to
//! the sink, and follows the cursor while the remote side reports more
//! pages. Transient fetch errors are retried with jittered exponential
//! backoff; a malformed page ends the stream early (retrying cannot fix
//! a schema mismatch); an auth rejection aborts this stream and is
//! surfaced to the caller.

use rand::Rng;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::budget::Budget;
use crate::config::Config;
use crate::error::{HarvestError, Result};
use crate::fetcher::PageFetcher;
use crate::sink::RecordSink;
use crate::sources::QueryDescriptor;

/// How a collection stream ended. None of these are errors; the caller
/// decides whether partial output counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Remote side reported no more pages (or no cursor)
    Exhausted,
    /// Global budget for this collection type was reached
    BudgetReached,
    /// Page shape did not match expectations; reported, not retried
    Malformed,
    /// Transient failures outlasted the retry ceiling
    RetriesExhausted,
}

#[derive(Debug)]
pub struct CollectOutcome {
    pub collected: usize,
    pub end: StreamEnd,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Fixed inter-page delay (not adaptive)
    pub page_delay: Duration,
    /// Total fetch attempts per page, including the first
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl CollectorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_delay: Duration::from_millis(config.page_delay_ms),
            retry_attempts: config.retry_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Retries an operation on transient failures with jittered exponential
/// backoff. `attempts` counts every try, including the first.
pub async fn retry_transient<T, F, Fut>(attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                attempt += 1;
                let backoff = base_delay.as_secs_f64() * f64::from(1u32 << (attempt - 1));
                // Jitter: random factor between 0.5 and 1.5
                let jitter = 0.5 + rand::thread_rng().gen::<f64>();
                let delay = Duration::from_secs_f64(backoff * jitter);
                warn!(
                    attempt = attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct Collector<'f> {
    fetcher: &'f dyn PageFetcher,
    config: CollectorConfig,
}

impl<'f> Collector<'f> {
    pub fn new(fetcher: &'f dyn PageFetcher, config: CollectorConfig) -> Self {
        Self { fetcher, config }
    }

    /// Collects one stream, writing accepted records to `sink` as they
    /// are produced. Never accepts more records than `budget` grants.
    pub async fn collect<T, N, S>(
        &self,
        query: &QueryDescriptor,
        budget: &Budget,
        mut normalize: N,
        sink: &mut S,
    ) -> Result<CollectOutcome>
    where
        T: Send + Sync,
        N: FnMut(&Value) -> Option<T> + Send,
        S: RecordSink<T>,
    {
        let mut cursor: Option<String> = None;
        let mut collected = 0usize;
        let mut page_number = 1u32;

        loop {
            // Cooperative cancellation: checked between fetches
            if budget.is_exhausted() {
                return Ok(self.finish(query, collected, StreamEnd::BudgetReached));
            }

            let fetch = retry_transient(self.config.retry_attempts, self.config.retry_base_delay, || {
                self.fetcher.fetch(query, cursor.as_deref())
            })
            .await;

            let page = match fetch {
                Ok(page) => page,
                Err(e) if e.is_malformed() => {
                    warn!(source = %query.source, subject = %query.subject, error = %e,
                        "Malformed page, ending stream");
                    return Ok(self.finish(query, collected, StreamEnd::Malformed));
                }
                Err(e) if e.is_transient() => {
                    warn!(source = %query.source, subject = %query.subject, error = %e,
                        "Retries exhausted, aborting stream");
                    return Ok(self.finish(query, collected, StreamEnd::RetriesExhausted));
                }
                // Auth and infrastructure failures propagate
                Err(e) => return Err(e),
            };

            let records: Vec<T> = page.entries.iter().filter_map(&mut normalize).collect();
            let normalized = records.len();
            // Check-and-decrement is one atomic step; only the prefix
            // that fits is consumed.
            let granted = budget.take(normalized);
            for record in records.into_iter().take(granted) {
                sink.write(&record).await?;
                collected += 1;
            }

            debug!(
                source = %query.source,
                subject = %query.subject,
                page = page_number,
                accepted = granted,
                total = collected,
                budget_remaining = budget.remaining(),
                "Collected page"
            );

            if granted < normalized || budget.is_exhausted() {
                return Ok(self.finish(query, collected, StreamEnd::BudgetReached));
            }

            // Continue only with capacity, a has-next flag AND a cursor
            if !page.has_next || page.end_cursor.is_none() {
                return Ok(self.finish(query, collected, StreamEnd::Exhausted));
            }
            cursor = page.end_cursor;
            page_number += 1;

            if !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
        }
    }

    fn finish(&self, query: &QueryDescriptor, collected: usize, end: StreamEnd) -> CollectOutcome {
        let message = match end {
            StreamEnd::Exhausted | StreamEnd::BudgetReached => "Stream complete",
            StreamEnd::Malformed | StreamEnd::RetriesExhausted => "Stream ended early",
        };
        info!(source = %query.source, subject = %query.subject, collected, end = ?end, "{}", message);
        CollectOutcome { collected, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::fetcher::{Page, ScriptedFetcher, ScriptedResponse};
    use crate::sink::VecSink;
    use crate::sources::likers;
    use std::sync::atomic::Ordering;

    fn handle_page(names: &[&str], has_next: bool, cursor: Option<&str>) -> Page {
        Page {
            entries: names
                .iter()
                .map(|n| serde_json::json!({"node": {"username": n}}))
                .collect(),
            has_next,
            end_cursor: cursor.map(String::from),
        }
    }

    fn test_collector_config() -> CollectorConfig {
        CollectorConfig::from_config(&config::test_config())
    }

    #[tokio::test]
    async fn test_collects_across_pages_until_exhausted() {
        let fetcher = ScriptedFetcher::with_pages(vec![
            handle_page(&["a", "b"], true, Some("c1")),
            handle_page(&["c"], false, None),
        ]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(100);
        let mut sink = VecSink::new();

        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.collected, 3);
        assert_eq!(outcome.end, StreamEnd::Exhausted);
        assert_eq!(sink.records, vec!["a", "b", "c"]);
        assert_eq!(budget.remaining(), 97);
    }

    #[tokio::test]
    async fn test_budget_prefix_never_overshoots() {
        let fetcher = ScriptedFetcher::with_pages(vec![handle_page(
            &["a", "b", "c", "d", "e"],
            true,
            Some("c1"),
        )]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(3);
        let mut sink = VecSink::new();

        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        // Only the prefix that fits is consumed, and the loop stops
        // without fetching the next page.
        assert_eq!(outcome.collected, 3);
        assert_eq!(outcome.end, StreamEnd::BudgetReached);
        assert_eq!(sink.records, vec!["a", "b", "c"]);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_stops_before_fetching() {
        let fetcher = ScriptedFetcher::with_pages(vec![handle_page(&["a"], false, None)]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(1);
        assert_eq!(budget.take(1), 1);

        let mut sink = VecSink::<String>::new();
        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.collected, 0);
        assert_eq!(outcome.end, StreamEnd::BudgetReached);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_transient_retries_then_succeeds() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedResponse::Transient,
            ScriptedResponse::Page(handle_page(&["a"], false, None)),
        ]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(10);
        let mut sink = VecSink::new();

        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.collected, 1);
        assert_eq!(outcome.end, StreamEnd::Exhausted);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_keeps_partial_output() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedResponse::Page(handle_page(&["a"], true, Some("c1"))),
            ScriptedResponse::Transient,
            ScriptedResponse::Transient,
            ScriptedResponse::Transient,
        ]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(10);
        let mut sink = VecSink::new();

        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.end, StreamEnd::RetriesExhausted);
        assert_eq!(sink.records, vec!["a"]);
        // Page 1 + three attempts on page 2
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_malformed_page_ends_stream_without_retry() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedResponse::Page(handle_page(&["a"], true, Some("c1"))),
            ScriptedResponse::Malformed,
        ]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(10);
        let mut sink = VecSink::new();

        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.end, StreamEnd::Malformed);
        assert_eq!(sink.records, vec!["a"]);
        // No retry for a schema mismatch
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_auth_rejection_propagates() {
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Auth]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(10);
        let mut sink = VecSink::<String>::new();

        let err = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap_err();

        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_has_next_without_cursor_ends_cleanly() {
        let fetcher = ScriptedFetcher::with_pages(vec![handle_page(&["a"], true, None)]);
        let collector = Collector::new(&fetcher, test_collector_config());
        let budget = Budget::new(10);
        let mut sink = VecSink::new();

        let outcome = collector
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.end, StreamEnd::Exhausted);
        assert_eq!(sink.records, vec!["a"]);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_shared_budget_across_sequential_streams() {
        let budget = Budget::new(3);
        let collector_config = test_collector_config();

        let first = ScriptedFetcher::with_pages(vec![handle_page(&["a", "b"], false, None)]);
        let mut sink = VecSink::new();
        Collector::new(&first, collector_config.clone())
            .collect(&likers::descriptor("m1"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        let second = ScriptedFetcher::with_pages(vec![handle_page(&["c", "d"], false, None)]);
        let outcome = Collector::new(&second, collector_config)
            .collect(&likers::descriptor("m2"), &budget, likers::normalize, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.end, StreamEnd::BudgetReached);
        assert_eq!(sink.records, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_retry_transient_gives_up_on_auth() {
        let mut calls = 0u32;
        let result: Result<()> = retry_transient(3, Duration::from_millis(1), || {
            calls += 1;
            async { Err(HarvestError::Auth("no".into())) }
        })
        .await;
        assert!(result.unwrap_err().is_auth());
        assert_eq!(calls, 1);
    }
}
