//! Paginated and random-sample retrieval with batched persistence.
//!
//! A pager pulls pages from a [`WorksApi`] and hands out record batches of at
//! most `flush_threshold` records; anything over the threshold carries into
//! the next batch. Only one batch is held in memory at a time.
//!
//! Transport failures go through [`Backoff`]: the same cursor is retried, and
//! in sampling mode the next attempt draws a fresh seed. The failed seed stays
//! marked as used.

use crate::config::{Mode, Retention, RetrieverConfig};
use crate::error::{HarvestError, Result};
use crate::openalex::{PageRequest, Paging, WorksApi, WorksPage, START_CURSOR};
use crate::query::Query;
use crate::retry::Backoff;
use crate::sink::BatchSink;
use futures::stream::{self, Stream, TryStreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashSet;
use std::pin::pin;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one retrieval run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalSummary {
    /// Records pulled from the API
    pub retrieved: usize,
    /// Rows written after retention sampling
    pub saved: usize,
    /// Batch files written
    pub batches: usize,
    /// Total reported by the API (cursor mode only)
    pub api_total: Option<u64>,
}

/// Split off the next batch: everything up to `threshold`, leftovers stay.
fn take_batch(buffer: &mut Vec<Value>, threshold: usize) -> Option<Vec<Value>> {
    if buffer.is_empty() {
        return None;
    }
    if buffer.len() > threshold {
        let rest = buffer.split_off(threshold);
        Some(std::mem::replace(buffer, rest))
    } else {
        Some(std::mem::take(buffer))
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Exhaustive cursor traversal.
pub struct CursorPager<'a, A> {
    api: &'a A,
    query: &'a Query,
    config: &'a RetrieverConfig,
    cursor: Option<String>,
    buffer: Vec<Value>,
    retrieved: usize,
    api_total: Option<u64>,
    backoff: Backoff,
}

impl<'a, A: WorksApi> CursorPager<'a, A> {
    pub fn new(api: &'a A, query: &'a Query, config: &'a RetrieverConfig) -> Self {
        Self {
            api,
            query,
            config,
            cursor: Some(START_CURSOR.to_string()),
            buffer: Vec::new(),
            retrieved: 0,
            api_total: None,
            backoff: Backoff::new(config.retry),
        }
    }

    pub fn api_total(&self) -> Option<u64> {
        self.api_total
    }

    /// Next batch, or `None` once the traversal is finished and drained.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        while self.buffer.len() < self.config.flush_threshold {
            let Some(cursor) = self.cursor.clone() else {
                break;
            };

            let request = PageRequest {
                query: self.query,
                per_page: self.config.per_page,
                paging: Paging::Cursor(&cursor),
            };
            debug!(cursor = %cursor, "Fetching results with cursor");

            let WorksPage { meta, mut results } = match self.api.fetch(&request).await {
                Ok(page) => {
                    self.backoff.reset();
                    page
                }
                Err(e) => {
                    let wait = self.backoff.record_failure(e)?;
                    pause(wait).await;
                    continue;
                }
            };

            if results.is_empty() {
                info!("No more results to fetch");
                self.cursor = None;
                break;
            }

            if meta.count.is_some() {
                self.api_total = meta.count;
            }
            let page_len = results.len();
            if let Some(total) = self.api_total {
                let room = usize::try_from(total)
                    .unwrap_or(usize::MAX)
                    .saturating_sub(self.retrieved);
                results.truncate(room);
            }

            self.retrieved += results.len();
            self.buffer.extend(results);
            self.cursor = meta.next_cursor;

            info!(
                page_results = page_len,
                retrieved = self.retrieved,
                api_total = ?self.api_total,
                buffered = self.buffer.len(),
                "Fetched page"
            );

            let reached_total = self
                .api_total
                .is_some_and(|total| self.retrieved as u64 >= total);
            if reached_total {
                info!(retrieved = self.retrieved, "Reached API-reported total");
                self.cursor = None;
            }

            if self.cursor.is_some() {
                pause(self.config.request_delay).await;
            }
        }

        Ok(take_batch(&mut self.buffer, self.config.flush_threshold))
    }
}

/// Random-sample traversal up to a fixed cap.
pub struct SamplePager<'a, A> {
    api: &'a A,
    query: &'a Query,
    config: &'a RetrieverConfig,
    cap: usize,
    used_seeds: HashSet<u32>,
    buffer: Vec<Value>,
    retrieved: usize,
    done: bool,
    backoff: Backoff,
    rng: StdRng,
}

impl<'a, A: WorksApi> SamplePager<'a, A> {
    pub fn new(
        api: &'a A,
        query: &'a Query,
        config: &'a RetrieverConfig,
        cap: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            api,
            query,
            config,
            cap,
            used_seeds: HashSet::new(),
            buffer: Vec::new(),
            retrieved: 0,
            done: false,
            backoff: Backoff::new(config.retry),
            rng,
        }
    }

    /// Draw a seed not used before in this run, or `None` when none are left.
    fn draw_seed(&mut self) -> Option<u32> {
        if self.used_seeds.len() >= self.config.seed_space as usize {
            return None;
        }
        loop {
            let seed = self.rng.gen_range(0..self.config.seed_space);
            if self.used_seeds.insert(seed) {
                return Some(seed);
            }
        }
    }

    /// Next batch, or `None` once the cap is reached and drained.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        while !self.done && self.buffer.len() < self.config.flush_threshold {
            if self.retrieved >= self.cap {
                self.done = true;
                break;
            }

            let Some(seed) = self.draw_seed() else {
                warn!(
                    seeds = self.used_seeds.len(),
                    retrieved = self.retrieved,
                    "Seed space exhausted before reaching max papers"
                );
                self.done = true;
                break;
            };

            let size = self.config.per_page.min(self.cap - self.retrieved);
            let request = PageRequest {
                query: self.query,
                per_page: self.config.per_page,
                paging: Paging::Sample { seed, size },
            };
            debug!(seed, size, "Fetching random samples");

            let mut results = match self.api.fetch(&request).await {
                Ok(page) => {
                    self.backoff.reset();
                    page.results
                }
                Err(e) => {
                    let wait = self.backoff.record_failure(e)?;
                    pause(wait).await;
                    continue;
                }
            };

            if results.is_empty() {
                info!("No more results to fetch");
                self.done = true;
                break;
            }

            results.truncate(self.cap - self.retrieved);
            self.retrieved += results.len();
            self.buffer.extend(results);

            info!(
                seed,
                retrieved = self.retrieved,
                cap = self.cap,
                buffered = self.buffer.len(),
                "Fetched random sample"
            );

            if self.retrieved >= self.cap {
                info!(cap = self.cap, "Reached the max papers limit");
                self.done = true;
            } else {
                pause(self.config.request_delay).await;
            }
        }

        Ok(take_batch(&mut self.buffer, self.config.flush_threshold))
    }
}

/// Either traversal strategy behind one interface.
pub enum BatchPager<'a, A> {
    Cursor(CursorPager<'a, A>),
    Sample(SamplePager<'a, A>),
}

impl<'a, A: WorksApi> BatchPager<'a, A> {
    pub fn new(
        api: &'a A,
        query: &'a Query,
        config: &'a RetrieverConfig,
        mode: Mode,
        rng: StdRng,
    ) -> Self {
        match mode {
            Mode::Exhaustive { .. } => BatchPager::Cursor(CursorPager::new(api, query, config)),
            Mode::Sampling { cap } => {
                BatchPager::Sample(SamplePager::new(api, query, config, cap.get(), rng))
            }
        }
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        match self {
            BatchPager::Cursor(pager) => pager.next_batch().await,
            BatchPager::Sample(pager) => pager.next_batch().await,
        }
    }

    pub fn api_total(&self) -> Option<u64> {
        match self {
            BatchPager::Cursor(pager) => pager.api_total(),
            BatchPager::Sample(_) => None,
        }
    }

    /// Lazy, finite stream over the pager's batches.
    pub fn into_stream(self) -> impl Stream<Item = Result<RecordBatch>> + 'a
    where
        A: 'a,
    {
        stream::try_unfold(self, |mut pager| async move {
            let next = pager.next_batch().await?;
            let api_total = pager.api_total();
            Ok::<_, HarvestError>(next.map(|records| (RecordBatch { records, api_total }, pager)))
        })
    }
}

/// One flushed batch of raw records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<Value>,
    /// API-reported total as known when the batch was cut (cursor mode only)
    pub api_total: Option<u64>,
}

/// Keep `floor(len * fraction)` records chosen uniformly, in original order.
pub fn retain_sample<R: Rng + ?Sized>(
    batch: Vec<Value>,
    retention: Retention,
    rng: &mut R,
) -> Vec<Value> {
    let keep = retention.keep_count(batch.len());
    if keep >= batch.len() {
        return batch;
    }

    let mut selected = vec![false; batch.len()];
    for index in rand::seq::index::sample(rng, batch.len(), keep).into_iter() {
        selected[index] = true;
    }

    batch
        .into_iter()
        .zip(selected)
        .filter_map(|(record, chosen)| chosen.then_some(record))
        .collect()
}

/// Drives a traversal and writes each batch to a sink.
pub struct Retriever<A> {
    api: A,
    config: RetrieverConfig,
    rng: StdRng,
}

impl<A: WorksApi> Retriever<A> {
    pub fn new(api: A, config: RetrieverConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { api, config, rng }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Lazy, finite stream of raw record batches for `mode`.
    ///
    /// Retention is not applied here; the stream yields every retrieved record.
    pub fn batches<'a>(
        &'a mut self,
        query: &'a Query,
        mode: Mode,
    ) -> impl Stream<Item = Result<RecordBatch>> + 'a {
        let rng = StdRng::seed_from_u64(self.rng.gen());
        BatchPager::new(&self.api, query, &self.config, mode, rng).into_stream()
    }

    /// Run a full retrieval, writing every batch to `sink`.
    ///
    /// In exhaustive mode each batch is thinned by the mode's retention before
    /// writing; sampling mode keeps every record.
    pub async fn retrieve<S: BatchSink>(
        &mut self,
        query: &Query,
        mode: Mode,
        sink: &mut S,
    ) -> Result<RetrievalSummary> {
        let retention = match mode {
            Mode::Exhaustive { retention } => retention,
            Mode::Sampling { .. } => Retention::ALL,
        };

        info!(
            query = %query.search_terms,
            start_year = ?query.start_year,
            end_year = ?query.end_year,
            mode = ?mode,
            "Starting retrieval"
        );

        let pager_rng = StdRng::seed_from_u64(self.rng.gen());
        let pager = BatchPager::new(&self.api, query, &self.config, mode, pager_rng);
        let mut batches = pin!(pager.into_stream());
        let mut summary = RetrievalSummary::default();

        while let Some(RecordBatch { records, api_total }) = batches.try_next().await? {
            let fetched = records.len();
            let kept = retain_sample(records, retention, &mut self.rng);

            summary.retrieved += fetched;
            summary.api_total = api_total;
            summary.batches += 1;
            summary.saved += sink.write_batch(summary.batches, &kept)?;

            info!(
                batch = summary.batches,
                fetched,
                kept = kept.len(),
                retention = retention.fraction(),
                "Flushed batch"
            );
        }

        info!(
            retrieved = summary.retrieved,
            saved = summary.saved,
            batches = summary.batches,
            "Retrieval complete"
        );
        Ok(summary)
    }
}
