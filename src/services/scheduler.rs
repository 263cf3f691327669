//! Background cover enrichment: a bounded pool of workers over the entities
//! that are due for a lookup.
//!
//! Every clone of the scheduler shares one worker semaphore and one set of
//! in-flight entity ids, so the post-import, periodic, on-demand and manual
//! runs never enrich the same entity twice at once nor exceed `workers`.
//! Outcomes are written back through `EntityStore::record_enrichments`, a few
//! at a time, before an entity is released.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::enrichment::{EnrichmentError, EnrichmentService};
use crate::{
    config::EnrichmentConfig,
    error::{AppError, AppResult},
    models::{EnrichmentResult, EnrichmentState, Entity, MediaEntity},
    repository::{EnrichmentRecord, EntityStore},
};

/// Counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BatchSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
    /// Entities passed over: not eligible, or already being enriched
    pub skipped: usize,
    /// Entities left untouched because the batch was cancelled
    pub cancelled: usize,
}

impl BatchSummary {
    fn record(&mut self, state: EnrichmentState) {
        match state {
            EnrichmentState::Succeeded => self.succeeded += 1,
            EnrichmentState::FailedRetryable => self.failed_retryable += 1,
            EnrichmentState::FailedPermanent => self.failed_permanent += 1,
        }
    }
}

type InFlight = Arc<Mutex<HashSet<i64>>>;

/// Marks an entity as being enriched until dropped
struct Claim {
    id: i64,
    in_flight: InFlight,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// A definitive outcome waiting to be written back
struct Finished {
    state: EnrichmentState,
    record: Option<EnrichmentRecord>,
    claim: Claim,
}

#[derive(Clone)]
pub struct EnrichmentScheduler {
    store: Arc<dyn EntityStore>,
    enrichment: EnrichmentService,
    workers: usize,
    batch_size: usize,
    retry_after: chrono::Duration,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
}

impl EnrichmentScheduler {
    pub fn new(store: Arc<dyn EntityStore>, enrichment: EnrichmentService, config: &EnrichmentConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            store,
            enrichment,
            workers,
            batch_size: config.batch_size.max(1),
            retry_after: chrono::Duration::seconds(config.retry_after_secs.max(0)),
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Enrich one batch of due entities
    pub async fn run_once(&self, cancel: &CancellationToken) -> AppResult<BatchSummary> {
        let retry_before = Utc::now() - self.retry_after;
        // Over-fetch by the in-flight count so busy entities don't shrink the batch
        let limit = self.batch_size + self.in_flight_count();
        let due = self.store.pending_enrichment(retry_before, limit).await?;
        if due.is_empty() {
            tracing::debug!("No entities due for cover enrichment");
            return Ok(BatchSummary::default());
        }

        let ids: Vec<i64> = due.iter().filter_map(|e| e.id()).collect();
        let (claimed, skipped) = self
            .claim(&ids, self.batch_size, |e| e.is_enrichment_due(retry_before))
            .await?;
        tracing::info!("Enriching {} entities with {} workers", claimed.len(), self.workers);
        Ok(self.run_batch(claimed, skipped, cancel).await)
    }

    /// Enrich specific entities now, e.g. right after an import.
    ///
    /// Entities that already have a cover or are marked permanent are skipped.
    pub async fn enrich_ids(&self, ids: &[i64], cancel: &CancellationToken) -> AppResult<BatchSummary> {
        let (claimed, skipped) = self
            .claim(ids, ids.len(), |e| !e.is_permanent_failure() && e.cover_image().is_none())
            .await?;
        Ok(self.run_batch(claimed, skipped, cancel).await)
    }

    /// Enrich one entity immediately, outside the worker pool.
    ///
    /// Unlike the batch paths an entity that already has a cover is looked up
    /// again; a failed attempt does not replace that cover.
    pub async fn enrich_one(&self, id: i64, cancel: &CancellationToken) -> AppResult<EnrichmentResult> {
        let claim = self
            .try_claim(id)
            .ok_or_else(|| AppError::Conflict(format!("Entity {} is already being enriched", id)))?;

        let mut entity = self.store.get(id).await?;
        if entity.is_permanent_failure() {
            let reason = entity
                .image_lookup()
                .and_then(|l| l.failure_reason.clone())
                .unwrap_or_else(|| "no usable identifier".to_string());
            return Err(AppError::PermanentFailure(format!("Entity {} is not retried: {}", id, reason)));
        }

        let result = self.enrichment.enrich(&mut entity, cancel).await?;
        if let Some(record) = EnrichmentRecord::from_entity(&entity) {
            self.store.record_enrichments(vec![record]).await?;
        }
        drop(claim);
        Ok(result)
    }

    /// Run `run_once` every `interval` until `cancel` fires
    pub fn spawn_periodic(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!("Cover enrichment scheduled every {:?}", interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match scheduler.run_once(&cancel).await {
                            Ok(summary) if summary.submitted > 0 => {
                                tracing::info!("Enrichment batch finished: {:?}", summary)
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Enrichment batch failed: {}", e),
                        }
                    }
                }
            }

            tracing::info!("Cover enrichment scheduler stopped");
        })
    }

    fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn try_claim(&self, id: i64) -> Option<Claim> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        inserted.then(|| Claim {
            id,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Claim up to `limit` of `ids`, re-reading each entity once claimed so a
    /// concurrent run that just finished it is seen.
    async fn claim(
        &self,
        ids: &[i64],
        limit: usize,
        eligible: impl Fn(&MediaEntity) -> bool,
    ) -> AppResult<(Vec<(MediaEntity, Claim)>, usize)> {
        let mut claimed = Vec::new();
        let mut skipped = 0;
        for &id in ids {
            if claimed.len() == limit {
                break;
            }
            let Some(claim) = self.try_claim(id) else {
                tracing::debug!("Entity {} is already being enriched", id);
                skipped += 1;
                continue;
            };
            let entity = self.store.get(id).await?;
            if eligible(&entity) {
                claimed.push((entity, claim));
            } else {
                skipped += 1;
            }
        }
        Ok((claimed, skipped))
    }

    async fn run_batch(
        &self,
        claimed: Vec<(MediaEntity, Claim)>,
        skipped: usize,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            submitted: claimed.len(),
            skipped,
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for (entity, claim) in claimed {
            let permits = self.permits.clone();
            let enrichment = self.enrichment.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    permit = permits.acquire_owned() => permit.ok()?,
                };
                enrich_entity(&enrichment, entity, claim, &cancel).await
            });
        }

        let mut finished = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(done)) => finished.push(done),
                Ok(None) => summary.cancelled += 1,
                Err(e) => {
                    tracing::error!("Enrichment worker failed: {}", e);
                    summary.failed_retryable += 1;
                }
            }
            if finished.len() >= self.workers || (tasks.is_empty() && !finished.is_empty()) {
                self.write_back(std::mem::take(&mut finished), &mut summary).await;
            }
        }

        summary
    }

    /// Store a group of outcomes, then release their entities
    async fn write_back(&self, finished: Vec<Finished>, summary: &mut BatchSummary) {
        let mut states = Vec::with_capacity(finished.len());
        let mut records = Vec::with_capacity(finished.len());
        let mut claims = Vec::with_capacity(finished.len());
        for done in finished {
            states.push(done.state);
            records.extend(done.record);
            claims.push(done.claim);
        }

        let saved = match self.store.record_enrichments(records).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save {} enrichment outcomes: {}", states.len(), e);
                false
            }
        };
        for state in states {
            summary.record(if saved { state } else { EnrichmentState::FailedRetryable });
        }
        drop(claims);
    }
}

/// `None` when cancelled before a definitive outcome
async fn enrich_entity(
    enrichment: &EnrichmentService,
    mut entity: MediaEntity,
    claim: Claim,
    cancel: &CancellationToken,
) -> Option<Finished> {
    let id = entity.id();
    match enrichment.enrich(&mut entity, cancel).await {
        Ok(result) => {
            tracing::debug!("Entity {:?} enrichment: {:?}", id, result.state);
            Some(Finished {
                state: result.state,
                record: EnrichmentRecord::from_entity(&entity),
                claim,
            })
        }
        Err(EnrichmentError::Cancelled) => {
            tracing::debug!("Enrichment of entity {:?} cancelled", id);
            None
        }
    }
}
