//! In-memory entity store with an optional JSON snapshot

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::{EnrichmentRecord, EntityStore};
use crate::{
    error::{AppError, AppResult},
    models::{Category, Entity, MediaEntity},
};

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    next_id: i64,
    entities: Vec<MediaEntity>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    next_id: i64,
    entities: Vec<&'a MediaEntity>,
}

/// Entities kept in a `BTreeMap`, optionally mirrored to a JSON snapshot.
///
/// A mutation is staged, written to the snapshot, and only then committed to
/// the map, so a failed write leaves memory and disk in the same state.
/// Mutations are serialized by `writer`; readers are only blocked while a
/// staged change is committed, never during file I/O.
pub struct InMemoryEntityStore {
    entities: RwLock<BTreeMap<i64, MediaEntity>>,
    next_id: AtomicI64,
    snapshot_path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            snapshot_path: None,
            writer: Mutex::new(()),
        }
    }

    /// Open a store backed by `path`, loading it when it exists
    pub async fn with_snapshot(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|e| {
                AppError::Internal(format!("Invalid snapshot {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        let mut entities = BTreeMap::new();
        for entity in snapshot.entities {
            let id = entity
                .id()
                .ok_or_else(|| AppError::Internal(format!("Entity without id in snapshot {}", path.display())))?;
            entities.insert(id, entity);
        }
        let next_id = entities
            .keys()
            .next_back()
            .map_or(1, |max| max + 1)
            .max(snapshot.next_id);

        tracing::info!("Loaded {} entities from {}", entities.len(), path.display());

        Ok(Self {
            entities: RwLock::new(entities),
            next_id: AtomicI64::new(next_id),
            snapshot_path: Some(path),
            writer: Mutex::new(()),
        })
    }

    /// Write the committed entities overlaid with `staged`.
    ///
    /// Callers hold `writer`, so the map cannot change until they commit.
    async fn persist_staged(&self, next_id: i64, staged: &BTreeMap<i64, MediaEntity>) -> AppResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let bytes = {
            let committed = self.entities.read().await;
            let mut entities: Vec<&MediaEntity> = committed
                .iter()
                .map(|(id, entity)| staged.get(id).unwrap_or(entity))
                .collect();
            entities.extend(
                staged
                    .iter()
                    .filter(|(id, _)| !committed.contains_key(id))
                    .map(|(_, entity)| entity),
            );
            serde_json::to_vec_pretty(&SnapshotRef { next_id, entities })?
        };
        write_atomically(path, &bytes).await
    }

    async fn commit(&self, staged: BTreeMap<i64, MediaEntity>) {
        self.entities.write().await.extend(staged);
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn insert_many(&self, entities: Vec<MediaEntity>) -> AppResult<Vec<i64>> {
        let _writer = self.writer.lock().await;

        let first_id = self.next_id.load(Ordering::SeqCst);
        let mut staged = BTreeMap::new();
        let mut ids = Vec::with_capacity(entities.len());
        for (id, mut entity) in (first_id..).zip(entities) {
            entity.common_mut().id = Some(id);
            staged.insert(id, entity);
            ids.push(id);
        }
        let next_id = first_id + ids.len() as i64;

        self.persist_staged(next_id, &staged).await?;
        self.commit(staged).await;
        self.next_id.store(next_id, Ordering::SeqCst);

        tracing::debug!("Inserted {} entities", ids.len());
        Ok(ids)
    }

    async fn get(&self, id: i64) -> AppResult<MediaEntity> {
        self.entities
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Entity with id {} not found", id)))
    }

    async fn list(&self, category: Option<Category>) -> AppResult<Vec<MediaEntity>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| category.map_or(true, |c| e.category() == c))
            .cloned()
            .collect())
    }

    async fn record_enrichments(&self, records: Vec<EnrichmentRecord>) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _writer = self.writer.lock().await;

        let mut staged = BTreeMap::new();
        {
            let committed = self.entities.read().await;
            for record in records {
                let id = record.id;
                let mut entity = match staged.remove(&id) {
                    Some(entity) => entity,
                    None => committed
                        .get(&id)
                        .cloned()
                        .ok_or_else(|| AppError::NotFound(format!("Entity with id {} not found", id)))?,
                };
                if !record.apply_to(&mut entity) {
                    tracing::debug!("Entity {} already has a cover, failed attempt not recorded", id);
                }
                staged.insert(id, entity);
            }
        }

        self.persist_staged(self.next_id.load(Ordering::SeqCst), &staged).await?;
        self.commit(staged).await;
        Ok(())
    }

    async fn pending_enrichment(&self, retry_before: DateTime<Utc>, limit: usize) -> AppResult<Vec<MediaEntity>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| e.is_enrichment_due(retry_before))
            .take(limit)
            .cloned()
            .collect())
    }
}
