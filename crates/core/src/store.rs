use crate::error::StoreError;
use crate::models::{Distance, IndexedPoint, ScoredPoint};
use crate::retry::RetryPolicy;
use crate::traits::{CollectionConfig, CreateOutcome, VectorBackend};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertSummary {
    pub points: usize,
    pub batches: usize,
}

/// Collection-scoped access to a vector backend.
pub struct VectorGateway<B> {
    backend: B,
    collection: String,
    batch_size: usize,
    retry: RetryPolicy,
    create_lock: Mutex<()>,
}

impl<B: VectorBackend> VectorGateway<B> {
    pub fn new(backend: B, collection: impl Into<String>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            backend,
            collection: collection.into(),
            batch_size: batch_size.max(1),
            retry,
            create_lock: Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates the collection when missing. A collection that already exists
    /// with a different dimension is an error.
    pub async fn ensure_collection(&self, dimension: usize, distance: Distance) -> Result<(), StoreError> {
        let _guard = self.create_lock.lock().await;
        let collection = self.collection.as_str();

        if let Some(info) = self
            .retry
            .run("collection info", || self.backend.collection_info(collection))
            .await?
        {
            return self.check_dimension(info.dimension, dimension);
        }

        let config = CollectionConfig { dimension, distance };
        let outcome = self
            .retry
            .run("create collection", || self.backend.create_collection(collection, config))
            .await?;

        match outcome {
            CreateOutcome::Created => {
                info!(collection, dimension, distance = distance.as_str(), "created collection");
                Ok(())
            }
            CreateOutcome::AlreadyExists => {
                let info = self
                    .backend
                    .collection_info(collection)
                    .await?
                    .ok_or_else(|| StoreError::MissingCollection {
                        collection: collection.to_string(),
                    })?;
                self.check_dimension(info.dimension, dimension)
            }
        }
    }

    fn check_dimension(&self, configured: usize, requested: usize) -> Result<(), StoreError> {
        if configured != requested {
            return Err(StoreError::DimensionMismatch {
                collection: self.collection.clone(),
                configured,
                requested,
            });
        }
        Ok(())
    }

    /// Writes `points` in batches; batches run in order and the first
    /// exhausted batch stops the upsert.
    pub async fn upsert(&self, points: &[IndexedPoint]) -> Result<UpsertSummary, StoreError> {
        let total_batches = points.len().div_ceil(self.batch_size);
        let collection = self.collection.as_str();

        for (batch_index, batch) in points.chunks(self.batch_size).enumerate() {
            self.retry
                .run("upsert batch", || self.backend.upsert_points(collection, batch))
                .await
                .map_err(|source| StoreError::BatchFailed {
                    batch_index,
                    remaining: total_batches - batch_index - 1,
                    source: Box::new(source),
                })?;
            debug!(collection, batch = batch_index + 1, total_batches, "upserted batch");
        }

        Ok(UpsertSummary {
            points: points.len(),
            batches: total_batches,
        })
    }

    /// Top `limit` points by descending score. Equal scores keep backend order.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let collection = self.collection.as_str();
        let mut hits = self
            .retry
            .run("search", || {
                self.backend.search_points(collection, vector, limit, score_threshold)
            })
            .await?;

        if let Some(threshold) = score_threshold {
            hits.retain(|hit| hit.score >= threshold);
        }
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Number of stored points; zero when the collection does not exist.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let collection = self.collection.as_str();
        let info = self
            .retry
            .run("collection info", || self.backend.collection_info(collection))
            .await?;
        Ok(info.map(|info| info.points_count).unwrap_or_default())
    }
}
