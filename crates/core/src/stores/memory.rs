use crate::error::StoreError;
use crate::models::{Distance, IndexedPoint, PointId, ScoredPoint};
use crate::traits::{CollectionConfig, CollectionInfo, CreateOutcome, VectorBackend};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

struct MemoryCollection {
    config: CollectionConfig,
    points: BTreeMap<PointId, IndexedPoint>,
}

/// In-process vector backend. Ties in score are broken by point id.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    creations: AtomicUsize,
}

impl MemoryStore {
    /// How many collections this store has created.
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }
}

fn missing(collection: &str) -> StoreError {
    StoreError::MissingCollection {
        collection: collection.to_string(),
    }
}

fn similarity(distance: Distance, left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
            let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
            if left_norm == 0.0 || right_norm == 0.0 {
                0.0
            } else {
                dot / (left_norm * right_norm)
            }
        }
    }
}

#[async_trait]
impl VectorBackend for MemoryStore {
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(|entry| CollectionInfo {
            dimension: entry.config.dimension,
            points_count: entry.points.len() as u64,
        }))
    }

    async fn create_collection(
        &self,
        collection: &str,
        config: CollectionConfig,
    ) -> Result<CreateOutcome, StoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        collections.insert(
            collection.to_string(),
            MemoryCollection {
                config,
                points: BTreeMap::new(),
            },
        );
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created)
    }

    async fn upsert_points(&self, collection: &str, points: &[IndexedPoint]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let entry = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        if let Some(point) = points
            .iter()
            .find(|point| point.vector.len() != entry.config.dimension)
        {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                configured: entry.config.dimension,
                requested: point.vector.len(),
            });
        }

        for point in points {
            entry.points.insert(point.id, point.clone());
        }
        Ok(())
    }

    async fn search_points(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let entry = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut hits: Vec<ScoredPoint> = entry
            .points
            .values()
            .map(|point| ScoredPoint {
                id: point.id.to_string(),
                score: similarity(entry.config.distance, vector, &point.vector),
                payload: point.payload.clone(),
            })
            .filter(|hit| score_threshold.map_or(true, |threshold| hit.score >= threshold))
            .collect();

        // stable sort keeps id order among equal scores
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn point(seed: u8, vector: Vec<f32>) -> IndexedPoint {
        IndexedPoint {
            id: PointId(Uuid::from_bytes([seed; 16])),
            vector,
            payload: json!({ "seed": seed }),
        }
    }

    #[tokio::test]
    async fn second_create_reports_existing() {
        let store = MemoryStore::default();
        let config = CollectionConfig {
            dimension: 2,
            distance: Distance::Cosine,
        };
        assert_eq!(store.create_collection("a", config).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            store.create_collection("a", config).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn equal_scores_are_ordered_by_id() {
        let store = MemoryStore::default();
        store
            .create_collection(
                "a",
                CollectionConfig {
                    dimension: 2,
                    distance: Distance::Dot,
                },
            )
            .await
            .unwrap();
        store
            .upsert_points("a", &[point(9, vec![1.0, 0.0]), point(3, vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search_points("a", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].payload["seed"], 3);
        assert_eq!(hits[1].payload["seed"], 9);
    }

    #[tokio::test]
    async fn wrong_width_is_rejected() {
        let store = MemoryStore::default();
        store
            .create_collection(
                "a",
                CollectionConfig {
                    dimension: 3,
                    distance: Distance::Cosine,
                },
            )
            .await
            .unwrap();
        let error = store.upsert_points("a", &[point(1, vec![1.0])]).await.unwrap_err();
        assert!(matches!(error, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn missing_collection_is_an_error() {
        let store = MemoryStore::default();
        assert!(store.collection_info("nope").await.unwrap().is_none());
        assert!(store.search_points("nope", &[1.0], 1, None).await.is_err());
    }
}
