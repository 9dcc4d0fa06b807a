use crate::models::{Distance, IndexedPoint, ScoredPoint};
use crate::{EmbedError, StoreError};
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Width of every vector this model produces.
    async fn dimensions(&self) -> Result<usize, EmbedError>;

    /// Embeds `inputs`, returning one vector per input in input order.
    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[async_trait]
impl<M> EmbeddingModel for Box<M>
where
    M: EmbeddingModel + ?Sized,
{
    async fn dimensions(&self) -> Result<usize, EmbedError> {
        (**self).dimensions().await
    }

    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).encode(inputs).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionConfig {
    pub dimension: usize,
    pub distance: Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub dimension: usize,
    pub points_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// `None` when the collection does not exist.
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>, StoreError>;

    async fn create_collection(
        &self,
        collection: &str,
        config: CollectionConfig,
    ) -> Result<CreateOutcome, StoreError>;

    /// Writes `points`; an existing point with the same id is replaced.
    async fn upsert_points(&self, collection: &str, points: &[IndexedPoint]) -> Result<(), StoreError>;

    async fn search_points(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;
}
