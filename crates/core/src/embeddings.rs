use crate::error::EmbedError;
use crate::retry::RetryPolicy;
use crate::traits::EmbeddingModel;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const DEFAULT: usize = 384;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Local hashed character-trigram model. Deterministic and dependency free,
/// used when no embedding endpoint is configured and in tests.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingModel for CharacterNgramEmbedder {
    async fn dimensions(&self) -> Result<usize, EmbedError> {
        Ok(self.dimensions.max(1))
    }

    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(inputs.iter().map(|input| self.embed(input)).collect())
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: OnceCell<usize>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(EmbedError::InvalidConfig("missing embedding model name".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(EmbedError::InvalidConfig(format!(
                "embedding endpoint must be an http(s) url: {base_url}"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|error| EmbedError::InvalidConfig(format!("invalid api key: {error}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions: OnceCell::new(),
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::BackendResponse {
                status: status.as_u16(),
                details,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(EmbedError::CountMismatch {
                expected: inputs.len(),
                actual: parsed.data.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbedder {
    async fn dimensions(&self) -> Result<usize, EmbedError> {
        self.dimensions
            .get_or_try_init(|| async {
                let sample = self.request(&["dimension check".to_string()]).await?;
                let width = sample.first().map(Vec::len).unwrap_or_default();
                info!(model = %self.model, dimensions = width, "detected embedding dimensions");
                Ok::<usize, EmbedError>(width)
            })
            .await
            .copied()
    }

    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.request(inputs).await
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embeds arbitrarily many inputs in bounded batches.
pub struct BatchEmbedder<M> {
    model: M,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<M: EmbeddingModel> BatchEmbedder<M> {
    pub fn new(model: M, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            model,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn dimensions(&self) -> Result<usize, EmbedError> {
        self.retry
            .run("embedding dimensions", || self.model.dimensions())
            .await
    }

    /// Returns one vector per input, in input order.
    pub async fn embed_all(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let expected = self.dimensions().await?;
        let total_batches = inputs.len().div_ceil(self.batch_size);
        let mut vectors = Vec::with_capacity(inputs.len());

        for (batch_index, batch) in inputs.chunks(self.batch_size).enumerate() {
            let start = batch_index * self.batch_size;
            let end = start + batch.len();
            let fail = |source: EmbedError| EmbedError::BatchFailed {
                batch_index,
                start,
                end,
                source: Box::new(source),
            };

            let embedded = self
                .retry
                .run("embedding batch", || self.model.encode(batch))
                .await
                .map_err(fail)?;

            if embedded.len() != batch.len() {
                return Err(fail(EmbedError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                }));
            }
            if let Some(vector) = embedded.iter().find(|vector| vector.len() != expected) {
                return Err(fail(EmbedError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                }));
            }

            debug!(batch = batch_index + 1, total_batches, "embedded batch");
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Storage mapping conversion");
        let second = embedder.embed("Storage mapping conversion");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    /// Records batch sizes and fails the first `failures` calls with a 503.
    struct RecordingModel {
        dimensions: usize,
        batches: Mutex<Vec<usize>>,
        failures: AtomicUsize,
        wrong_width: bool,
    }

    impl RecordingModel {
        fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                batches: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
                wrong_width: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingModel for RecordingModel {
        async fn dimensions(&self) -> Result<usize, EmbedError> {
            Ok(self.dimensions)
        }

        async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EmbedError::BackendResponse {
                    status: 503,
                    details: "busy".to_string(),
                });
            }
            self.batches.lock().unwrap().push(inputs.len());
            let width = if self.wrong_width { self.dimensions + 1 } else { self.dimensions };
            Ok(inputs
                .iter()
                .map(|input| {
                    let mut vector = vec![0.0; width];
                    vector[0] = input.len() as f32;
                    vector
                })
                .collect())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn inputs(count: usize) -> Vec<String> {
        (0..count).map(|index| "x".repeat(index + 1)).collect()
    }

    #[tokio::test]
    async fn batches_are_bounded_and_order_is_preserved() {
        let embedder = BatchEmbedder::new(RecordingModel::new(4), 3, fast_retry());
        let vectors = embedder.embed_all(&inputs(7)).await.unwrap();

        assert_eq!(vectors.len(), 7);
        for (index, vector) in vectors.iter().enumerate() {
            assert_eq!(vector[0], (index + 1) as f32);
        }
        assert_eq!(*embedder.model.batches.lock().unwrap(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let model = RecordingModel::new(4);
        model.failures.store(2, Ordering::SeqCst);
        let embedder = BatchEmbedder::new(model, 10, fast_retry());

        let vectors = embedder.embed_all(&inputs(2)).await.unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_name_the_batch() {
        let model = RecordingModel::new(4);
        model.failures.store(10, Ordering::SeqCst);
        let embedder = BatchEmbedder::new(model, 2, fast_retry());

        let error = embedder.embed_all(&inputs(3)).await.unwrap_err();
        match error {
            EmbedError::BatchFailed {
                batch_index,
                start,
                end,
                ..
            } => {
                assert_eq!(batch_index, 0);
                assert_eq!((start, end), (0, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn dimension_disagreement_fails_loudly() {
        let mut model = RecordingModel::new(4);
        model.wrong_width = true;
        let embedder = BatchEmbedder::new(model, 2, fast_retry());

        let error = embedder.embed_all(&inputs(1)).await.unwrap_err();
        assert!(matches!(
            error,
            EmbedError::BatchFailed { source, .. }
                if matches!(*source, EmbedError::DimensionMismatch { expected: 4, actual: 5 })
        ));
    }

    #[tokio::test]
    async fn local_model_reports_its_width() {
        let embedder = BatchEmbedder::new(CharacterNgramEmbedder { dimensions: 16 }, 8, RetryPolicy::none());
        assert_eq!(embedder.dimensions().await.unwrap(), 16);
        let vectors = embedder.embed_all(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), 16);
    }

    #[test]
    fn http_embedder_rejects_bad_urls() {
        let result = HttpEmbedder::new("localhost:8080", "all-MiniLM-L6-v2", None, Duration::from_secs(5));
        assert!(matches!(result, Err(EmbedError::InvalidConfig(_))));
    }
}
