use crate::error::StoreError;
use crate::models::{IndexedPoint, ScoredPoint};
use crate::traits::{CollectionConfig, CollectionInfo, CreateOutcome, VectorBackend};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const BACKEND: &str = "qdrant";

/// Qdrant over its REST API.
pub struct QdrantStore {
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StoreError::Request(format!(
                "qdrant endpoint must be http(s): {endpoint}"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client,
        })
    }

    /// `<endpoint>/collections/<collection>/<rest..>` with every segment
    /// percent-encoded, so a collection name always stays one path segment.
    fn collection_url(&self, collection: &str, rest: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Request(format!("qdrant endpoint cannot hold a path: {}", self.endpoint)))?
            .pop_if_empty()
            .push("collections")
            .push(collection)
            .extend(rest);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn failure(response: Response) -> StoreError {
        let status = response.status().as_u16();
        let details = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            status,
            details,
        }
    }
}

fn point_json(point: &IndexedPoint) -> Value {
    json!({
        "id": point.id,
        "vector": point.vector,
        "payload": point.payload,
    })
}

fn parse_hits(body: &Value) -> Vec<ScoredPoint> {
    body.pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| ScoredPoint {
                    id: match hit.get("id") {
                        Some(Value::String(id)) => id.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    },
                    score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                    payload: hit.get("payload").cloned().unwrap_or(Value::Null),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_info(body: &Value) -> CollectionInfo {
    let vectors = body.pointer("/result/config/params/vectors");
    // unnamed vectors carry `size` directly, named ones nest one level deeper
    let dimension = vectors
        .and_then(|vectors| vectors.get("size"))
        .or_else(|| {
            vectors
                .and_then(Value::as_object)
                .and_then(|named| named.values().find_map(|entry| entry.get("size")))
        })
        .and_then(Value::as_u64)
        .unwrap_or_default() as usize;
    let points_count = body
        .pointer("/result/points_count")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    CollectionInfo {
        dimension,
        points_count,
    }
}

#[async_trait]
impl VectorBackend for QdrantStore {
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let url = self.collection_url(collection, &[])?;
        let response = self.request(reqwest::Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let body: Value = response.json().await?;
        Ok(Some(parse_info(&body)))
    }

    async fn create_collection(
        &self,
        collection: &str,
        config: CollectionConfig,
    ) -> Result<CreateOutcome, StoreError> {
        let url = self.collection_url(collection, &[])?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&json!({
                "vectors": {
                    "size": config.dimension,
                    "distance": config.distance.as_str(),
                }
            }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn upsert_points(&self, collection: &str, points: &[IndexedPoint]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut url = self.collection_url(collection, &["points"])?;
        url.query_pairs_mut().append_pair("wait", "true");
        let body = json!({ "points": points.iter().map(point_json).collect::<Vec<_>>() });
        let response = self.request(reqwest::Method::PUT, url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
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
        let url = self.collection_url(collection, &["points", "search"])?;
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }

        let response = self.request(reqwest::Method::POST, url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let parsed: Value = response.json().await?;
        Ok(parse_hits(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::point_id;

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(QdrantStore::new("ftp://localhost:6333", None, Duration::from_secs(1)).is_err());
        assert!(QdrantStore::new("not a url", None, Duration::from_secs(1)).is_err());
        assert!(QdrantStore::new("http://localhost:6333/", None, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn urls_do_not_double_slashes() {
        let store = QdrantStore::new("http://localhost:6333/", None, Duration::from_secs(1)).unwrap();
        let url = store.collection_url("docs", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:6333/collections/docs");

        let nested = QdrantStore::new("http://proxy:8080/qdrant", None, Duration::from_secs(1)).unwrap();
        let url = nested.collection_url("docs", &["points", "search"]).unwrap();
        assert_eq!(url.as_str(), "http://proxy:8080/qdrant/collections/docs/points/search");
    }

    #[test]
    fn collection_names_stay_one_segment() {
        let store = QdrantStore::new("http://localhost:6333", None, Duration::from_secs(1)).unwrap();
        let url = store.collection_url("a/../b?x#y", &["points"]).unwrap();
        assert_eq!(url.path(), "/collections/a%2F..%2Fb%3Fx%23y/points");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn points_serialize_with_uuid_ids() {
        let id = point_id("guides/flipper.md", 0);
        let value = point_json(&IndexedPoint {
            id,
            vector: vec![0.5],
            payload: json!({ "content": "x" }),
        });
        assert_eq!(value["id"], json!(id.to_string()));
        assert_eq!(value["payload"]["content"], "x");
    }

    #[test]
    fn parses_collection_info_and_hits() {
        let info = parse_info(&json!({
            "result": {
                "points_count": 12,
                "config": { "params": { "vectors": { "size": 384, "distance": "Cosine" } } }
            }
        }));
        assert_eq!(
            info,
            CollectionInfo {
                dimension: 384,
                points_count: 12
            }
        );

        let hits = parse_hits(&json!({
            "result": [
                { "id": "abc", "score": 0.9, "payload": { "content": "first" } },
                { "id": 7, "score": 0.5 }
            ]
        }));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "abc");
        assert_eq!(hits[1].id, "7");
        assert_eq!(hits[1].payload, Value::Null);
    }
}
