//! Features service client (item-to-item similarity)
//!
//! API: `POST {base}/similar_items?item_id=..&k=..` →
//! `{"item_id_2": [..], "track_seq": [..]}` where `track_seq` holds the
//! similarity score of the candidate at the same position. Unknown items come
//! back as empty columns.
//!
//! When a Redis cache is configured, lookups are read through it; the index is
//! static between deployments so entries only expire by TTL.

use std::time::Duration;

use reqwest::{Client as HttpClient, Url};

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{ScoredCandidate, SimilarItemsPayload, TrackId},
    services::providers::{parse_base_url, read_payload, SimilarityProvider},
};

#[derive(Clone)]
pub struct HttpSimilarityProvider {
    http_client: HttpClient,
    base_url: Url,
    cache: Option<Cache>,
    cache_ttl: u64,
}

impl HttpSimilarityProvider {
    pub fn new(base_url: &str, connect_timeout: Duration, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;

        let base_url = parse_base_url(base_url, "features")?;

        Ok(Self {
            http_client,
            base_url,
            cache: None,
            cache_ttl: 0,
        })
    }

    /// Reads lookups through `cache`, storing fresh results for `ttl` seconds
    pub fn with_cache(mut self, cache: Cache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    async fn fetch(&self, track_id: TrackId, limit: usize) -> AppResult<Vec<ScoredCandidate>> {
        let url = self
            .base_url
            .join("similar_items")
            .map_err(|e| AppError::Internal(format!("Failed to build features URL: {}", e)))?;

        let response = self
            .http_client
            .post(url)
            .query(&[("item_id", track_id.0.to_string()), ("k", limit.to_string())])
            .header("Accept", "application/json")
            .send()
            .await?;

        let payload: SimilarItemsPayload = read_payload(response, self.name()).await?;
        let candidates = convert_payload(payload, limit)?;

        tracing::debug!(
            track_id = %track_id,
            candidates = candidates.len(),
            provider = self.name(),
            "Similar items fetched"
        );

        Ok(candidates)
    }
}

/// Zips the id and score columns into candidates, keeping index order
fn convert_payload(payload: SimilarItemsPayload, limit: usize) -> AppResult<Vec<ScoredCandidate>> {
    if payload.item_id_2.len() != payload.track_seq.len() {
        return Err(AppError::MalformedResponse(format!(
            "similar items has {} ids but {} scores",
            payload.item_id_2.len(),
            payload.track_seq.len()
        )));
    }

    Ok(payload
        .item_id_2
        .into_iter()
        .zip(payload.track_seq)
        .take(limit)
        .map(|(track_id, score)| ScoredCandidate::new(track_id, score))
        .collect())
}

#[async_trait::async_trait]
impl SimilarityProvider for HttpSimilarityProvider {
    async fn similar_tracks(
        &self,
        track_id: TrackId,
        limit: usize,
    ) -> AppResult<Vec<ScoredCandidate>> {
        let key = CacheKey::SimilarItems {
            item_id: track_id,
            limit,
        };

        cached!(self.cache.as_ref(), key, self.cache_ttl, async move {
            self.fetch(track_id, limit).await
        })
    }

    fn name(&self) -> &'static str {
        "features"
    }
}
