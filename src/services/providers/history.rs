//! Listening history service client
//!
//! API: `POST {base}/get?user_id=..&k=..` → `{"track_id": [..], "track_seq": [..]}`,
//! most recent track first. Unknown users come back as empty columns.

use std::time::Duration;

use reqwest::{Client as HttpClient, Url};

use crate::{
    error::{AppError, AppResult},
    models::{HistoryPayload, TrackId, UserId},
    services::providers::{parse_base_url, read_payload, HistoryProvider},
};

#[derive(Clone)]
pub struct HttpHistoryProvider {
    http_client: HttpClient,
    base_url: Url,
}

impl HttpHistoryProvider {
    pub fn new(base_url: &str, connect_timeout: Duration, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;

        let base_url = parse_base_url(base_url, "history")?;

        Ok(Self {
            http_client,
            base_url,
        })
    }
}

#[async_trait::async_trait]
impl HistoryProvider for HttpHistoryProvider {
    async fn recent_tracks(&self, user_id: UserId, limit: usize) -> AppResult<Vec<TrackId>> {
        let url = self
            .base_url
            .join("get")
            .map_err(|e| AppError::Internal(format!("Failed to build history URL: {}", e)))?;

        let response = self
            .http_client
            .post(url)
            .query(&[("user_id", user_id.0.to_string()), ("k", limit.to_string())])
            .header("Accept", "application/json")
            .send()
            .await?;

        let payload: HistoryPayload = read_payload(response, self.name()).await?;

        let mut tracks = payload.track_id;
        tracks.truncate(limit);

        tracing::debug!(
            user_id = %user_id,
            tracks = tracks.len(),
            provider = self.name(),
            "History fetched"
        );

        Ok(tracks)
    }

    fn name(&self) -> &'static str {
        "history"
    }
}
