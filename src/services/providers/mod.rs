//! Collaborator interfaces consumed by the recommendation composer
//!
//! Each collaborator is a typed client returning `AppResult`. Callers decide
//! how a failure degrades; in this service every failure becomes an empty
//! sub-result, so fakes that return errors exercise the same paths as a dead
//! upstream.

use std::future::Future;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    models::{CandidateList, ScoredCandidate, TrackId, UserId},
};

pub mod history;
pub mod similarity;

pub use history::HttpHistoryProvider;
pub use similarity::HttpSimilarityProvider;

/// Source of a user's recent listening history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Returns up to `limit` track ids, most recent first
    async fn recent_tracks(&self, user_id: UserId, limit: usize) -> AppResult<Vec<TrackId>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Item-to-item similarity index
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SimilarityProvider: Send + Sync {
    /// Returns up to `limit` candidates similar to `track_id`, in index order
    async fn similar_tracks(
        &self,
        track_id: TrackId,
        limit: usize,
    ) -> AppResult<Vec<ScoredCandidate>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Precomputed per-user lists with a global fallback
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OfflineRecommender: Send + Sync {
    /// Returns the user's personal list, or the default list, cut to `limit`
    async fn recommend(&self, user_id: UserId, limit: usize) -> AppResult<CandidateList>;
}

/// Runs an upstream call under a deadline
///
/// An elapsed deadline becomes `AppError::UpstreamTimeout`; the call itself is
/// dropped, not awaited.
pub async fn call_with_timeout<T, F>(deadline: Duration, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::UpstreamTimeout(deadline)),
    }
}

/// Parses a collaborator base URL so endpoint paths join beneath it
///
/// `Url::join` replaces the last path segment unless the path ends in `/`,
/// so `http://gw/history` becomes `http://gw/history/` here and `get` joins
/// to `http://gw/history/get`.
pub(crate) fn parse_base_url(raw: &str, upstream: &'static str) -> AppResult<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| AppError::Internal(format!("Invalid {} service URL: {}", upstream, e)))?;

    if url.cannot_be_a_base() {
        return Err(AppError::Internal(format!(
            "Invalid {} service URL: {} cannot be a base",
            upstream, raw
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Decodes a collaborator response into `T`, classifying failures
///
/// 404 is `NotFound`, any other non-2xx is `UpstreamUnavailable`, and a body
/// that does not decode is `MalformedResponse`.
pub(crate) async fn read_payload<T: DeserializeOwned>(
    response: reqwest::Response,
    upstream: &'static str,
) -> AppResult<T> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(format!("{} has no entry", upstream)));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::UpstreamUnavailable(format!(
            "{} returned status {}: {}",
            upstream, status, body
        )));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::debug!(upstream, body = %body, "Undecodable upstream body");
        AppError::MalformedResponse(format!("{} payload: {}", upstream, e))
    })
}
