use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod candidates;

pub use candidates::{CandidateList, ScoredCandidate};

/// Opaque identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub i64);

/// Opaque identifier for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TrackId {
    fn from(id: i64) -> Self {
        TrackId(id)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

// ============================================================================
// Composer API Types
// ============================================================================

/// Query parameters accepted by every recommendation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationQuery {
    pub user_id: UserId,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub k: Option<i64>,
}

/// Body returned by every recommendation endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationsResponse {
    pub recs: Vec<TrackId>,
}

impl From<CandidateList> for RecommendationsResponse {
    fn from(list: CandidateList) -> Self {
        Self {
            recs: list.into_vec(),
        }
    }
}

// ============================================================================
// Upstream Wire Types
// ============================================================================

/// Response of the history service `POST /get`
///
/// `track_seq` is the listening ordinal; only the track order matters here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPayload {
    #[serde(default)]
    pub track_id: Vec<TrackId>,
    #[serde(default)]
    pub track_seq: Vec<i64>,
}

/// Response of the features service `POST /similar_items`
///
/// Two parallel columns: candidate ids and their similarity scores.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarItemsPayload {
    #[serde(default)]
    pub item_id_2: Vec<TrackId>,
    #[serde(default)]
    pub track_seq: Vec<f64>,
}
