use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{CandidateList, TrackId, UserId},
    services::{providers::OfflineRecommender, stats::ServiceStats},
};

/// One row of the personal recommendations table
#[derive(Debug, Deserialize)]
struct PersonalRow {
    user_id: UserId,
    track_id: TrackId,
    #[serde(default)]
    track_seq: Option<i64>,
}

/// One row of the top-popular fallback table
#[derive(Debug, Deserialize)]
struct DefaultRow {
    track_id: TrackId,
    #[serde(default)]
    track_seq: Option<i64>,
}

/// Precomputed recommendations, loaded once at startup
///
/// Lists keep the order they were stored in. The store is immutable after
/// construction, so concurrent lookups need no locking.
pub struct OfflineStore {
    personal: HashMap<UserId, CandidateList>,
    default: CandidateList,
    stats: Arc<ServiceStats>,
}

impl OfflineStore {
    /// Builds the store from `(user, track)` rows in stored order
    pub fn from_rows<I>(personal_rows: I, default: Vec<TrackId>, stats: Arc<ServiceStats>) -> Self
    where
        I: IntoIterator<Item = (UserId, TrackId)>,
    {
        let mut grouped: HashMap<UserId, Vec<TrackId>> = HashMap::new();
        for (user_id, track_id) in personal_rows {
            grouped.entry(user_id).or_default().push(track_id);
        }

        let personal = grouped
            .into_iter()
            .map(|(user_id, tracks)| (user_id, CandidateList::from_ordered(tracks)))
            .collect();

        Self {
            personal,
            default: CandidateList::from_ordered(default),
            stats,
        }
    }

    /// Loads both tables from JSON row files
    ///
    /// Personal rows look like `{"user_id": 1, "track_id": 2, "track_seq": 1}`,
    /// default rows like `{"track_id": 2, "track_seq": 1}`. Extra columns are
    /// ignored.
    ///
    /// When every row of a file carries `track_seq`, rows are ordered by it
    /// (ties keep file order), matching the PostgreSQL loader. Otherwise file
    /// order is the stored order.
    pub fn load_from_files(
        personal_path: &Path,
        default_path: &Path,
        stats: Arc<ServiceStats>,
    ) -> anyhow::Result<Self> {
        tracing::info!(path = %personal_path.display(), "Loading personal recommendations");
        let mut personal: Vec<PersonalRow> = read_rows(personal_path)?;
        order_by_seq(&mut personal, |row| row.track_seq);

        tracing::info!(path = %default_path.display(), "Loading default recommendations");
        let mut default: Vec<DefaultRow> = read_rows(default_path)?;
        order_by_seq(&mut default, |row| row.track_seq);

        let store = Self::from_rows(
            personal.into_iter().map(|row| (row.user_id, row.track_id)),
            default.into_iter().map(|row| row.track_id).collect(),
            stats,
        );
        store.log_loaded();
        Ok(store)
    }

    /// Loads both tables from PostgreSQL
    ///
    /// Expects `personal_recommendations(user_id, track_id, track_seq)` and
    /// `default_recommendations(track_id, track_seq)` with BIGINT ids; lists are
    /// ordered by `track_seq`.
    pub async fn load_from_postgres(pool: &PgPool, stats: Arc<ServiceStats>) -> AppResult<Self> {
        let personal: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, track_id
            FROM personal_recommendations
            ORDER BY user_id, track_seq
            "#,
        )
        .fetch_all(pool)
        .await?;

        let default: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT track_id
            FROM default_recommendations
            ORDER BY track_seq
            "#,
        )
        .fetch_all(pool)
        .await?;

        let store = Self::from_rows(
            personal
                .into_iter()
                .map(|(user_id, track_id)| (UserId(user_id), TrackId(track_id))),
            default.into_iter().map(|(track_id,)| TrackId(track_id)).collect(),
            stats,
        );
        store.log_loaded();
        Ok(store)
    }

    fn log_loaded(&self) {
        tracing::info!(
            users = self.personal_users(),
            default_len = self.default_len(),
            "Offline recommendations loaded"
        );
    }

    /// Personal list for `user_id` or the default list, cut to `limit`
    pub fn lookup(&self, user_id: UserId, limit: usize) -> CandidateList {
        match self.personal.get(&user_id) {
            Some(list) => {
                self.stats.record_offline_lookup(true);
                tracing::debug!(user_id = %user_id, "Personal recommendations found");
                list.clone().truncated(limit)
            }
            None => {
                self.stats.record_offline_lookup(false);
                tracing::debug!(user_id = %user_id, "No personal recommendations, using default");
                self.default.clone().truncated(limit)
            }
        }
    }

    pub fn personal_users(&self) -> usize {
        self.personal.len()
    }

    pub fn default_len(&self) -> usize {
        self.default.len()
    }
}

#[async_trait::async_trait]
impl OfflineRecommender for OfflineStore {
    async fn recommend(&self, user_id: UserId, limit: usize) -> AppResult<CandidateList> {
        Ok(self.lookup(user_id, limit))
    }
}

/// Stable-sorts rows by sequence number if all of them have one
fn order_by_seq<T>(rows: &mut [T], seq: impl Fn(&T) -> Option<i64>) {
    if rows.iter().all(|row| seq(row).is_some()) {
        rows.sort_by_key(|row| seq(row));
    }
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
