use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::AppError,
    models::{CandidateList, UserId},
    services::{
        blend::blend,
        online::OnlineAssembler,
        providers::{call_with_timeout, OfflineRecommender},
        stats::{RequestKind, ServiceStats},
    },
};

/// Composes offline and online recommendations into one response
///
/// Every entry point returns a list, never an error: upstream trouble shows
/// up only as a shorter (possibly empty) result.
#[derive(Clone)]
pub struct Recommender {
    offline: Arc<dyn OfflineRecommender>,
    online: OnlineAssembler,
    call_timeout: Duration,
    stats: Arc<ServiceStats>,
}

impl Recommender {
    pub fn new(
        offline: Arc<dyn OfflineRecommender>,
        online: OnlineAssembler,
        call_timeout: Duration,
        stats: Arc<ServiceStats>,
    ) -> Self {
        Self {
            offline,
            online,
            call_timeout,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<ServiceStats> {
        &self.stats
    }

    /// Precomputed list for the user, or the global default, cut to `k`
    pub async fn offline(&self, user_id: UserId, k: usize) -> CandidateList {
        self.stats.record_request(RequestKind::Offline);
        self.offline_list(user_id, k).await
    }

    /// History-based list for the user, cut to `k`
    pub async fn online(&self, user_id: UserId, k: usize) -> CandidateList {
        self.stats.record_request(RequestKind::Online);
        self.online.assemble(user_id, k).await.truncated(k)
    }

    /// Offline and online lists interleaved, deduplicated and cut to `k`
    ///
    /// Both lists are computed concurrently. The online list is kept whole
    /// until the final cut so deduplication can backfill from it.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, k = k))]
    pub async fn blended(&self, user_id: UserId, k: usize) -> CandidateList {
        self.stats.record_request(RequestKind::Blended);

        if k == 0 {
            return CandidateList::new();
        }

        let (offline, online) =
            tokio::join!(self.offline_list(user_id, k), self.online.assemble(user_id, k));

        let blended = blend(&offline, &online, k);

        tracing::info!(
            offline = offline.len(),
            online = online.len(),
            blended = blended.len(),
            "Generated blended recommendations"
        );

        blended
    }

    async fn offline_list(&self, user_id: UserId, k: usize) -> CandidateList {
        if k == 0 {
            return CandidateList::new();
        }

        match call_with_timeout(self.call_timeout, self.offline.recommend(user_id, k)).await {
            Ok(list) => list.truncated(k),
            Err(e) => {
                if matches!(e, AppError::UpstreamTimeout(_)) {
                    self.stats.record_timeout();
                }
                tracing::warn!(user_id = %user_id, error = %e, "Offline lookup failed, using empty list");
                CandidateList::new()
            }
        }
    }
}
