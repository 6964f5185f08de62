use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::AppError,
    models::{CandidateList, ScoredCandidate, TrackId, UserId},
    services::{
        providers::{call_with_timeout, HistoryProvider, SimilarityProvider},
        stats::ServiceStats,
    },
};

/// Builds request-time recommendations from recent history
///
/// Seeds are the user's most recent tracks; each seed is expanded through the
/// similarity index and all candidates are ranked together by score. Every
/// upstream failure is absorbed here: the worst outcome is an empty list.
#[derive(Clone)]
pub struct OnlineAssembler {
    history: Arc<dyn HistoryProvider>,
    similarity: Arc<dyn SimilarityProvider>,
    history_k: usize,
    call_timeout: Duration,
    stats: Arc<ServiceStats>,
}

impl OnlineAssembler {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        similarity: Arc<dyn SimilarityProvider>,
        history_k: usize,
        call_timeout: Duration,
        stats: Arc<ServiceStats>,
    ) -> Self {
        Self {
            history,
            similarity,
            history_k,
            call_timeout,
            stats,
        }
    }

    /// Returns the full ranked, deduplicated candidate list for `user_id`
    ///
    /// `k` bounds each similarity lookup, not the result; callers cut the
    /// list to their own limit.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, k = k))]
    pub async fn assemble(&self, user_id: UserId, k: usize) -> CandidateList {
        if k == 0 {
            return CandidateList::new();
        }

        let seeds = self.recent_history(user_id).await;
        if seeds.is_empty() {
            return CandidateList::new();
        }

        let batches = self.fan_out(&seeds, k).await;
        let ranked = rank_candidates(batches);

        tracing::debug!(
            seeds = seeds.len(),
            candidates = ranked.len(),
            "Online candidates assembled"
        );

        ranked
    }

    async fn recent_history(&self, user_id: UserId) -> Vec<TrackId> {
        let lookup = call_with_timeout(
            self.call_timeout,
            self.history.recent_tracks(user_id, self.history_k),
        )
        .await;

        match lookup {
            Ok(mut tracks) if !tracks.is_empty() => {
                tracks.truncate(self.history_k);
                tracks
            }
            Ok(_) => {
                tracing::debug!("No history for user");
                self.stats.record_history_empty();
                Vec::new()
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("No history for user");
                self.stats.record_history_empty();
                Vec::new()
            }
            Err(e) => {
                if e.is_upstream() {
                    tracing::warn!(error = %e, "History lookup failed, skipping online recommendations");
                } else {
                    tracing::error!(error = %e, "History provider error, skipping online recommendations");
                }
                self.note_upstream_failure(&e);
                self.stats.record_history_failure();
                Vec::new()
            }
        }
    }

    /// Queries the similarity index once per seed, concurrently
    ///
    /// Batches come back in seed order whatever order the calls complete in,
    /// which keeps the later stable sort deterministic. Failed seeds are
    /// skipped.
    async fn fan_out(&self, seeds: &[TrackId], k: usize) -> Vec<Vec<ScoredCandidate>> {
        let mut tasks = Vec::with_capacity(seeds.len());

        for &track_id in seeds {
            let provider = Arc::clone(&self.similarity);
            let deadline = self.call_timeout;
            let task = tokio::spawn(async move {
                call_with_timeout(deadline, provider.similar_tracks(track_id, k)).await
            });
            tasks.push((track_id, task));
        }

        let mut batches = Vec::with_capacity(tasks.len());
        let mut failed = 0usize;

        for (track_id, task) in tasks {
            match task.await {
                Ok(Ok(candidates)) => batches.push(candidates),
                Ok(Err(e)) if e.is_not_found() => {
                    tracing::debug!(track_id = %track_id, "No similar items for track");
                }
                Ok(Err(e)) => {
                    if e.is_upstream() {
                        tracing::warn!(track_id = %track_id, error = %e, "Similar items lookup failed");
                    } else {
                        tracing::error!(track_id = %track_id, error = %e, "Similarity provider error");
                    }
                    self.note_upstream_failure(&e);
                    self.stats.record_similarity_failure();
                    failed += 1;
                }
                Err(e) => {
                    tracing::error!(track_id = %track_id, error = %e, "Task join error");
                    self.stats.record_similarity_failure();
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                success_count = batches.len(),
                error_count = failed,
                "Partial similar items failure"
            );
        }

        batches
    }

    fn note_upstream_failure(&self, error: &AppError) {
        if matches!(error, AppError::UpstreamTimeout(_)) {
            self.stats.record_timeout();
        }
    }
}

/// Pools candidate batches and ranks them by score, best first
///
/// The sort is stable, so equal scores keep pooling order: seed order first,
/// then the order the index returned them. Non-finite scores cannot be ranked
/// and are dropped. A track reached from several seeds keeps its first
/// (highest ranked) position.
pub fn rank_candidates(batches: Vec<Vec<ScoredCandidate>>) -> CandidateList {
    let mut pooled: Vec<ScoredCandidate> = batches
        .into_iter()
        .flatten()
        .filter(|candidate| candidate.score.is_finite())
        .collect();

    pooled.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    CandidateList::from_ordered(pooled.into_iter().map(|candidate| candidate.track_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::services::providers::{MockHistoryProvider, MockSimilarityProvider};
    use mockall::predicate::{always, eq};

    fn scored(id: i64, score: f64) -> ScoredCandidate {
        ScoredCandidate::new(TrackId(id), score)
    }

    fn ids(list: &CandidateList) -> Vec<i64> {
        list.iter().map(|id| id.0).collect()
    }

    fn history_returning(tracks: Vec<i64>) -> MockHistoryProvider {
        let mut history = MockHistoryProvider::new();
        history
            .expect_recent_tracks()
            .returning(move |_, _| Ok(tracks.iter().copied().map(TrackId).collect()));
        history
    }

    fn assembler(
        history: impl HistoryProvider + 'static,
        similarity: impl SimilarityProvider + 'static,
        stats: Arc<ServiceStats>,
    ) -> OnlineAssembler {
        OnlineAssembler::new(
            Arc::new(history),
            Arc::new(similarity),
            3,
            Duration::from_millis(200),
            stats,
        )
    }

    #[test]
    fn test_rank_candidates_sorts_by_score_descending() {
        let ranked = rank_candidates(vec![
            vec![scored(1, 0.2), scored(2, 0.9)],
            vec![scored(3, 0.5)],
        ]);
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
    }

    #[test]
    fn test_rank_candidates_tie_keeps_pooling_order() {
        let ranked = rank_candidates(vec![
            vec![scored(10, 0.5), scored(11, 0.5)],
            vec![scored(20, 0.5), scored(21, 0.7)],
        ]);
        assert_eq!(ids(&ranked), vec![21, 10, 11, 20]);
    }

    #[test]
    fn test_rank_candidates_keeps_best_occurrence() {
        let ranked = rank_candidates(vec![
            vec![scored(5, 0.3), scored(6, 0.4)],
            vec![scored(5, 0.95)],
        ]);
        assert_eq!(ids(&ranked), vec![5, 6]);
    }

    #[test]
    fn test_rank_candidates_drops_non_finite_scores() {
        let ranked = rank_candidates(vec![vec![
            scored(1, f64::NAN),
            scored(2, 0.1),
            scored(3, f64::INFINITY),
        ]]);
        assert_eq!(ids(&ranked), vec![2]);
    }

    #[tokio::test]
    async fn test_assemble_pools_all_seeds() {
        let mut similarity = MockSimilarityProvider::new();
        similarity
            .expect_similar_tracks()
            .with(eq(TrackId(1)), eq(10))
            .returning(|_, _| Ok(vec![scored(100, 0.4), scored(101, 0.3)]));
        similarity
            .expect_similar_tracks()
            .with(eq(TrackId(2)), eq(10))
            .returning(|_, _| Ok(vec![scored(200, 0.9), scored(100, 0.1)]));

        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history_returning(vec![1, 2]), similarity, stats);

        let result = online.assemble(UserId(7), 10).await;
        assert_eq!(ids(&result), vec![200, 100, 101]);
    }

    #[tokio::test]
    async fn test_assemble_skips_failed_seed() {
        let mut similarity = MockSimilarityProvider::new();
        similarity
            .expect_similar_tracks()
            .with(eq(TrackId(1)), always())
            .returning(|_, _| Err(AppError::UpstreamUnavailable("503".to_string())));
        similarity
            .expect_similar_tracks()
            .with(eq(TrackId(2)), always())
            .returning(|_, _| Ok(vec![scored(200, 0.9)]));
        similarity
            .expect_similar_tracks()
            .with(eq(TrackId(3)), always())
            .returning(|_, _| Err(AppError::NotFound("item 3".to_string())));

        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history_returning(vec![1, 2, 3]), similarity, stats.clone());

        let result = online.assemble(UserId(7), 10).await;

        assert_eq!(ids(&result), vec![200]);
        assert_eq!(stats.snapshot().similarity_failures, 1);
    }

    #[tokio::test]
    async fn test_assemble_counts_non_upstream_provider_errors() {
        let mut similarity = MockSimilarityProvider::new();
        similarity
            .expect_similar_tracks()
            .returning(|_, _| Err(AppError::Internal("bad features URL".to_string())));

        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history_returning(vec![1, 2]), similarity, stats.clone());

        assert!(online.assemble(UserId(7), 10).await.is_empty());
        assert_eq!(stats.snapshot().similarity_failures, 2);
    }

    #[tokio::test]
    async fn test_assemble_all_seeds_failing_is_empty() {
        let mut similarity = MockSimilarityProvider::new();
        similarity
            .expect_similar_tracks()
            .times(3)
            .returning(|_, _| Err(AppError::MalformedResponse("bad body".to_string())));

        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history_returning(vec![1, 2, 3]), similarity, stats.clone());

        let result = online.assemble(UserId(7), 10).await;

        assert!(result.is_empty());
        assert_eq!(stats.snapshot().similarity_failures, 3);
    }

    #[tokio::test]
    async fn test_assemble_empty_history_skips_similarity() {
        let mut similarity = MockSimilarityProvider::new();
        similarity.expect_similar_tracks().never();

        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history_returning(vec![]), similarity, stats.clone());

        let result = online.assemble(UserId(7), 10).await;

        assert!(result.is_empty());
        assert_eq!(stats.snapshot().history_empty, 1);
    }

    #[tokio::test]
    async fn test_assemble_history_failure_is_empty() {
        let mut history = MockHistoryProvider::new();
        history
            .expect_recent_tracks()
            .returning(|_, _| Err(AppError::UpstreamUnavailable("connection refused".to_string())));
        let mut similarity = MockSimilarityProvider::new();
        similarity.expect_similar_tracks().never();

        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history, similarity, stats.clone());

        let result = online.assemble(UserId(7), 10).await;

        assert!(result.is_empty());
        assert_eq!(stats.snapshot().history_failures, 1);
    }

    #[tokio::test]
    async fn test_assemble_requests_configured_history_depth() {
        let mut history = MockHistoryProvider::new();
        history
            .expect_recent_tracks()
            .with(eq(UserId(7)), eq(3))
            .times(1)
            .returning(|_, _| Ok(vec![TrackId(1)]));
        let mut similarity = MockSimilarityProvider::new();
        similarity
            .expect_similar_tracks()
            .returning(|_, _| Ok(vec![scored(2, 0.5)]));

        let online = assembler(history, similarity, Arc::new(ServiceStats::new()));

        let result = online.assemble(UserId(7), 5).await;
        assert_eq!(ids(&result), vec![2]);
    }

    #[tokio::test]
    async fn test_assemble_zero_k_makes_no_calls() {
        let mut history = MockHistoryProvider::new();
        history.expect_recent_tracks().never();
        let mut similarity = MockSimilarityProvider::new();
        similarity.expect_similar_tracks().never();

        let online = assembler(history, similarity, Arc::new(ServiceStats::new()));

        assert!(online.assemble(UserId(7), 0).await.is_empty());
    }

    /// Similarity index that answers one seed slowly
    struct SlowSimilarity {
        slow_track: TrackId,
    }

    #[async_trait::async_trait]
    impl SimilarityProvider for SlowSimilarity {
        async fn similar_tracks(
            &self,
            track_id: TrackId,
            _limit: usize,
        ) -> AppResult<Vec<ScoredCandidate>> {
            if track_id == self.slow_track {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok(vec![scored(track_id.0 * 10, 0.5)])
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_assemble_slow_seed_times_out_without_blocking_others() {
        let similarity = SlowSimilarity {
            slow_track: TrackId(2),
        };
        let stats = Arc::new(ServiceStats::new());
        let online = assembler(history_returning(vec![1, 2, 3]), similarity, stats.clone());

        let started = std::time::Instant::now();
        let result = online.assemble(UserId(7), 10).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(ids(&result), vec![10, 30]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.upstream_timeouts, 1);
        assert_eq!(snapshot.similarity_failures, 1);
    }
}
