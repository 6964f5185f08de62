use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{RecommendationQuery, RecommendationsResponse, UserId},
    routes::AppState,
};

/// Validates query parameters, applying the default `k`
///
/// Non-integer identifiers and negative `k` are client errors.
fn resolve_query(
    query: Result<Query<RecommendationQuery>, QueryRejection>,
    default_k: usize,
) -> AppResult<(UserId, usize)> {
    let Query(query) = query.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    let k = match query.k {
        None => default_k,
        Some(k) => usize::try_from(k)
            .map_err(|_| AppError::InvalidInput(format!("k must be non-negative, got {}", k)))?,
    };

    Ok((query.user_id, k))
}

/// Handler for blended (offline + online) recommendations
pub async fn blended(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<RecommendationQuery>, QueryRejection>,
) -> AppResult<Json<RecommendationsResponse>> {
    let (user_id, k) = resolve_query(query, state.default_k)?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        k,
        "Getting blended recommendations"
    );

    let recs = state.recommender.blended(user_id, k).await;
    Ok(Json(recs.into()))
}

/// Handler for offline recommendations only
pub async fn offline(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<RecommendationQuery>, QueryRejection>,
) -> AppResult<Json<RecommendationsResponse>> {
    let (user_id, k) = resolve_query(query, state.default_k)?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        k,
        "Getting offline recommendations"
    );

    let recs = state.recommender.offline(user_id, k).await;
    Ok(Json(recs.into()))
}

/// Handler for online (history-based) recommendations only
pub async fn online(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<RecommendationQuery>, QueryRejection>,
) -> AppResult<Json<RecommendationsResponse>> {
    let (user_id, k) = resolve_query(query, state.default_k)?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        k,
        "Getting online recommendations"
    );

    let recs = state.recommender.online(user_id, k).await;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        count = recs.len(),
        "Generated online recommendations"
    );

    Ok(Json(recs.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(user_id: i64, k: Option<i64>) -> Result<Query<RecommendationQuery>, QueryRejection> {
        Ok(Query(RecommendationQuery {
            user_id: UserId(user_id),
            k,
        }))
    }

    #[test]
    fn test_resolve_query_uses_default_k() {
        let (user_id, k) = resolve_query(query(3, None), 100).unwrap();
        assert_eq!(user_id, UserId(3));
        assert_eq!(k, 100);
    }

    #[test]
    fn test_resolve_query_explicit_k() {
        let (_, k) = resolve_query(query(3, Some(0)), 100).unwrap();
        assert_eq!(k, 0);
    }

    #[test]
    fn test_resolve_query_rejects_negative_k() {
        let error = resolve_query(query(3, Some(-1)), 100).unwrap_err();
        assert!(matches!(error, AppError::InvalidInput(_)));
        assert!(error.to_string().contains("non-negative"));
    }
}
