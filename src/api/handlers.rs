use crate::db::FinancingStore;
use crate::error::FinancingError;
use crate::models::BatchSummary;
use crate::service::FinancingService;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// 响应体
#[derive(Debug, Serialize)]
pub struct FinancingResponse {
    pub success: bool,
    pub message: String,
    pub summary: Option<BatchSummary>,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 触发一次融资批次
pub async fn run_financing<S>(State(service): State<Arc<FinancingService<S>>>) -> Response
where
    S: FinancingStore + 'static,
{
    match service.run_financing_cycle().await {
        Ok(summary) => {
            let response = FinancingResponse {
                success: true,
                message: format!(
                    "Financed {} of {} invoices",
                    summary.matched, summary.scanned
                ),
                summary: Some(summary),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let status = match e {
                FinancingError::RunInProgress => StatusCode::CONFLICT,
                FinancingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let response = FinancingResponse {
                success: false,
                message: format!("Error: {}", e),
                summary: None,
            };
            (status, Json(response)).into_response()
        }
    }
}

pub fn router<S>(service: Arc<FinancingService<S>>) -> Router
where
    S: FinancingStore + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/financing/run", post(run_financing::<S>))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinancingConfig;
    use crate::db::{FinancingTx, MemoryFinancingStore};

    #[tokio::test]
    async fn empty_run_succeeds() {
        let service = Arc::new(FinancingService::new(
            MemoryFinancingStore::new(),
            FinancingConfig::default(),
        ));

        let response = run_financing(State(service)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn overlapping_run_is_a_conflict() {
        let store = MemoryFinancingStore::new();
        let mut held = store.begin().await.unwrap();
        assert!(held.try_lock_run().await.unwrap());

        let service = Arc::new(FinancingService::new(store, FinancingConfig::default()));
        let response = run_financing(State(service)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        held.rollback().await.unwrap();
    }
}
