use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{HistoryPage, HistoryParams};
use crate::error::Error;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Json;
use log::debug;

/// Filtered, paginated detection history
pub async fn get_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<HistoryPage>> {
    let Query(params) =
        params.map_err(|e| Error::InvalidFilter(format!("Invalid query parameters: {}", e)))?;
    debug!("History query: {:?}", params);

    let page = state.pipeline.history(params).await?;
    Ok(Json(page))
}
