use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::analytics::{DateRange, SalesReport};
use crate::api::middleware::RequestId;

use super::{map_commerce_error, ok, ApiError, ApiResponse, AppState};

const DEFAULT_RANGE: &str = "30d";

#[derive(Debug, Default, Deserialize)]
pub(super) struct ReportQuery {
    range: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

/// Explicit `start`/`end` win over a `range` preset.
fn resolve_range(query: &ReportQuery, today: NaiveDate) -> Result<DateRange, String> {
    match (query.start, query.end) {
        (Some(start), Some(end)) => DateRange::new(start, end).map_err(|e| e.to_string()),
        (None, None) => DateRange::preset(query.range.as_deref().unwrap_or(DEFAULT_RANGE), today).map_err(|e| e.to_string()),
        _ => Err("start and end must be given together".to_string()),
    }
}

pub(super) async fn sales_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<SalesReport>>, ApiError> {
    let range = resolve_range(&query, Utc::now().date_naive())
        .map_err(|message| ApiError::new(req_id.0.clone(), "bad_request", message))?;
    let report = state.shop.sales_report(range).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    tracing::debug!(start = %range.start, end = %range.end, orders = report.total_orders, "sales report built");
    Ok(ok(req_id.0, report))
}
