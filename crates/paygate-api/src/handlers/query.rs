//! Payment query handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use paygate_types::PaymentId;

use crate::dto::{payment_body, success_body, CustomerQuery};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id: PaymentId = id.parse()?;
    let payment = state.queries.get_payment(id).await?;
    Ok(Json(payment_body(&payment)))
}

pub async fn get_payment_by_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let payment = state.queries.get_payment_by_order(&order_id).await?;
    Ok(Json(payment_body(&payment)))
}

pub async fn list_payments_by_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let payments = state
        .queries
        .list_payments_by_customer(&customer_id, query.limit, query.offset)
        .await?;
    Ok(Json(success_body(
        serde_json::to_value(&payments).unwrap_or_default(),
    )))
}
