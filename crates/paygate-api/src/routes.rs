//! API routes

use std::any::Any;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the gateway router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/payments/authorize", post(handlers::payments::authorize))
        .route("/payments/capture", post(handlers::payments::capture))
        .route("/payments/void", post(handlers::payments::void))
        .route("/payments/refund", post(handlers::payments::refund))
        .route("/payments/:id", get(handlers::query::get_payment))
        .route(
            "/payments/order/:order_id",
            get(handlers::query::get_payment_by_order),
        )
        .route(
            "/payments/customer/:customer_id",
            get(handlers::query::list_payments_by_customer),
        )
        .route("/health", get(handlers::health::health))
        .layer(CatchPanicLayer::custom(panic_to_internal))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A panicking request task becomes an INTERNAL error response
fn panic_to_internal(_panic: Box<dyn Any + Send + 'static>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": {
                "code": "INTERNAL_ERROR",
                "message": "An internal error occurred",
            },
        })),
    )
        .into_response()
}
