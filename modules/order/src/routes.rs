//! HTTP intake.
//!
//! `POST /orders` does no business work: it validates the shape of the
//! request, mints the event id that will become the order id, and produces
//! the creation event. The 202 goes out as soon as the log has durably
//! accepted the event; every downstream outcome is signalled asynchronously
//! on the notifications topic.

use crate::config::Config;
use crate::domain::OrderCreationRequested;
use crate::ports::SeckillGate;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use message_log::headers::{BusinessContext, TraceContext};
use message_log::MessageLog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub log: Arc<dyn MessageLog>,
    pub gate: Arc<dyn SeckillGate>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: String,
    #[serde(default)]
    pub is_vip: bool,
    pub items: Vec<String>,
    pub quantity: u32,
    #[serde(default)]
    pub promo_id: Option<String>,
    #[serde(default)]
    pub seckill_product_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareSeckillRequest {
    pub product_id: String,
    pub stock: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(crate::health::health))
        .route("/orders", post(create_order))
        .route("/admin/seckill/prepare", post(prepare_seckill))
        .with_state(state)
}

async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), (StatusCode, Json<serde_json::Value>)> {
    if request.user_id.is_empty() || request.items.is_empty() || request.quantity == 0 {
        return Err(bad_request(
            "userId, items and a positive quantity are required",
        ));
    }

    let event_id = Uuid::new_v4().to_string();
    let trace = TraceContext::new_root();

    let event = OrderCreationRequested {
        trace_id: trace.trace_id.clone(),
        user_id: request.user_id.clone(),
        is_vip: request.is_vip,
        items: request.items,
        quantity: request.quantity,
        promo_id: request.promo_id.clone(),
        seckill_product_id: request.seckill_product_id,
        event_id: event_id.clone(),
    };
    let payload = serde_json::to_vec(&event).map_err(|e| {
        internal_error(format!("failed to serialize order event: {}", e))
    })?;

    let mut headers = HashMap::new();
    trace.inject(&mut headers);

    // The promotion rides the business channel only for VIPs, and only when
    // the feature flag allows it; downstream reads headers, never payloads.
    if state.config.vip_promotions_enabled && request.is_vip {
        if let Some(promo_id) = request.promo_id.filter(|p| !p.is_empty()) {
            let mut business = BusinessContext::new();
            business.set_promotion_id(promo_id);
            business.inject(&mut headers);
        }
    }

    state
        .log
        .produce(
            &state.config.order_topic,
            Some(&event.user_id),
            payload,
            headers,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to enqueue order creation request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "order intake unavailable" })),
            )
        })?;

    tracing::info!(
        event_id = %event_id,
        user_id = %event.user_id,
        trace_id = %trace.trace_id,
        "order creation request enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateOrderResponse {
            order_id: event_id,
            status: "CREATED".to_string(),
            message: "Your order is being processed.".to_string(),
        }),
    ))
}

async fn prepare_seckill(
    State(state): State<AppState>,
    Json(request): Json<PrepareSeckillRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.product_id.is_empty() || request.stock < 0 {
        return Err(bad_request("productId and a non-negative stock are required"));
    }

    state
        .gate
        .prepare(&request.product_id, request.stock)
        .await
        .map_err(|e| internal_error(format!("failed to prepare seckill product: {}", e)))?;

    tracing::info!(
        product_id = %request.product_id,
        stock = request.stock,
        "seckill product prepared"
    );
    Ok(Json(serde_json::json!({
        "productId": request.product_id,
        "stock": request.stock,
        "status": "ready"
    })))
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

fn internal_error(message: String) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
}
