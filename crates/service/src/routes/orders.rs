//! Read-only order status lookup for operators.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use orders::{OrderId, OrderStore};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub id: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub total_cents: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /orders/{id}: returns where an order is in the fulfillment pipeline.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order = state
        .orders
        .get_order(&OrderId::new(id.clone()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderStatusResponse {
        id: order.id.to_string(),
        status: order.status.to_string(),
        status_reason: order.status_reason,
        total_cents: order.total.cents(),
        published_at: order.published_at,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }))
}
