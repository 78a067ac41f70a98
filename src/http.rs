// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST surface for renters, staff and the payment gateway.
//!
//! ## Endpoints
//!
//! - `POST /orders` - Book a vehicle
//! - `GET /orders/{id}` - Get an order
//! - `PUT /orders/{id}/approve|reject|pickup|return` - Staff/renter actions
//! - `PUT /orders/{id}/complete` - Settle a returned vehicle
//! - `PUT /orders/{id}/settlement` - Reissue a declined settlement payment
//! - `GET /orders/{id}/payments` - Payments of an order
//! - `GET /orders/{id}/fees` - Extra fees of an order
//! - `GET /renters/{id}/orders` - Orders of a renter
//! - `POST /payments` - Start the renter payment for an order
//! - `GET /payments/callback` - Gateway return/notification
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/orders \
//!   -H "Content-Type: application/json" \
//!   -d '{"renter_id": 1, "vehicle_id": 1, "start_time": "2030-01-01T08:00:00Z", "end_time": "2030-01-01T12:00:00Z"}'
//!
//! curl -X PUT http://localhost:3000/orders/1/complete \
//!   -H "Content-Type: application/json" -d '{"fee_type_ids": [2]}'
//! ```

use crate::base::{FeeTypeId, OrderId, RenterId};
use crate::engine::{BookingRequest, RentalEngine};
use crate::error::RentalError;
use crate::fee::ExtraFee;
use crate::gateway::PaymentRedirect;
use crate::order::RentalOrder;
use crate::payment::Payment;
use crate::settlement::ReturnOutcome;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub fee_type_ids: Vec<FeeTypeId>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub order_id: OrderId,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Acknowledgement the gateway expects from its notification call.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayAck {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl GatewayAck {
    fn new(code: &str, message: &str) -> Self {
        Self {
            rsp_code: code.to_string(),
            message: message.to_string(),
        }
    }
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RentalEngine>,
    pub default_client_ip: String,
}

// === Error Handling ===

/// Wrapper for converting [`RentalError`] into HTTP responses.
pub struct AppError(RentalError);

impl From<RentalError> for AppError {
    fn from(err: RentalError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            RentalError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            RentalError::InvalidWindow => (StatusCode::BAD_REQUEST, "INVALID_WINDOW"),
            RentalError::Unavailable => (StatusCode::CONFLICT, "UNAVAILABLE"),
            RentalError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            RentalError::InvalidSignature => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
            RentalError::UnknownTransaction => (StatusCode::NOT_FOUND, "UNKNOWN_TRANSACTION"),
            RentalError::AmountMismatch => (StatusCode::BAD_REQUEST, "AMOUNT_MISMATCH"),
            RentalError::ConcurrencyConflict => (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT"),
            RentalError::AlreadyPaid => (StatusCode::CONFLICT, "ALREADY_PAID"),
            RentalError::OrderClosed(_) => (StatusCode::CONFLICT, "ORDER_CLOSED"),
            RentalError::SettlementPending => (StatusCode::CONFLICT, "SETTLEMENT_PENDING"),
            RentalError::SettlementDeclined => (StatusCode::CONFLICT, "SETTLEMENT_DECLINED"),
            RentalError::InvalidAmount => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT"),
            RentalError::DuplicateTransaction => (StatusCode::CONFLICT, "DUPLICATE_TRANSACTION"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn client_ip(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

// === Handlers ===

/// POST /orders - Book a vehicle.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<RentalOrder>), AppError> {
    let order = state.engine.book(request, Utc::now())?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RentalOrder>, AppError> {
    Ok(Json(state.engine.order(OrderId(id))?))
}

async fn approve_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RentalOrder>, AppError> {
    Ok(Json(state.engine.approve(OrderId(id))?))
}

async fn reject_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RentalOrder>, AppError> {
    Ok(Json(state.engine.reject(OrderId(id))?))
}

async fn pickup_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RentalOrder>, AppError> {
    Ok(Json(state.engine.pickup(OrderId(id))?))
}

async fn return_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RentalOrder>, AppError> {
    Ok(Json(state.engine.request_return(OrderId(id))?))
}

/// PUT /orders/{id}/complete - Settle fees and close out the order.
async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<ReturnOutcome>, AppError> {
    let ip = client_ip(&headers, &state.default_client_ip);
    let outcome =
        state
            .engine
            .complete_return(OrderId(id), &request.fee_type_ids, &ip, Utc::now())?;
    Ok(Json(outcome))
}

/// PUT /orders/{id}/settlement - Reissue a declined refund or charge.
async fn reissue_settlement(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<PaymentRedirect>), AppError> {
    let ip = client_ip(&headers, &state.default_client_ip);
    let redirect = state
        .engine
        .reissue_settlement(OrderId(id), &ip, Utc::now())?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

async fn order_payments(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let order_id = OrderId(id);
    state.engine.order(order_id)?;
    Ok(Json(state.engine.payments_for_order(order_id)))
}

async fn order_fees(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<ExtraFee>>, AppError> {
    let order_id = OrderId(id);
    state.engine.order(order_id)?;
    Ok(Json(state.engine.extra_fees_for_order(order_id)))
}

async fn renter_orders(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<Vec<RentalOrder>> {
    Json(state.engine.orders_for_renter(RenterId(id)))
}

/// POST /payments - Issue the renter's payment redirect.
async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentRedirect>), AppError> {
    let ip = client_ip(&headers, &state.default_client_ip);
    let redirect = state
        .engine
        .initiate_order_payment(request.order_id, &ip, Utc::now())?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// GET /payments/callback - Gateway notification.
///
/// Always answers 200 with the gateway's acknowledgement format; duplicate
/// deliveries of an applied callback acknowledge success.
async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<GatewayAck> {
    let ack = match state.engine.handle_callback(&query) {
        Ok(_) => GatewayAck::new("00", "Confirm Success"),
        Err(RentalError::UnknownTransaction) => GatewayAck::new("01", "Order not found"),
        Err(RentalError::AmountMismatch | RentalError::InvalidAmount) => {
            GatewayAck::new("04", "Invalid amount")
        }
        Err(RentalError::InvalidSignature) => GatewayAck::new("97", "Invalid signature"),
        Err(_) => GatewayAck::new("99", "Unknown error"),
    };
    Json(ack)
}

// === Router ===

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/approve", put(approve_order))
        .route("/orders/{id}/reject", put(reject_order))
        .route("/orders/{id}/pickup", put(pickup_order))
        .route("/orders/{id}/return", put(return_order))
        .route("/orders/{id}/complete", put(complete_order))
        .route("/orders/{id}/settlement", put(reissue_settlement))
        .route("/orders/{id}/payments", get(order_payments))
        .route("/orders/{id}/fees", get(order_fees))
        .route("/renters/{id}/orders", get(renter_orders))
        .route("/payments", post(create_payment))
        .route("/payments/callback", get(payment_callback))
        .with_state(state)
}
