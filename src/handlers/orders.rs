//! Order HTTP handlers.
//!
//! - POST /api/orders - Place an order for the caller
//! - PUT /api/orders/{id} - Set the fulfilled flag (admin)

use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::Json,
    models::{
        order::{CreateOrderRequest, OrderCreatedResponse, OrderResponse, UpdateOrderRequest},
        user::Identity,
    },
    state::AppState,
};

/// Place an order.
///
/// # Endpoint
///
/// `POST /api/orders`
///
/// # Authentication
///
/// Any valid access credential, guest or registered. Guests must include a
/// contact phone with 10-15 digits.
///
/// # Request Body
///
/// ```json
/// {
///   "items": [{ "id": "p1", "qty": 2 }],
///   "contact": { "phone": "+7 900 123 45 67" },
///   "delivery": { "method": "pickup" },
///   "channel": "web"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: `{ "id": "...", "total": 100.0, "currency": "₽" }`
/// - **Error (400)**: empty order, invalid phone, unknown perfume, mixed currency
/// - **Error (401)**: missing or invalid credential
pub async fn create_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), AppError> {
    let order = state.orders.create_order(&identity, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            id: order.id,
            total: order.total,
            currency: order.currency,
        }),
    ))
}

/// Set an order's fulfilled flag.
///
/// # Endpoint
///
/// `PUT /api/orders/{id}` with `{ "fulfilled": true }`
///
/// # Response
///
/// - **Success (200 OK)**: the updated order
/// - **Error (400)**: id is not a UUID
/// - **Error (403)**: caller is not an admin
/// - **Error (404)**: unknown order
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = Uuid::parse_str(id.trim())
        .map_err(|_| AppError::InvalidInput("invalid order id".to_string()))?;

    let order = state
        .orders
        .set_fulfilled(order_id, request.fulfilled)
        .await?;

    Ok(Json(order.into()))
}
