//! Order creation, queries and status endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{DEFAULT_PAGE_SIZE, OrderId, PageRequest};
use domain::{Order, OrderStatus};
use saga::{CreateOrder, LineRequest};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub billing_address: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct DataResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn success(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            data,
        }
    }

    fn with_message(data: T, message: &'static str) -> Self {
        Self {
            status: "success",
            message: Some(message),
            data,
        }
    }
}

#[derive(Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub status: &'static str,
    pub data: Vec<Order>,
    pub pagination: Pagination,
}

// -- Handlers --

/// POST /api/orders: run the order-creation saga.
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Order>>), ApiError> {
    let Json(req) = payload?;

    let command = CreateOrder {
        user_id: auth.user_id,
        items: req.items,
        shipping_address: req.shipping_address,
        billing_address: req.billing_address,
        notes: req.notes,
        currency: req.currency,
    };
    let order = state.saga.create_order(command, &auth.ctx).await?;

    tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::with_message(order, "Order created successfully")),
    ))
}

/// GET /api/orders/my-orders: the caller's orders, newest first.
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn my_orders(
    State(state): State<AppState>,
    auth: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let Query(query) = query?;
    let request = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    );

    let page = state.orders.get_user_orders(&auth.user_id, request).await?;
    let pagination = Pagination {
        page: page.page,
        page_size: page.page_size,
        total: page.total,
        total_pages: page.total_pages(),
    };

    Ok(Json(OrderListResponse {
        status: "success",
        data: page.items,
        pagination,
    }))
}

/// GET /api/orders/{id}: one of the caller's orders.
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Order>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.get_user_order(order_id, &auth.user_id).await?;
    Ok(Json(DataResponse::success(order)))
}

/// PATCH /api/orders/{id}/status: set the status of one of the caller's orders.
#[tracing::instrument(skip(state, auth, payload), fields(user_id = %auth.user_id))]
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<DataResponse<Order>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload?;
    let status = OrderStatus::parse(&req.status).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .orders
        .update_status(order_id, &auth.user_id, status)
        .await?;
    Ok(Json(DataResponse::with_message(order, "Order status updated")))
}

/// POST /api/orders/{id}/cancel: cancel a pending or processing order.
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Order>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.cancel_order(order_id, &auth.user_id).await?;
    Ok(Json(DataResponse::with_message(order, "Order cancelled")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
