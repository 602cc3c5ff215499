//! Order endpoints.
//!
//! Thin adapters between HTTP and [`OrderService`]; every rule lives in the
//! service.

use super::APIError;
use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::Json,
};
use orderq_core::OrderService;
use orderq_types::{
	ListOrdersQuery, NewOrder, Order, OrderId, OrderStatus, OrderWithStatusHistory,
	PositionEntry, UpdateDishesRequest,
};
use std::sync::Arc;

type Service = State<Arc<OrderService>>;

/// GET /orders?active=true&status=ready,done
pub async fn list_orders(
	State(service): Service,
	Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, APIError> {
	let filters = query
		.filters()
		.map_err(|e| APIError::bad_request("INVALID_STATUS", e.to_string()))?;
	Ok(Json(service.find_many(&filters).await?))
}

/// POST /orders
pub async fn create_order(
	State(service): Service,
	Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	let order = service.create_order(request).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}
pub async fn get_order(
	State(service): Service,
	Path(id): Path<OrderId>,
) -> Result<Json<OrderWithStatusHistory>, APIError> {
	Ok(Json(service.find_with_history(id).await?))
}

/// PUT /orders/{id}/status/{status}
pub async fn update_status(
	State(service): Service,
	Path((id, status)): Path<(OrderId, String)>,
) -> Result<Json<Order>, APIError> {
	let status = status
		.parse::<OrderStatus>()
		.map_err(|e| APIError::bad_request("INVALID_STATUS", e.to_string()))?;
	Ok(Json(service.update_status(id, status).await?))
}

/// PUT /orders/{id}/dishes
pub async fn update_dishes(
	State(service): Service,
	Path(id): Path<OrderId>,
	Json(request): Json<UpdateDishesRequest>,
) -> Result<Json<Order>, APIError> {
	Ok(Json(service.update_dishes(id, request.dishes).await?))
}

/// PUT /orders/{id}/prioritize/{after_id}
pub async fn prioritize(
	State(service): Service,
	Path((id, after_id)): Path<(OrderId, OrderId)>,
) -> Result<StatusCode, APIError> {
	service.prioritize(id, after_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

/// GET /queue
pub async fn get_queue(State(service): Service) -> Result<Json<Vec<PositionEntry>>, APIError> {
	Ok(Json(service.queue().await?))
}
