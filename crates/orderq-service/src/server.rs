//! HTTP server for the order queue API.

use crate::apis::order;
use axum::{
	routing::{get, put},
	Router,
};
use orderq_config::ApiConfig;
use orderq_core::OrderService;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the API router under `/api/v1`.
pub fn router(service: Arc<OrderService>) -> Router {
	Router::new()
		.nest(
			"/api/v1",
			Router::new()
				.route("/orders", get(order::list_orders).post(order::create_order))
				.route("/orders/{id}", get(order::get_order))
				.route("/orders/{id}/status/{status}", put(order::update_status))
				.route("/orders/{id}/dishes", put(order::update_dishes))
				.route("/orders/{id}/prioritize/{after_id}", put(order::prioritize))
				.route("/queue", get(order::get_queue)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(service)
}

/// Serves the API until `shutdown` resolves.
pub async fn start_server(
	api_config: ApiConfig,
	service: Arc<OrderService>,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(service);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order queue API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}
