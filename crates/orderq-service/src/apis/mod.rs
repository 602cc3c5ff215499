//! HTTP API handlers and their error mapping.

pub mod order;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use orderq_core::OrderError;
use orderq_types::ErrorResponse;
use std::fmt;

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Validation failures and rejected updates (400)
	BadRequest { error_type: String, message: String },
	/// Unknown order (404)
	NotFound { error_type: String, message: String },
	/// Storage and consistency failures (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> StatusCode {
		match self {
			APIError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			APIError::NotFound { .. } => StatusCode::NOT_FOUND,
			APIError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl From<OrderError> for APIError {
	fn from(err: OrderError) -> Self {
		let message = err.to_string();
		let error_type = match &err {
			OrderError::OrderNotFound(_) => "ORDER_NOT_FOUND",
			OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
			OrderError::TerminalOrderUpdate(_) => "TERMINAL_ORDER_UPDATE",
			OrderError::InvalidOrderUpdate(_) => "INVALID_ORDER_UPDATE",
			OrderError::Validation(_) => "INVALID_ORDER",
			OrderError::DuplicateQueueEntry(_) => "DUPLICATE_QUEUE_ENTRY",
			OrderError::Storage(_) => "STORAGE_ERROR",
		}
		.to_string();

		match err {
			OrderError::OrderNotFound(_) => APIError::NotFound {
				error_type,
				message,
			},
			OrderError::InvalidTransition { .. }
			| OrderError::TerminalOrderUpdate(_)
			| OrderError::InvalidOrderUpdate(_)
			| OrderError::Validation(_) => APIError::BadRequest {
				error_type,
				message,
			},
			OrderError::DuplicateQueueEntry(_) | OrderError::Storage(_) => {
				APIError::InternalServerError {
					error_type,
					message,
				}
			},
		}
	}
}

impl IntoResponse for APIError {
	fn into_response(self) -> Response {
		if self.status_code().is_server_error() {
			tracing::error!(error = %self, "Request failed");
		} else {
			tracing::warn!(error = %self, "Request rejected");
		}
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}
