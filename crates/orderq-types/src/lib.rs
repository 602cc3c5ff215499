//! Common types module for the order queue system.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: orders and their status lifecycle, queue positions, read
//! filters and the configuration validation framework used by pluggable
//! storage backends.

/// API types shared by the HTTP boundary.
pub mod api;
/// Read filters for listing orders.
pub mod filter;
/// Order types including dishes, sources and creation requests.
pub mod order;
/// Queue position types.
pub mod position;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Order status lifecycle and status history types.
pub mod status;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use filter::*;
pub use order::*;
pub use position::*;
pub use registry::*;
pub use status::*;
pub use validation::*;
