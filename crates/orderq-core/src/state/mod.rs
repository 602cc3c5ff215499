//! State management for orders.
//!
//! The transition policy decides which status changes are legal; the state
//! machine applies changes to stored orders under that policy.

pub mod order;
pub mod policy;

pub use order::{OrderStateError, OrderStateMachine};
pub use policy::is_transition_valid;
