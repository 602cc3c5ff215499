//! Background machinery of the order service.
//!
//! Side effects of a request (history rows, queue updates) are handed to the
//! dispatcher and applied after the request returns. Outcomes that callers
//! never see are published on the event bus.

pub mod dispatcher;
pub mod event_bus;

pub use dispatcher::{SideEffect, SideEffectRunner, TaskDispatcher};
pub use event_bus::{EventBus, OrderEvent};
