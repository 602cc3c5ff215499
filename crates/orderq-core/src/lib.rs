//! Core of the order queue system.
//!
//! Ties the status state machine, the queue position ledger and the
//! background side effect dispatcher together into [`OrderService`].

pub mod builder;
pub mod engine;
pub mod ledger;
pub mod service;
pub mod state;

pub use builder::{BuilderError, OrderServiceBuilder, OrderServiceFactories};
pub use engine::{EventBus, OrderEvent};
pub use ledger::{LedgerError, PositionLedger, PositionStore};
pub use service::{OrderError, OrderService};
