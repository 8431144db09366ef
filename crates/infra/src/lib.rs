//! Infrastructure layer: event store, command dispatch, derived reads and
//! the engine facade wiring them together.

pub mod command_dispatcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_store;
pub mod query;
pub mod streams;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use event_store::{EventStore, InMemoryEventStore};

#[cfg(test)]
mod integration_tests;
