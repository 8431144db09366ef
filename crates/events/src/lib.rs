//! Event and command abstractions shared by every domain crate.
//!
//! Domain events are the append-only facts of the transaction log; commands are
//! transient intents that aggregates turn into events.

pub mod command;
pub mod event;
pub mod handler;

pub use command::Command;
pub use event::Event;
pub use handler::execute;
