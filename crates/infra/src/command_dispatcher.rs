//! Command execution pipeline (application-level orchestration).
//!
//! This module implements the **command dispatch pattern** for event-sourced
//! aggregates, extended to units of work that span several streams.
//!
//! ## Command Execution Flow
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Stage events in a UnitOfWork, expecting the version that was read
//!   ↓
//! 5. Commit the unit (all streams and balance deltas, or nothing)
//! ```
//!
//! A business operation that touches several streams (an order, the tenant
//! journal, a party balance, a bank account) loads each aggregate, stages every
//! decision into one `UnitOfWork`, and commits once. A concurrent writer on any
//! of those streams makes the whole commit fail with `EngineError::Concurrency`.
//!
//! This module contains no IO itself; it composes the `EventStore` trait.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use tallybook_core::{AggregateId, ExpectedVersion, TenantId};
use tallybook_events::{Command, Event};

use crate::error::EngineError;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, UnitOfWork};
use crate::streams::StreamAggregate;

/// A rehydrated aggregate plus the stream version it was read at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate: A,
    version: u64,
    history: Vec<StoredEvent>,
}

impl<A> Loaded<A> {
    pub fn state(&self) -> &A {
        &self.aggregate
    }

    /// Stream version at load time; staged appends expect exactly this.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Stored events the aggregate was rebuilt from.
    pub fn history(&self) -> &[StoredEvent] {
        &self.history
    }
}

impl<A> Loaded<A>
where
    A: StreamAggregate,
    A::Event: Event + Serialize,
    EngineError: From<A::Error>,
{
    /// Decide events for `command`, stage them in `unit`, and apply them to
    /// the in-memory state so later decisions in the same unit see them.
    pub fn decide(
        &mut self,
        command: &A::Command,
        unit: &mut UnitOfWork,
    ) -> Result<Vec<A::Event>, EngineError> {
        let decided = self.aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(decided);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    self.tenant_id,
                    self.aggregate_id,
                    A::AGGREGATE_TYPE,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        unit.append(self.aggregate_id, ExpectedVersion::Exact(self.version), uncommitted);

        for ev in &decided {
            self.aggregate.apply(ev);
        }
        Ok(decided)
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Execution Guarantees
///
/// - **Atomicity**: a unit of work is committed as a whole or not at all
/// - **Consistency**: tenant isolation and optimistic concurrency are enforced
/// - **Purity**: aggregates only decide; the dispatcher owns every store call
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Load and rehydrate one aggregate stream.
    ///
    /// Tenant and ordering checks run on the loaded stream even though the
    /// store scopes reads by tenant.
    pub fn load<A>(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<Loaded<A>, EngineError>
    where
        A: StreamAggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, A::AGGREGATE_TYPE, &history)?;

        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        Ok(Loaded {
            tenant_id,
            aggregate_id,
            aggregate,
            version: stream_version(&history),
            history,
        })
    }

    pub fn commit(&self, unit: UnitOfWork) -> Result<Vec<StoredEvent>, EngineError> {
        Ok(self.store.commit(unit)?)
    }

    /// Single-stream pipeline: load, decide, commit.
    pub fn dispatch<A>(&self, tenant_id: TenantId, command: A::Command) -> Result<Vec<StoredEvent>, EngineError>
    where
        A: StreamAggregate,
        A::Command: Command,
        A::Event: Event + Serialize + DeserializeOwned,
        EngineError: From<A::Error>,
    {
        let mut loaded = self.load::<A>(tenant_id, command.target_aggregate_id())?;
        let mut unit = UnitOfWork::new(tenant_id);
        loaded.decide(&command, &mut unit)?;
        self.commit(unit)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), EngineError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(EngineError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(EngineError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} holds '{}', not '{aggregate_type}'",
                e.aggregate_type
            ))
            .into());
        }
        if e.sequence_number <= last {
            return Err(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))
            .into());
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), EngineError>
where
    A: StreamAggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = decode(stored)?;
        aggregate.apply(&ev);
    }
    Ok(())
}

/// Deserialize a stored payload into its typed event.
pub fn decode<E: DeserializeOwned>(stored: &StoredEvent) -> Result<E, EngineError> {
    serde_json::from_value(stored.payload.clone()).map_err(|e| {
        EngineError::DataUnavailable(format!(
            "cannot decode {} event {}: {e}",
            stored.event_type, stored.event_id
        ))
    })
}
