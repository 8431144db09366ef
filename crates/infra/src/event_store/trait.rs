use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use tallybook_core::{AggregateId, ExpectedVersion, TenantId};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Use `UncommittedEvent::from_typed()` to build one from a typed domain event:
/// the event is serialized to JSON and its metadata (type, version, business
/// time) is captured next to the stream coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// `sequence_number` is the position within the aggregate stream (1, 2, 3...);
/// `log_position` is the position within the whole tenant log and gives a
/// total order across streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,
    /// Monotonically increasing position in the tenant log.
    pub log_position: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency, isolation) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// The backing store could not be read or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Appends to one stream within a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Everything one business operation writes: events on one or more streams
/// plus party balance deltas. Committed all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    tenant_id: TenantId,
    streams: Vec<StreamAppend>,
    balance_deltas: Vec<(AggregateId, Decimal)>,
}

impl UnitOfWork {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            streams: Vec::new(),
            balance_deltas: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn streams(&self) -> &[StreamAppend] {
        &self.streams
    }

    pub fn balance_deltas(&self) -> &[(AggregateId, Decimal)] {
        &self.balance_deltas
    }

    pub fn is_empty(&self) -> bool {
        self.streams.iter().all(|s| s.events.is_empty()) && self.balance_deltas.is_empty()
    }

    /// Stage events for a stream. Staging the same stream twice merges the
    /// events; the first expectation wins.
    pub fn append(
        &mut self,
        aggregate_id: AggregateId,
        expected_version: ExpectedVersion,
        events: Vec<UncommittedEvent>,
    ) {
        if let Some(existing) = self.streams.iter_mut().find(|s| s.aggregate_id == aggregate_id) {
            existing.events.extend(events);
            return;
        }
        self.streams.push(StreamAppend {
            aggregate_id,
            expected_version,
            events,
        });
    }

    /// Stage a change to a party's stored running balance.
    pub fn adjust_balance(&mut self, party_id: AggregateId, delta: Decimal) {
        if delta.is_zero() {
            return;
        }
        self.balance_deltas.push((party_id, delta));
    }

    pub fn into_parts(self) -> (TenantId, Vec<StreamAppend>, Vec<(AggregateId, Decimal)>) {
        (self.tenant_id, self.streams, self.balance_deltas)
    }
}

/// A consistent copy of one tenant's log and stored balances.
///
/// Every derived read computes from a single snapshot, so one request never
/// sees a half-applied unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSnapshot {
    /// All events of the tenant in `log_position` order.
    pub events: Vec<StoredEvent>,
    /// Stored running balance per party stream.
    pub balances: HashMap<AggregateId, Decimal>,
}

impl LogSnapshot {
    pub fn stored_balance(&self, party_id: AggregateId) -> Decimal {
        self.balances.get(&party_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn stream(&self, aggregate_id: AggregateId) -> impl Iterator<Item = &StoredEvent> {
        self.events.iter().filter(move |e| e.aggregate_id == aggregate_id)
    }
}

/// Append-only, tenant-scoped event store.
///
/// Events are organized into streams keyed by `(tenant_id, aggregate_id)`.
/// Within a stream, events have monotonically increasing sequence numbers;
/// across a tenant they are totally ordered by `log_position`.
///
/// Implementations must:
/// - enforce tenant isolation on read and write
/// - enforce optimistic concurrency per stream via `ExpectedVersion`
/// - commit a `UnitOfWork` atomically, balance deltas included
/// - apply balance deltas relative to the current stored value, under the
///   same exclusive section that appends the events
pub trait EventStore: Send + Sync {
    /// Commit every stream append and balance delta of `unit`, or none.
    fn commit(&self, unit: UnitOfWork) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a tenant + aggregate.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Consistent copy of the tenant's log and balances.
    fn snapshot(&self, tenant_id: TenantId) -> Result<LogSnapshot, EventStoreError>;

    /// Stored running balance of one party (zero when never written).
    fn stored_balance(
        &self,
        tenant_id: TenantId,
        party_id: AggregateId,
    ) -> Result<Decimal, EventStoreError>;

    /// Append events to a single aggregate stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let mut unit = UnitOfWork::new(first.tenant_id);
        unit.append(first.aggregate_id, expected_version, events);
        self.commit(unit)
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn commit(&self, unit: UnitOfWork) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).commit(unit)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn snapshot(&self, tenant_id: TenantId) -> Result<LogSnapshot, EventStoreError> {
        (**self).snapshot(tenant_id)
    }

    fn stored_balance(
        &self,
        tenant_id: TenantId,
        party_id: AggregateId,
    ) -> Result<Decimal, EventStoreError> {
        (**self).stored_balance(tenant_id, party_id)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: tallybook_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
