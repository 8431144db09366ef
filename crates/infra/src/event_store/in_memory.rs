use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;

use tallybook_core::{AggregateId, TenantId};

use super::r#trait::{
    EventStore, EventStoreError, LogSnapshot, StoredEvent, StreamAppend, UnitOfWork,
};

#[derive(Debug, Clone)]
struct StreamHead {
    aggregate_type: String,
    version: u64,
}

/// One tenant's log: every event in commit order plus the stored balances.
#[derive(Debug, Default)]
struct TenantLog {
    events: Vec<StoredEvent>,
    heads: HashMap<AggregateId, StreamHead>,
    balances: HashMap<AggregateId, Decimal>,
}

impl TenantLog {
    fn current_version(&self, aggregate_id: AggregateId) -> u64 {
        self.heads.get(&aggregate_id).map(|h| h.version).unwrap_or(0)
    }

    /// Checks one staged append without touching the log.
    fn check(&self, tenant_id: TenantId, append: &StreamAppend) -> Result<(), EventStoreError> {
        let Some(first) = append.events.first() else {
            return Ok(());
        };
        let aggregate_type = &first.aggregate_type;

        for (idx, e) in append.events.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "unit of work contains a foreign tenant_id (stream {}, index {idx})",
                    append.aggregate_id
                )));
            }
            if e.aggregate_id != append.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event targets {} inside the append for {} (index {idx})",
                    e.aggregate_id, append.aggregate_id
                )));
            }
            if &e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let current = self.current_version(append.aggregate_id);
        if !append.expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {}: expected {:?}, found {current}",
                append.aggregate_id, append.expected_version
            )));
        }

        if let Some(head) = self.heads.get(&append.aggregate_id) {
            if &head.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    head.aggregate_type, aggregate_type
                )));
            }
        }

        Ok(())
    }
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance: snapshots clone the
/// tenant log.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    tenants: RwLock<HashMap<TenantId, TenantLog>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn commit(&self, unit: UnitOfWork) -> Result<Vec<StoredEvent>, EventStoreError> {
        if unit.is_empty() {
            return Ok(vec![]);
        }
        let (tenant_id, streams, balance_deltas) = unit.into_parts();

        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;
        let log = tenants.entry(tenant_id).or_default();

        // Validate everything before mutating anything.
        for append in &streams {
            log.check(tenant_id, append)?;
        }

        let mut next_position = log.events.last().map(|e| e.log_position).unwrap_or(0) + 1;
        let mut committed = Vec::new();
        for append in streams {
            let Some(aggregate_type) = append.events.first().map(|e| e.aggregate_type.clone())
            else {
                continue;
            };
            let head = log
                .heads
                .entry(append.aggregate_id)
                .or_insert_with(|| StreamHead {
                    aggregate_type,
                    version: 0,
                });

            for e in append.events {
                head.version += 1;
                let stored = StoredEvent {
                    event_id: e.event_id,
                    tenant_id: e.tenant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: head.version,
                    log_position: next_position,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next_position += 1;
                log.events.push(stored.clone());
                committed.push(stored);
            }
        }

        // Relative update under the same write lock.
        for (party_id, delta) in balance_deltas {
            *log.balances.entry(party_id).or_insert(Decimal::ZERO) += delta;
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(tenants
            .get(&tenant_id)
            .map(|log| {
                log.events
                    .iter()
                    .filter(|e| e.aggregate_id == aggregate_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn snapshot(&self, tenant_id: TenantId) -> Result<LogSnapshot, EventStoreError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(tenants
            .get(&tenant_id)
            .map(|log| LogSnapshot {
                events: log.events.clone(),
                balances: log.balances.clone(),
            })
            .unwrap_or_default())
    }

    fn stored_balance(
        &self,
        tenant_id: TenantId,
        party_id: AggregateId,
    ) -> Result<Decimal, EventStoreError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(tenants
            .get(&tenant_id)
            .and_then(|log| log.balances.get(&party_id).copied())
            .unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::UncommittedEvent;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tallybook_core::ExpectedVersion;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.event".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn unit_of_work_assigns_stream_and_log_positions() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());

        let mut unit = UnitOfWork::new(tenant);
        unit.append(a, ExpectedVersion::Exact(0), vec![event(tenant, a, "x"), event(tenant, a, "x")]);
        unit.append(b, ExpectedVersion::Exact(0), vec![event(tenant, b, "y")]);
        unit.adjust_balance(b, dec!(125.50));
        let committed = store.commit(unit).unwrap();

        let positions: Vec<_> = committed.iter().map(|e| (e.sequence_number, e.log_position)).collect();
        assert_eq!(positions, vec![(1, 1), (2, 2), (1, 3)]);
        assert_eq!(store.stored_balance(tenant, b).unwrap(), dec!(125.50));
        assert_eq!(store.snapshot(tenant).unwrap().events.len(), 3);
    }

    #[test]
    fn conflicting_stream_rejects_the_whole_unit() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());
        store.append(vec![event(tenant, b, "y")], ExpectedVersion::Exact(0)).unwrap();

        let mut unit = UnitOfWork::new(tenant);
        unit.append(a, ExpectedVersion::Exact(0), vec![event(tenant, a, "x")]);
        unit.append(b, ExpectedVersion::Exact(0), vec![event(tenant, b, "y")]);
        unit.adjust_balance(a, dec!(10));
        let err = store.commit(unit).unwrap_err();

        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(tenant, a).unwrap().is_empty());
        assert_eq!(store.stored_balance(tenant, a).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn tenants_are_isolated() {
        let store = InMemoryEventStore::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let a = AggregateId::new();
        store.append(vec![event(t1, a, "x")], ExpectedVersion::Any).unwrap();

        assert!(store.load_stream(t2, a).unwrap().is_empty());
        assert!(store.snapshot(t2).unwrap().events.is_empty());

        let mut unit = UnitOfWork::new(t2);
        unit.append(a, ExpectedVersion::Any, vec![event(t1, a, "x")]);
        assert!(matches!(store.commit(unit).unwrap_err(), EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn stream_type_is_stable() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let a = AggregateId::new();
        store.append(vec![event(tenant, a, "x")], ExpectedVersion::Exact(0)).unwrap();

        let err = store
            .append(vec![event(tenant, a, "y")], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
