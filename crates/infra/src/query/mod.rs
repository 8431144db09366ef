//! Derived reads over a `LogSnapshot`.
//!
//! Nothing here is cached: each function recomputes from the snapshot it is
//! given, so two reads of the same snapshot always agree.

pub mod inventory;
pub mod journal;
pub mod party_ledger;

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use tallybook_core::AggregateId;

use crate::command_dispatcher::decode;
use crate::error::EngineError;
use crate::event_store::LogSnapshot;
use crate::streams::StreamAggregate;

/// Rebuild every aggregate of type `A` present in the snapshot.
pub fn rehydrate_all<A>(snapshot: &LogSnapshot) -> Result<HashMap<AggregateId, A>, EngineError>
where
    A: StreamAggregate,
    A::Event: DeserializeOwned,
{
    let mut aggregates: HashMap<AggregateId, A> = HashMap::new();
    for stored in snapshot
        .events
        .iter()
        .filter(|e| e.aggregate_type == A::AGGREGATE_TYPE)
    {
        let event: A::Event = decode(stored)?;
        aggregates
            .entry(stored.aggregate_id)
            .or_insert_with(|| A::empty_for(stored.aggregate_id))
            .apply(&event);
    }
    Ok(aggregates)
}

/// Rebuild one aggregate from the snapshot; `None` if its stream is empty.
pub fn rehydrate<A>(snapshot: &LogSnapshot, aggregate_id: AggregateId) -> Result<Option<A>, EngineError>
where
    A: StreamAggregate,
    A::Event: DeserializeOwned,
{
    let mut aggregate: Option<A> = None;
    for stored in snapshot
        .stream(aggregate_id)
        .filter(|e| e.aggregate_type == A::AGGREGATE_TYPE)
    {
        let event: A::Event = decode(stored)?;
        aggregate
            .get_or_insert_with(|| A::empty_for(aggregate_id))
            .apply(&event);
    }
    Ok(aggregate)
}
