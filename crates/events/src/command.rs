use tallybook_core::AggregateId;

/// A command targets a specific aggregate stream.
///
/// Commands represent **intent** ("receive the goods of order X"). They are
/// never persisted; the events an aggregate decides from them are.
///
/// Tenant scoping is carried by the command payloads and re-checked by the
/// store when events are committed.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
