//! Engine facade: the one entry point for writes and derived reads.
//!
//! Every write loads the aggregates it touches, stages their decisions, the
//! balanced journal entry, any mirrored bank transaction and the party
//! balance delta into one `UnitOfWork`, and commits once. Reads take one
//! snapshot of the tenant log and derive everything from it.

mod catalog;
mod journal;
mod orders;
mod parties;
mod reads;
pub mod requests;

pub use requests::{
    BalanceCheck, InventoryLevel, InvoiceLineRequest, InvoiceReceipt, InvoiceRequest,
    ManualEntryRequest, NewOrder, NewParty, NewProduct, OrderLineRequest, PaymentReceipt,
    PaymentRequest, PostingReceipt, ReturnRequest,
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use tallybook_accounting::{
    DerivedPosting, EntryMetadata, JournalCommand, JournalEntryId, JournalEntryLine, Ledger,
    LedgerId, PostJournalEntry, reversal_of,
};
use tallybook_core::{AggregateId, TenantId};
use tallybook_parties::{Party, PartyId};

use crate::command_dispatcher::{CommandDispatcher, Loaded};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event_store::{EventStore, UnitOfWork};
use crate::query::journal::find_posting_for_source;

/// Derived ledger and inventory engine over an event store.
#[derive(Debug)]
pub struct Engine<S> {
    dispatcher: CommandDispatcher<S>,
    config: EngineConfig,
}

impl<S> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }
}

impl<S> Engine<S>
where
    S: EventStore,
{
    fn load_journal(&self, tenant_id: TenantId) -> Result<Loaded<Ledger>, EngineError> {
        self.dispatcher
            .load::<Ledger>(tenant_id, LedgerId::for_tenant(tenant_id).0)
    }

    /// Stage a journal entry on the tenant journal; validation happens here,
    /// before anything is committed.
    fn stage_posting(
        &self,
        tenant_id: TenantId,
        journal: &mut Loaded<Ledger>,
        lines: Vec<JournalEntryLine>,
        metadata: EntryMetadata,
        occurred_at: DateTime<Utc>,
        unit: &mut UnitOfWork,
    ) -> Result<JournalEntryId, EngineError> {
        let entry_id = JournalEntryId::generate();
        journal.decide(
            &JournalCommand::PostJournalEntry(PostJournalEntry {
                tenant_id,
                ledger_id: LedgerId::for_tenant(tenant_id),
                entry_id,
                lines,
                metadata,
                tolerance: self.config.posting_tolerance,
                occurred_at,
            }),
            unit,
        )?;
        Ok(entry_id)
    }

    /// Stage the opposite-signed copy of the entry posted for `source_id`.
    ///
    /// Falls back to reversing the chart lines of `posting` when no original
    /// entry is found; nothing is staged for a zero amount.
    #[allow(clippy::too_many_arguments)]
    fn stage_reversal(
        &self,
        tenant_id: TenantId,
        journal: &mut Loaded<Ledger>,
        source_id: AggregateId,
        posting: DerivedPosting,
        amount: Decimal,
        reference: &str,
        occurred_at: DateTime<Utc>,
        unit: &mut UnitOfWork,
    ) -> Result<Option<JournalEntryId>, EngineError> {
        let metadata = EntryMetadata::described(format!("Reversal of {reference}"), reference)
            .with_source(source_id);
        let (lines, metadata) = match find_posting_for_source(journal.history(), source_id)? {
            Some(original) => (reversal_of(&original.lines), metadata.reversing(original.id)),
            None if amount.is_zero() => return Ok(None),
            None => (
                reversal_of(&self.config.accounts.lines_for(posting, amount)),
                metadata,
            ),
        };
        self.stage_posting(tenant_id, journal, lines, metadata, occurred_at, unit)
            .map(Some)
    }

    /// Load a party that must exist and be allowed to transact.
    fn load_active_party(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
    ) -> Result<Loaded<Party>, EngineError> {
        let party = self.dispatcher.load::<Party>(tenant_id, party_id.0)?;
        if !party.state().exists() {
            return Err(EngineError::NotFound);
        }
        if !party.state().can_transact() {
            return Err(EngineError::InvariantViolation(format!(
                "party {party_id} is suspended and cannot transact"
            )));
        }
        Ok(party)
    }

    fn commit(&self, operation: &'static str, unit: UnitOfWork) -> Result<(), EngineError> {
        let deltas = unit.balance_deltas().len();
        let committed = self.dispatcher.commit(unit)?;
        tracing::info!(operation, events = committed.len(), balance_deltas = deltas, "unit of work committed");
        Ok(())
    }
}
