use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use tallybook_accounting::{DerivedPosting, EntryMetadata, JournalEntryId};
use tallybook_core::{TenantId, round_currency};
use tallybook_parties::{
    Party, PartyCommand, PartyEvent, PartyId, PartyKind, RecordManualEntry, RecordReturn,
    RegisterParty, SetOpeningBalance, SuspendParty, TransactionType, classify,
};

use super::{Engine, ManualEntryRequest, NewParty, ReturnRequest};
use crate::error::EngineError;
use crate::event_store::{EventStore, UnitOfWork};

fn balance_delta(events: &[PartyEvent]) -> Decimal {
    events.iter().map(PartyEvent::balance_delta).sum()
}

impl<S> Engine<S>
where
    S: EventStore,
{
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, kind = ?request.kind))]
    pub fn register_party(&self, tenant_id: TenantId, request: NewParty) -> Result<PartyId, EngineError> {
        let party_id = PartyId::generate();
        self.dispatcher.dispatch::<Party>(
            tenant_id,
            PartyCommand::RegisterParty(RegisterParty {
                tenant_id,
                party_id,
                kind: request.kind,
                name: request.name,
                contact: request.contact,
                occurred_at: request.occurred_at,
            }),
        )?;
        tracing::info!(%party_id, "party registered");
        Ok(party_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, party = %party_id))]
    pub fn suspend_party(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.dispatcher.dispatch::<Party>(
            tenant_id,
            PartyCommand::SuspendParty(SuspendParty {
                tenant_id,
                party_id,
                reason,
                occurred_at,
            }),
        )?;
        Ok(())
    }

    /// Record a return: credits the party and posts the return entry.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, party = %request.party_id))]
    pub fn record_return(&self, tenant_id: TenantId, request: ReturnRequest) -> Result<JournalEntryId, EngineError> {
        let mut party = self.load_active_party(tenant_id, request.party_id)?;
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let amount = round_currency(request.amount);
        let events = party.decide(
            &PartyCommand::RecordReturn(RecordReturn {
                tenant_id,
                party_id: request.party_id,
                amount,
                reference: request.reference.clone(),
                order_ref: request.order_ref,
                occurred_at: request.occurred_at,
            }),
            &mut unit,
        )?;

        let posting = match party.state().kind() {
            PartyKind::Customer => DerivedPosting::CustomerReturn,
            PartyKind::Supplier => DerivedPosting::SupplierReturn,
        };
        let entry_id = self.stage_posting(
            tenant_id,
            &mut journal,
            self.config.accounts.lines_for(posting, amount),
            EntryMetadata::described(format!("Return {}", request.reference), request.reference)
                .with_source(request.party_id.0),
            request.occurred_at,
            &mut unit,
        )?;
        unit.adjust_balance(request.party_id.0, balance_delta(&events));

        self.commit("record_return", unit)?;
        Ok(entry_id)
    }

    /// Record a manual ledger entry. Touches the party sub-ledger and its
    /// stored balance only. The amount is rounded to currency precision
    /// before its sign is checked.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, party = %request.party_id))]
    pub fn record_manual_entry(&self, tenant_id: TenantId, request: ManualEntryRequest) -> Result<(), EngineError> {
        let transaction_type: TransactionType = request.transaction_type.parse()?;
        let amount = round_currency(request.amount);
        classify(transaction_type, amount, self.config.adjustment_sign)?;

        let mut party = self.load_active_party(tenant_id, request.party_id)?;
        let mut unit = UnitOfWork::new(tenant_id);
        let events = party.decide(
            &PartyCommand::RecordManualEntry(RecordManualEntry {
                tenant_id,
                party_id: request.party_id,
                transaction_type,
                amount,
                reference: request.reference,
                note: request.note,
                sign_policy: self.config.adjustment_sign,
                occurred_at: request.occurred_at,
            }),
            &mut unit,
        )?;
        unit.adjust_balance(request.party_id.0, balance_delta(&events));

        self.commit("record_manual_entry", unit)
    }

    /// Set the party's opening balance (once).
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, party = %party_id))]
    pub fn set_opening_balance(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut party = self.load_active_party(tenant_id, party_id)?;
        let mut unit = UnitOfWork::new(tenant_id);
        let events = party.decide(
            &PartyCommand::SetOpeningBalance(SetOpeningBalance {
                tenant_id,
                party_id,
                amount: round_currency(amount),
                occurred_at,
            }),
            &mut unit,
        )?;
        unit.adjust_balance(party_id.0, balance_delta(&events));

        self.commit("set_opening_balance", unit)
    }
}
