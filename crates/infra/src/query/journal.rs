//! Read-back of posted journal entries and mirrored bank transactions.

use tallybook_accounting::{
    BankAccountEvent, BankAccountId, BankTransaction, JournalEntry, JournalEntryId, LedgerEvent,
};
use tallybook_core::AggregateId;

use crate::command_dispatcher::decode;
use crate::error::EngineError;
use crate::event_store::StoredEvent;
use crate::streams;

/// Journal entries found in `events`, in posting order.
pub fn journal_entries<'a, I>(events: I) -> Result<Vec<JournalEntry>, EngineError>
where
    I: IntoIterator<Item = &'a StoredEvent>,
{
    events
        .into_iter()
        .filter(|e| e.aggregate_type == streams::LEDGER)
        .map(|stored| -> Result<JournalEntry, EngineError> {
            let LedgerEvent::JournalEntryPosted(posted) = decode::<LedgerEvent>(stored)?;
            Ok(JournalEntry::from(&posted))
        })
        .collect()
}

pub fn find_entry<'a, I>(events: I, entry_id: JournalEntryId) -> Result<Option<JournalEntry>, EngineError>
where
    I: IntoIterator<Item = &'a StoredEvent>,
{
    Ok(journal_entries(events)?.into_iter().find(|e| e.id == entry_id))
}

/// The original (non-reversal) entry posted for `source_id`, if any.
pub fn find_posting_for_source<'a, I>(
    events: I,
    source_id: AggregateId,
) -> Result<Option<JournalEntry>, EngineError>
where
    I: IntoIterator<Item = &'a StoredEvent>,
{
    Ok(journal_entries(events)?.into_iter().find(|e| {
        e.metadata.source_id == Some(source_id) && e.metadata.reversal_of.is_none()
    }))
}

/// Transactions recorded on `bank_account_id`, in log order.
pub fn bank_transactions<'a, I>(
    events: I,
    bank_account_id: BankAccountId,
) -> Result<Vec<BankTransaction>, EngineError>
where
    I: IntoIterator<Item = &'a StoredEvent>,
{
    let mut transactions = Vec::new();
    for stored in events
        .into_iter()
        .filter(|e| e.aggregate_type == streams::BANK_ACCOUNT && e.aggregate_id == bank_account_id.0)
    {
        if let BankAccountEvent::BankTransactionRecorded(e) = decode::<BankAccountEvent>(stored)? {
            transactions.push(e.transaction);
        }
    }
    Ok(transactions)
}
