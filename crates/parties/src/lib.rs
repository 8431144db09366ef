//! Parties domain module (customers and suppliers, event-sourced).
//!
//! Besides the `Party` aggregate, this crate owns the party sub-ledger: the
//! fixed transaction sign table and the merge of every party-related record
//! into one chronological ledger with a running balance.

pub mod ledger;
pub mod party;

pub use ledger::{
    AdjustmentSignPolicy, LedgerEntry, LedgerSource, LedgerView, SignConventionError, SignRule,
    TransactionType, build_ledger, classify,
};
pub use party::{
    ContactInfo, ManualEntryRecorded, OpeningBalanceSet, Party, PartyCommand, PartyEvent,
    PartyId, PartyKind, PartyRegistered, PartyStatus, PartySuspended, RecordManualEntry,
    RecordReturn, RegisterParty, ReturnRecorded, SetOpeningBalance, SuspendParty,
};
