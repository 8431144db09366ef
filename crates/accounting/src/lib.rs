//! Accounting module (double-entry journal, event-sourced).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod bank;
pub mod ledger;
pub mod postings;

pub use bank::{
    BankAccount, BankAccountCommand, BankAccountEvent, BankAccountId, BankAccountOpened,
    BankDirection, BankTransaction, BankTransactionId, BankTransactionRecorded, OpenBankAccount,
    RecordBankTransaction,
};
pub use ledger::{
    Account, AccountKind, EntryMetadata, JournalCommand, JournalEntry, JournalEntryId,
    JournalEntryLine, JournalEntryPosted, Ledger, LedgerEvent, LedgerId, PostJournalEntry,
    PostingError, PostingTotals, default_tolerance, reversal_of, validate_lines,
};
pub use postings::{ChartOfAccounts, DerivedPosting};
