use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tallybook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, typed_id,
};
use tallybook_events::{Command, Event};

/// Largest debit/credit difference still accepted as balanced, unless configured.
pub fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1000"
    pub name: String, // e.g. "Cash"
    pub kind: AccountKind,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }
}

/// One line of a journal entry. Exactly one of `debit`/`credit` is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl JournalEntryLine {
    pub fn debit(account: Account, amount: Decimal) -> Self {
        Self {
            account,
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    pub fn credit(account: Account, amount: Decimal) -> Self {
        Self {
            account,
            debit: Decimal::ZERO,
            credit: amount,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.debit > Decimal::ZERO
    }

    /// The same line on the opposite side.
    pub fn reversed(&self) -> Self {
        Self {
            account: self.account.clone(),
            debit: self.credit,
            credit: self.debit,
        }
    }
}

/// Descriptive data carried with a journal entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub description: Option<String>,
    /// Business reference (order number, invoice number, payment id).
    pub reference: Option<String>,
    /// Record (order, invoice, party) whose event produced this entry.
    pub source_id: Option<AggregateId>,
    /// Entry this one corrects, when it is a reversal.
    pub reversal_of: Option<JournalEntryId>,
}

impl EntryMetadata {
    pub fn described(description: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            reference: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source_id: AggregateId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn reversing(mut self, entry_id: JournalEntryId) -> Self {
        self.reversal_of = Some(entry_id);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostingError {
    #[error("journal entry must have lines")]
    NoLines,

    #[error("journal entry needs at least one debit and one credit line")]
    OneSided,

    #[error("line {index}: {reason}")]
    InvalidLine { index: usize, reason: String },

    /// Signed `Σdebit − Σcredit` of the rejected lines.
    #[error("debits and credits differ by {difference}")]
    Unbalanced { difference: Decimal },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Totals of a validated line set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Check the double-entry invariant for `lines`.
///
/// Every line must carry exactly one positive side and no negative side; the
/// set needs a debit and a credit, and `|Σdebit − Σcredit|` must stay below
/// `tolerance`.
pub fn validate_lines(
    lines: &[JournalEntryLine],
    tolerance: Decimal,
) -> Result<PostingTotals, PostingError> {
    if lines.is_empty() {
        return Err(PostingError::NoLines);
    }

    let mut totals = PostingTotals {
        debit: Decimal::ZERO,
        credit: Decimal::ZERO,
    };
    let (mut has_debit, mut has_credit) = (false, false);

    for (index, line) in lines.iter().enumerate() {
        if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
            return Err(PostingError::InvalidLine {
                index,
                reason: "amounts cannot be negative".to_string(),
            });
        }
        match (line.debit.is_zero(), line.credit.is_zero()) {
            (false, true) => has_debit = true,
            (true, false) => has_credit = true,
            _ => {
                return Err(PostingError::InvalidLine {
                    index,
                    reason: "exactly one of debit or credit must be set".to_string(),
                });
            }
        }
        if line.account.code.trim().is_empty() {
            return Err(PostingError::InvalidLine {
                index,
                reason: "account code cannot be empty".to_string(),
            });
        }
        totals.debit = totals.debit.checked_add(line.debit).ok_or_else(|| overflow(index))?;
        totals.credit = totals.credit.checked_add(line.credit).ok_or_else(|| overflow(index))?;
    }

    if !(has_debit && has_credit) {
        return Err(PostingError::OneSided);
    }

    let difference = totals.debit - totals.credit;
    if difference.abs() >= tolerance {
        return Err(PostingError::Unbalanced { difference });
    }

    Ok(totals)
}

fn overflow(index: usize) -> PostingError {
    PostingError::InvalidLine {
        index,
        reason: "running total overflows".to_string(),
    }
}

/// Opposite-signed copy of `lines`, used to correct a posted entry.
pub fn reversal_of(lines: &[JournalEntryLine]) -> Vec<JournalEntryLine> {
    lines.iter().map(JournalEntryLine::reversed).collect()
}

typed_id!(
    /// Journal entry identifier.
    JournalEntryId
);

typed_id!(
    /// Ledger identifier (one general journal per tenant).
    LedgerId
);

impl LedgerId {
    /// The tenant's general journal stream.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::from_uuid(*tenant_id.as_uuid()))
    }
}

/// A posted journal entry as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub lines: Vec<JournalEntryLine>,
    pub is_balanced: bool,
    pub metadata: EntryMetadata,
    pub posted_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

impl From<&JournalEntryPosted> for JournalEntry {
    fn from(e: &JournalEntryPosted) -> Self {
        Self {
            id: e.entry_id,
            lines: e.lines.clone(),
            is_balanced: e.is_balanced,
            metadata: e.metadata.clone(),
            posted_at: e.occurred_at,
        }
    }
}

/// Aggregate root: Ledger (double-entry journal).
///
/// Ledger does not hold balances; it tracks identity, tenant and which entry
/// ids have been posted. Account balances are derived from the posted events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    posted: BTreeSet<JournalEntryId>,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            posted: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn has_posted(&self, entry_id: JournalEntryId) -> bool {
        self.posted.contains(&entry_id)
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: JournalEntryId,
    pub lines: Vec<JournalEntryLine>,
    pub metadata: EntryMetadata,
    pub tolerance: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
}

impl Command for JournalCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            JournalCommand::PostJournalEntry(c) => c.ledger_id.0,
        }
    }
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: JournalEntryId,
    pub lines: Vec<JournalEntryLine>,
    pub is_balanced: bool,
    pub metadata: EntryMetadata,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    JournalEntryPosted(JournalEntryPosted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = JournalCommand;
    type Event = LedgerEvent;
    type Error = PostingError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                self.id = e.ledger_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.created = true;
                }
                self.posted.insert(e.entry_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
        }
    }
}

impl Ledger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, PostingError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if self.posted.contains(&cmd.entry_id) {
            return Err(DomainError::conflict(format!("journal entry {} already posted", cmd.entry_id)).into());
        }

        // Stored exactly as given; the balance check sees the same amounts.
        validate_lines(&cmd.lines, cmd.tolerance)?;

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry_id: cmd.entry_id,
            lines: cmd.lines.clone(),
            is_balanced: true,
            metadata: cmd.metadata.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
