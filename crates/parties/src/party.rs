use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, typed_id};
use tallybook_events::{Command, Event};

use crate::ledger::{AdjustmentSignPolicy, TransactionType, classify};

typed_id!(
    /// Party identifier (tenant-scoped via `tenant_id` fields in events/commands).
    PartyId
);

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

/// Party status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

/// Contact information for a party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Party (customer or supplier).
///
/// The party stream also carries the ledger records that are authored
/// directly against a party: returns, manual entries and the opening balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    tenant_id: Option<TenantId>,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    status: PartyStatus,
    opening_balance_set: bool,
    version: u64,
    created: bool,
}

impl Party {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: PartyKind::Customer,
            name: String::new(),
            contact: ContactInfo::default(),
            status: PartyStatus::Active,
            opening_balance_set: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    pub fn has_opening_balance(&self) -> bool {
        self.opening_balance_set
    }

    /// Suspended parties cannot transact.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == PartyStatus::Active
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    /// Optional human-readable reason for suspension.
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReturn (goods returned by a customer or to a supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReturn {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub amount: Decimal,
    pub reference: String,
    /// Order the goods came from, if any.
    pub order_ref: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordManualEntry (ledger adjustment authored by an operator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordManualEntry {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub transaction_type: TransactionType,
    /// Signed for `adjustment`/`commission`, positive otherwise.
    pub amount: Decimal,
    pub reference: String,
    pub note: Option<String>,
    pub sign_policy: AdjustmentSignPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetOpeningBalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOpeningBalance {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    SuspendParty(SuspendParty),
    RecordReturn(RecordReturn),
    RecordManualEntry(RecordManualEntry),
    SetOpeningBalance(SetOpeningBalance),
}

impl Command for PartyCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            PartyCommand::RegisterParty(c) => c.party_id.0,
            PartyCommand::SuspendParty(c) => c.party_id.0,
            PartyCommand::RecordReturn(c) => c.party_id.0,
            PartyCommand::RecordManualEntry(c) => c.party_id.0,
            PartyCommand::SetOpeningBalance(c) => c.party_id.0,
        }
    }
}

/// Event: PartyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartySuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySuspended {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecorded {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub amount: Decimal,
    pub reference: String,
    pub order_ref: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManualEntryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntryRecorded {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub reference: String,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OpeningBalanceSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningBalanceSet {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    PartySuspended(PartySuspended),
    ReturnRecorded(ReturnRecorded),
    ManualEntryRecorded(ManualEntryRecorded),
    OpeningBalanceSet(OpeningBalanceSet),
}

impl PartyEvent {
    /// Effect of this event on the party's running balance (debit positive).
    pub fn balance_delta(&self) -> Decimal {
        match self {
            PartyEvent::PartyRegistered(_) | PartyEvent::PartySuspended(_) => Decimal::ZERO,
            PartyEvent::ReturnRecorded(e) => -e.amount,
            // Recorded entries passed classification when they were written.
            PartyEvent::ManualEntryRecorded(e) => {
                classify(e.transaction_type, e.amount, AdjustmentSignPolicy::FollowAmountSign)
                    .map(|(debit, credit)| debit - credit)
                    .unwrap_or(Decimal::ZERO)
            }
            PartyEvent::OpeningBalanceSet(e) => e.amount,
        }
    }
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::PartySuspended(_) => "parties.party.suspended",
            PartyEvent::ReturnRecorded(_) => "parties.party.return_recorded",
            PartyEvent::ManualEntryRecorded(_) => "parties.party.manual_entry_recorded",
            PartyEvent::OpeningBalanceSet(_) => "parties.party.opening_balance_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::PartySuspended(e) => e.occurred_at,
            PartyEvent::ReturnRecorded(e) => e.occurred_at,
            PartyEvent::ManualEntryRecorded(e) => e.occurred_at,
            PartyEvent::OpeningBalanceSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = PartyStatus::Active;
                self.created = true;
            }
            PartyEvent::PartySuspended(_) => {
                self.status = PartyStatus::Suspended;
            }
            PartyEvent::OpeningBalanceSet(_) => {
                self.opening_balance_set = true;
            }
            PartyEvent::ReturnRecorded(_) | PartyEvent::ManualEntryRecorded(_) => {}
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => self.handle_register(cmd),
            PartyCommand::SuspendParty(cmd) => self.handle_suspend(cmd),
            PartyCommand::RecordReturn(cmd) => self.handle_return(cmd),
            PartyCommand::RecordManualEntry(cmd) => self.handle_manual_entry(cmd),
            PartyCommand::SetOpeningBalance(cmd) => self.handle_opening_balance(cmd),
        }
    }
}

impl Party {
    fn ensure_existing(&self, tenant_id: TenantId, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn ensure_can_transact(&self) -> Result<(), DomainError> {
        if !self.can_transact() {
            return Err(DomainError::invariant("suspended parties cannot transact"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            kind: cmd.kind,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        if self.status == PartyStatus::Suspended {
            return Err(DomainError::conflict("party is already suspended"));
        }

        Ok(vec![PartyEvent::PartySuspended(PartySuspended {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &RecordReturn) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;
        self.ensure_can_transact()?;
        classify(TransactionType::Return, cmd.amount, AdjustmentSignPolicy::default())
            .map_err(|e| DomainError::validation(e.to_string()))?;

        Ok(vec![PartyEvent::ReturnRecorded(ReturnRecorded {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            kind: self.kind,
            amount: cmd.amount,
            reference: cmd.reference.clone(),
            order_ref: cmd.order_ref,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_manual_entry(&self, cmd: &RecordManualEntry) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        if cmd.transaction_type == TransactionType::OpeningBalance {
            return Err(DomainError::validation(
                "opening balances are set once, not recorded as manual entries",
            ));
        }
        classify(cmd.transaction_type, cmd.amount, cmd.sign_policy)
            .map_err(|e| DomainError::validation(e.to_string()))?;

        Ok(vec![PartyEvent::ManualEntryRecorded(ManualEntryRecorded {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            transaction_type: cmd.transaction_type,
            amount: cmd.amount,
            reference: cmd.reference.clone(),
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_opening_balance(&self, cmd: &SetOpeningBalance) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        if self.opening_balance_set {
            return Err(DomainError::conflict("opening balance already set"));
        }
        classify(TransactionType::OpeningBalance, cmd.amount, AdjustmentSignPolicy::default())
            .map_err(|e| DomainError::validation(e.to_string()))?;

        Ok(vec![PartyEvent::OpeningBalanceSet(OpeningBalanceSet {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}
