//! Bank accounts and the cash/bank transactions mirrored from payments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, ensure_positive, typed_id,
};
use tallybook_events::{Command, Event};

use crate::ledger::JournalEntryId;

typed_id!(
    /// Bank account identifier.
    BankAccountId
);

typed_id!(BankTransactionId);

/// Money in or out of the bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankDirection {
    Deposit,
    Withdrawal,
}

/// A cash/bank movement recorded alongside a payment's journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: BankTransactionId,
    pub bank_account_id: BankAccountId,
    pub direction: BankDirection,
    pub amount: Decimal,
    pub reference: String,
    pub journal_entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

impl BankTransaction {
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            BankDirection::Deposit => self.amount,
            BankDirection::Withdrawal => -self.amount,
        }
    }
}

/// Aggregate root: BankAccount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    id: BankAccountId,
    tenant_id: Option<TenantId>,
    name: String,
    balance: Decimal,
    version: u64,
    created: bool,
}

impl BankAccount {
    pub fn empty(id: BankAccountId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            balance: Decimal::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sum of recorded transactions.
    pub fn balance(&self) -> Decimal {
        self.balance
    }
}

impl AggregateRoot for BankAccount {
    type Id = BankAccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBankAccount {
    pub tenant_id: TenantId,
    pub bank_account_id: BankAccountId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBankTransaction {
    pub tenant_id: TenantId,
    pub transaction: BankTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountCommand {
    Open(OpenBankAccount),
    RecordTransaction(RecordBankTransaction),
}

impl Command for BankAccountCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            BankAccountCommand::Open(c) => c.bank_account_id.0,
            BankAccountCommand::RecordTransaction(c) => c.transaction.bank_account_id.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountOpened {
    pub tenant_id: TenantId,
    pub bank_account_id: BankAccountId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransactionRecorded {
    pub tenant_id: TenantId,
    pub transaction: BankTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountEvent {
    BankAccountOpened(BankAccountOpened),
    BankTransactionRecorded(BankTransactionRecorded),
}

impl Event for BankAccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BankAccountEvent::BankAccountOpened(_) => "accounting.bank_account.opened",
            BankAccountEvent::BankTransactionRecorded(_) => {
                "accounting.bank_account.transaction_recorded"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BankAccountEvent::BankAccountOpened(e) => e.occurred_at,
            BankAccountEvent::BankTransactionRecorded(e) => e.transaction.occurred_at,
        }
    }
}

impl Aggregate for BankAccount {
    type Command = BankAccountCommand;
    type Event = BankAccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BankAccountEvent::BankAccountOpened(e) => {
                self.id = e.bank_account_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.created = true;
            }
            BankAccountEvent::BankTransactionRecorded(e) => {
                self.balance += e.transaction.signed_amount();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BankAccountCommand::Open(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("bank account already exists"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("bank account name cannot be empty"));
                }
                Ok(vec![BankAccountEvent::BankAccountOpened(BankAccountOpened {
                    tenant_id: cmd.tenant_id,
                    bank_account_id: cmd.bank_account_id,
                    name: cmd.name.trim().to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            BankAccountCommand::RecordTransaction(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                ensure_positive(cmd.transaction.amount, "bank transaction amount")?;
                Ok(vec![BankAccountEvent::BankTransactionRecorded(
                    BankTransactionRecorded {
                        tenant_id: cmd.tenant_id,
                        transaction: cmd.transaction.clone(),
                    },
                )])
            }
        }
    }
}
