//! Party sub-ledger: sign table and chronological merge.
//!
//! A party's ledger is never stored. It is rebuilt from the records that
//! concern the party (terminal orders, standalone invoices, payments, returns,
//! manual adjustments), each classified as a debit or a credit by the fixed
//! per-type sign table below.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a party-ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Purchase,
    OpeningBalance,
    Payment,
    Return,
    Adjustment,
    Commission,
}

/// How a transaction type decides its ledger side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignRule {
    Debit,
    Credit,
    /// Positive amounts debit, negative amounts credit.
    FollowAmountSign,
}

impl TransactionType {
    pub const ALL: [TransactionType; 7] = [
        TransactionType::Sale,
        TransactionType::Purchase,
        TransactionType::OpeningBalance,
        TransactionType::Payment,
        TransactionType::Return,
        TransactionType::Adjustment,
        TransactionType::Commission,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Sale => "sale",
            TransactionType::Purchase => "purchase",
            TransactionType::OpeningBalance => "opening_balance",
            TransactionType::Payment => "payment",
            TransactionType::Return => "return",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Commission => "commission",
        }
    }

    pub fn sign_rule(self) -> SignRule {
        match self {
            TransactionType::Sale | TransactionType::Purchase | TransactionType::OpeningBalance => {
                SignRule::Debit
            }
            TransactionType::Payment | TransactionType::Return => SignRule::Credit,
            TransactionType::Adjustment | TransactionType::Commission => {
                SignRule::FollowAmountSign
            }
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = SignConventionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| SignConventionError::UnknownType(s.to_string()))
    }
}

/// Sign handling for amount-signed kinds (`adjustment`, `commission`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSignPolicy {
    #[default]
    FollowAmountSign,
    /// Negative adjustment amounts are rejected.
    PositiveOnly,
}

impl FromStr for AdjustmentSignPolicy {
    type Err = SignConventionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "follow_amount_sign" => Ok(AdjustmentSignPolicy::FollowAmountSign),
            "positive_only" => Ok(AdjustmentSignPolicy::PositiveOnly),
            other => Err(SignConventionError::UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignConventionError {
    #[error("unknown transaction type: {0}")]
    UnknownType(String),

    #[error("unknown adjustment sign policy: {0}")]
    UnknownPolicy(String),

    #[error("{0} amount cannot be zero")]
    ZeroAmount(TransactionType),

    #[error("{kind} amount must be positive (got {amount})")]
    NegativeAmount { kind: TransactionType, amount: Decimal },

    #[error("negative {kind} amounts are not allowed (got {amount})")]
    NegativeAdjustment { kind: TransactionType, amount: Decimal },
}

/// Split a signed amount into `(debit, credit)` following the sign table.
///
/// Exactly one side of the result is non-zero.
pub fn classify(
    kind: TransactionType,
    amount: Decimal,
    policy: AdjustmentSignPolicy,
) -> Result<(Decimal, Decimal), SignConventionError> {
    if amount.is_zero() {
        return Err(SignConventionError::ZeroAmount(kind));
    }

    match kind.sign_rule() {
        SignRule::Debit | SignRule::Credit if amount < Decimal::ZERO => {
            Err(SignConventionError::NegativeAmount { kind, amount })
        }
        SignRule::Debit => Ok((amount, Decimal::ZERO)),
        SignRule::Credit => Ok((Decimal::ZERO, amount)),
        SignRule::FollowAmountSign => {
            if amount > Decimal::ZERO {
                Ok((amount, Decimal::ZERO))
            } else if policy == AdjustmentSignPolicy::PositiveOnly {
                Err(SignConventionError::NegativeAdjustment { kind, amount })
            } else {
                Ok((Decimal::ZERO, -amount))
            }
        }
    }
}

/// A record that contributes to a party's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerSource {
    /// Completed order: delivered sale or received purchase.
    Order {
        date: DateTime<Utc>,
        reference: String,
        kind: TransactionType,
        amount: Decimal,
    },
    /// Invoice not tied to an order.
    Invoice {
        date: DateTime<Utc>,
        reference: String,
        kind: TransactionType,
        amount: Decimal,
    },
    Payment {
        date: DateTime<Utc>,
        reference: String,
        amount: Decimal,
    },
    Return {
        date: DateTime<Utc>,
        reference: String,
        amount: Decimal,
    },
    /// Manual entry or opening balance.
    Adjustment {
        date: DateTime<Utc>,
        reference: String,
        kind: TransactionType,
        amount: Decimal,
    },
}

impl LedgerSource {
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            LedgerSource::Order { date, .. }
            | LedgerSource::Invoice { date, .. }
            | LedgerSource::Payment { date, .. }
            | LedgerSource::Return { date, .. }
            | LedgerSource::Adjustment { date, .. } => *date,
        }
    }

    fn into_entry(self) -> Result<LedgerEntry, SignConventionError> {
        let (date, reference, kind, amount) = match self {
            LedgerSource::Order {
                date,
                reference,
                kind,
                amount,
            }
            | LedgerSource::Invoice {
                date,
                reference,
                kind,
                amount,
            }
            | LedgerSource::Adjustment {
                date,
                reference,
                kind,
                amount,
            } => (date, reference, kind, amount),
            LedgerSource::Payment {
                date,
                reference,
                amount,
            } => (date, reference, TransactionType::Payment, amount),
            LedgerSource::Return {
                date,
                reference,
                amount,
            } => (date, reference, TransactionType::Return, amount),
        };

        // Adjustment policies were enforced when the record was written.
        let (debit, credit) = classify(kind, amount, AdjustmentSignPolicy::FollowAmountSign)?;
        Ok(LedgerEntry {
            date,
            kind,
            reference,
            debit,
            credit,
            balance: Decimal::ZERO,
        })
    }
}

/// One row of the party ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: DateTime<Utc>,
    pub kind: TransactionType,
    pub reference: String,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Running balance after this entry, in chronological order.
    pub balance: Decimal,
}

/// A party's ledger, newest entry first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerView {
    pub entries: Vec<LedgerEntry>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub opening_balance: Decimal,
    pub current_balance: Decimal,
}

impl LedgerView {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Merge `sources` (given in log order) into a ledger with running balances.
///
/// Balances accumulate oldest to newest; entries sharing a date keep their
/// log order. The view is returned newest first.
pub fn build_ledger<I>(sources: I) -> Result<LedgerView, SignConventionError>
where
    I: IntoIterator<Item = LedgerSource>,
{
    let mut entries = sources
        .into_iter()
        .map(LedgerSource::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

    // Stable sort: same-date entries stay in log order.
    entries.sort_by_key(|e| e.date);

    let mut view = LedgerView::empty();
    let mut balance = Decimal::ZERO;
    for entry in &mut entries {
        balance += entry.debit - entry.credit;
        entry.balance = balance;

        view.total_debit += entry.debit;
        view.total_credit += entry.credit;
        if entry.kind == TransactionType::OpeningBalance {
            view.opening_balance += entry.debit - entry.credit;
        }
    }

    view.current_balance = view.total_debit - view.total_credit;
    entries.reverse();
    view.entries = entries;
    Ok(view)
}
