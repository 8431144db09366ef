//! Two-line postings derived from business events.
//!
//! Each business event that moves money maps to exactly one debit account and
//! one credit account of the configured chart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{Account, AccountKind, JournalEntryLine};

/// Accounts used by derived postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOfAccounts {
    pub cash: Account,
    pub bank: Account,
    pub receivable: Account,
    pub payable: Account,
    pub inventory: Account,
    pub sales_revenue: Account,
    pub sales_returns: Account,
    pub purchase_expense: Account,
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self {
            cash: Account::new("1000", "Cash", AccountKind::Asset),
            bank: Account::new("1010", "Bank", AccountKind::Asset),
            receivable: Account::new("1100", "Accounts Receivable", AccountKind::Asset),
            inventory: Account::new("1200", "Inventory", AccountKind::Asset),
            payable: Account::new("2000", "Accounts Payable", AccountKind::Liability),
            sales_revenue: Account::new("4000", "Sales Revenue", AccountKind::Revenue),
            sales_returns: Account::new("4100", "Sales Returns", AccountKind::Revenue),
            purchase_expense: Account::new("5000", "Purchases", AccountKind::Expense),
        }
    }
}

/// Business events that produce a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedPosting {
    /// Customer pays a sales invoice.
    PaymentReceived { via_bank: bool },
    /// We pay a supplier's purchase invoice.
    PaymentMade { via_bank: bool },
    GoodsReceived,
    SaleDelivered,
    SalesInvoiceIssued,
    PurchaseInvoiceIssued,
    CustomerReturn,
    SupplierReturn,
}

impl ChartOfAccounts {
    fn money_account(&self, via_bank: bool) -> &Account {
        if via_bank { &self.bank } else { &self.cash }
    }

    /// `(debit, credit)` accounts for `posting`.
    pub fn accounts_for(&self, posting: DerivedPosting) -> (&Account, &Account) {
        match posting {
            DerivedPosting::PaymentReceived { via_bank } => {
                (self.money_account(via_bank), &self.receivable)
            }
            DerivedPosting::PaymentMade { via_bank } => (&self.payable, self.money_account(via_bank)),
            DerivedPosting::GoodsReceived => (&self.inventory, &self.payable),
            DerivedPosting::SaleDelivered | DerivedPosting::SalesInvoiceIssued => {
                (&self.receivable, &self.sales_revenue)
            }
            DerivedPosting::PurchaseInvoiceIssued => (&self.purchase_expense, &self.payable),
            DerivedPosting::CustomerReturn => (&self.sales_returns, &self.receivable),
            DerivedPosting::SupplierReturn => (&self.payable, &self.inventory),
        }
    }

    /// The two balanced lines for `posting` of `amount`.
    pub fn lines_for(&self, posting: DerivedPosting, amount: Decimal) -> Vec<JournalEntryLine> {
        let (debit, credit) = self.accounts_for(posting);
        vec![
            JournalEntryLine::debit(debit.clone(), amount),
            JournalEntryLine::credit(credit.clone(), amount),
        ]
    }
}
