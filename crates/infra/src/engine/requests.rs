//! Inputs and receipts of the engine facade.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_accounting::{BankAccountId, BankTransactionId, JournalEntryId};
use tallybook_core::AggregateId;
use tallybook_invoicing::{InvoiceId, PaymentId, PaymentMethod};
use tallybook_parties::{ContactInfo, PartyId, PartyKind};
use tallybook_products::{Pricing, ProductId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    pub kind: PartyKind,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub pricing: Pricing,
    pub min_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Header of a purchase order (party is the supplier) or sales order
/// (party is the customer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub party_id: PartyId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineRequest {
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// The invoice kind follows the party: customers get sales invoices,
/// suppliers purchase invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub party_id: PartyId,
    pub number: String,
    pub lines: Vec<InvoiceLineRequest>,
    /// Order this invoice bills; such invoices stay off the party ledger.
    pub order_ref: Option<AggregateId>,
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Required when `method` routes through a bank.
    pub bank_account: Option<BankAccountId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub party_id: PartyId,
    pub amount: Decimal,
    pub reference: String,
    pub order_ref: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Manual ledger entry. `transaction_type` is the sign-table name
/// (`sale`, `payment`, `adjustment`, ...), validated on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntryRequest {
    pub party_id: PartyId,
    pub transaction_type: String,
    pub amount: Decimal,
    pub reference: String,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingReceipt {
    pub entry_id: JournalEntryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: PaymentId,
    pub journal_entry_id: JournalEntryId,
    pub bank_transaction_id: Option<BankTransactionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceReceipt {
    pub invoice_id: InvoiceId,
    /// `None` for order-linked and zero-value invoices.
    pub journal_entry_id: Option<JournalEntryId>,
}

/// Quantity and value of one product, as derived from order history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub quantity: Decimal,
    pub stock_value: Decimal,
    pub oversold: bool,
}

/// Stored and derived balance of a party that agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub party_id: PartyId,
    pub balance: Decimal,
}
