//! Binding between domain aggregates and their event streams.

use tallybook_accounting::{BankAccount, BankAccountId, Ledger, LedgerId};
use tallybook_core::{Aggregate, AggregateId};
use tallybook_invoicing::{Invoice, InvoiceId};
use tallybook_parties::{Party, PartyId};
use tallybook_products::{Product, ProductId};
use tallybook_purchasing::{PurchaseOrder, PurchaseOrderId};
use tallybook_sales::{SalesOrder, SalesOrderId};

pub const PRODUCT: &str = "products.product";
pub const PURCHASE_ORDER: &str = "purchasing.order";
pub const SALES_ORDER: &str = "sales.order";
pub const INVOICE: &str = "invoicing.invoice";
pub const PARTY: &str = "parties.party";
pub const LEDGER: &str = "accounting.ledger";
pub const BANK_ACCOUNT: &str = "accounting.bank_account";

/// An aggregate persisted as one stream of the tenant log.
pub trait StreamAggregate: Aggregate {
    /// Stored on every event; a stream never changes type.
    const AGGREGATE_TYPE: &'static str;

    /// Not-yet-created instance used for rehydration.
    fn empty_for(id: AggregateId) -> Self;
}

impl StreamAggregate for Product {
    const AGGREGATE_TYPE: &'static str = PRODUCT;

    fn empty_for(id: AggregateId) -> Self {
        Product::empty(ProductId::new(id))
    }
}

impl StreamAggregate for PurchaseOrder {
    const AGGREGATE_TYPE: &'static str = PURCHASE_ORDER;

    fn empty_for(id: AggregateId) -> Self {
        PurchaseOrder::empty(PurchaseOrderId::new(id))
    }
}

impl StreamAggregate for SalesOrder {
    const AGGREGATE_TYPE: &'static str = SALES_ORDER;

    fn empty_for(id: AggregateId) -> Self {
        SalesOrder::empty(SalesOrderId::new(id))
    }
}

impl StreamAggregate for Invoice {
    const AGGREGATE_TYPE: &'static str = INVOICE;

    fn empty_for(id: AggregateId) -> Self {
        Invoice::empty(InvoiceId::new(id))
    }
}

impl StreamAggregate for Party {
    const AGGREGATE_TYPE: &'static str = PARTY;

    fn empty_for(id: AggregateId) -> Self {
        Party::empty(PartyId::new(id))
    }
}

impl StreamAggregate for Ledger {
    const AGGREGATE_TYPE: &'static str = LEDGER;

    fn empty_for(id: AggregateId) -> Self {
        Ledger::empty(LedgerId::new(id))
    }
}

impl StreamAggregate for BankAccount {
    const AGGREGATE_TYPE: &'static str = BANK_ACCOUNT;

    fn empty_for(id: AggregateId) -> Self {
        BankAccount::empty(BankAccountId::new(id))
    }
}
