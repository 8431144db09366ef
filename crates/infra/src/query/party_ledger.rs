//! Collects the ledger sources of one party from the tenant log.

use std::collections::HashMap;

use rust_decimal::Decimal;

use tallybook_core::AggregateId;
use tallybook_invoicing::{Invoice, InvoiceEvent, InvoiceKind};
use tallybook_parties::{LedgerSource, LedgerView, PartyEvent, PartyId, TransactionType, build_ledger};
use tallybook_purchasing::{PurchaseOrder, PurchaseOrderEvent};
use tallybook_sales::{SalesOrder, SalesOrderEvent};

use super::rehydrate_all;
use crate::command_dispatcher::decode;
use crate::error::EngineError;
use crate::event_store::LogSnapshot;
use crate::streams;

pub const OPENING_BALANCE_REFERENCE: &str = "Opening balance";

/// Every record of `party_id` that belongs on its ledger, in log order.
///
/// Orders count only while they sit in their terminal state; invoices tied
/// to an order are skipped since the order already carries the amount.
pub fn ledger_sources(snapshot: &LogSnapshot, party_id: PartyId) -> Result<Vec<LedgerSource>, EngineError> {
    let purchases = rehydrate_all::<PurchaseOrder>(snapshot)?;
    let sales = rehydrate_all::<SalesOrder>(snapshot)?;
    let invoices = rehydrate_all::<Invoice>(snapshot)?;

    let mut sources = Vec::new();
    for stored in &snapshot.events {
        let source = match stored.aggregate_type.as_str() {
            streams::PURCHASE_ORDER => match decode::<PurchaseOrderEvent>(stored)? {
                PurchaseOrderEvent::GoodsReceived(e) if e.supplier_id == party_id => purchases
                    .get(&stored.aggregate_id)
                    .filter(|o| o.counts_toward_stock())
                    .map(|o| LedgerSource::Order {
                        date: e.occurred_at,
                        reference: o.reference().to_string(),
                        kind: TransactionType::Purchase,
                        amount: e.total,
                    }),
                _ => None,
            },
            streams::SALES_ORDER => match decode::<SalesOrderEvent>(stored)? {
                SalesOrderEvent::OrderDelivered(e) if e.customer_id == party_id => sales
                    .get(&stored.aggregate_id)
                    .filter(|o| o.counts_toward_stock())
                    .map(|o| LedgerSource::Order {
                        date: e.occurred_at,
                        reference: o.reference().to_string(),
                        kind: TransactionType::Sale,
                        amount: e.total,
                    }),
                _ => None,
            },
            streams::INVOICE => match decode::<InvoiceEvent>(stored)? {
                InvoiceEvent::InvoiceIssued(e) if e.party_id == party_id && e.order_ref.is_none() => {
                    Some(LedgerSource::Invoice {
                        date: e.occurred_at,
                        reference: e.number,
                        kind: invoice_transaction_type(e.kind),
                        amount: e.total_amount,
                    })
                }
                InvoiceEvent::PaymentRegistered(e) if e.party_id == party_id => {
                    Some(LedgerSource::Payment {
                        date: e.occurred_at,
                        reference: invoice_number(&invoices, stored.aggregate_id),
                        amount: e.amount,
                    })
                }
                _ => None,
            },
            streams::PARTY if stored.aggregate_id == party_id.0 => {
                match decode::<PartyEvent>(stored)? {
                    PartyEvent::ReturnRecorded(e) => Some(LedgerSource::Return {
                        date: e.occurred_at,
                        reference: e.reference,
                        amount: e.amount,
                    }),
                    PartyEvent::ManualEntryRecorded(e) => Some(LedgerSource::Adjustment {
                        date: e.occurred_at,
                        reference: e.reference,
                        kind: e.transaction_type,
                        amount: e.amount,
                    }),
                    PartyEvent::OpeningBalanceSet(e) => Some(LedgerSource::Adjustment {
                        date: e.occurred_at,
                        reference: OPENING_BALANCE_REFERENCE.to_string(),
                        kind: TransactionType::OpeningBalance,
                        amount: e.amount,
                    }),
                    PartyEvent::PartyRegistered(_) | PartyEvent::PartySuspended(_) => None,
                }
            }
            _ => None,
        };

        // Zero-value documents move no balance.
        if let Some(source) = source.filter(|s| !source_amount(s).is_zero()) {
            sources.push(source);
        }
    }
    Ok(sources)
}

/// The party's ledger with running balances, newest first.
pub fn party_ledger(snapshot: &LogSnapshot, party_id: PartyId) -> Result<LedgerView, EngineError> {
    let sources = ledger_sources(snapshot, party_id)?;
    Ok(build_ledger(sources)?)
}

fn invoice_transaction_type(kind: InvoiceKind) -> TransactionType {
    match kind {
        InvoiceKind::Sales => TransactionType::Sale,
        InvoiceKind::Purchase => TransactionType::Purchase,
    }
}

fn invoice_number(invoices: &HashMap<AggregateId, Invoice>, id: AggregateId) -> String {
    invoices
        .get(&id)
        .map(|i| i.number().to_string())
        .unwrap_or_default()
}

fn source_amount(source: &LedgerSource) -> Decimal {
    match source {
        LedgerSource::Order { amount, .. }
        | LedgerSource::Invoice { amount, .. }
        | LedgerSource::Payment { amount, .. }
        | LedgerSource::Return { amount, .. }
        | LedgerSource::Adjustment { amount, .. } => *amount,
    }
}
