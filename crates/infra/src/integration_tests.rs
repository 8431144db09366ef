//! Integration tests for the engine over the in-memory store.
//!
//! Tests: facade write → UnitOfWork → EventStore → snapshot → derived read
//!
//! Verifies:
//! - Stock and valuation are derived from completed orders only
//! - Stored party balances always equal the derived ledger
//! - Journal postings are balanced, and a rejected write persists nothing
//! - Concurrent writers on one stream conflict; relative balance deltas do not
//! - Reads fail open when the store is unavailable

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tallybook_accounting::{BankDirection, EntryMetadata, JournalEntryLine};
use tallybook_core::{AggregateId, TenantId};
use tallybook_inventory::StockFloorPolicy;
use tallybook_invoicing::{
    Invoice, InvoiceCommand, InvoiceId, PaymentId, PaymentMethod, RegisterPayment,
};
use tallybook_parties::{
    AdjustmentSignPolicy, Party, PartyCommand, PartyEvent, PartyId, PartyKind, RecordManualEntry,
    TransactionType,
};
use tallybook_products::{Pricing, ProductId};
use tallybook_purchasing::PurchaseOrderId;
use tallybook_sales::SalesOrderId;

use crate::command_dispatcher::CommandDispatcher;
use crate::config::EngineConfig;
use crate::engine::{
    Engine, InvoiceLineRequest, InvoiceRequest, ManualEntryRequest, NewOrder, NewParty, NewProduct,
    OrderLineRequest, PaymentRequest, ReturnRequest,
};
use crate::error::EngineError;
use crate::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, LogSnapshot, StoredEvent, UnitOfWork,
};

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap()
}

fn setup() -> (Engine<InMemoryEventStore>, TenantId) {
    tallybook_observability::init_for_tests();
    (Engine::new(InMemoryEventStore::new()), TenantId::new())
}

fn party<S: EventStore>(engine: &Engine<S>, tenant: TenantId, kind: PartyKind, name: &str) -> PartyId {
    engine
        .register_party(
            tenant,
            NewParty {
                kind,
                name: name.to_string(),
                contact: None,
                occurred_at: day(1),
            },
        )
        .unwrap()
}

fn product<S: EventStore>(engine: &Engine<S>, tenant: TenantId, sku: &str, cost: Decimal) -> ProductId {
    engine
        .create_product(
            tenant,
            NewProduct {
                sku: sku.to_string(),
                name: format!("Product {sku}"),
                unit: "pcs".to_string(),
                pricing: Pricing {
                    cost_price: cost,
                    selling_price: cost * dec!(1.5),
                },
                min_stock: dec!(2),
                occurred_at: day(1),
            },
        )
        .unwrap()
}

fn received_purchase<S: EventStore>(
    engine: &Engine<S>,
    tenant: TenantId,
    supplier: PartyId,
    product_id: ProductId,
    quantity: Decimal,
    unit_price: Decimal,
    at: DateTime<Utc>,
) -> PurchaseOrderId {
    let order = engine
        .create_purchase_order(
            tenant,
            NewOrder {
                party_id: supplier,
                reference: format!("PO-{}", at.timestamp()),
                occurred_at: at,
            },
        )
        .unwrap();
    engine
        .add_purchase_line(
            tenant,
            order,
            OrderLineRequest {
                product_id,
                quantity,
                unit_price,
                occurred_at: at,
            },
        )
        .unwrap();
    engine.receive_goods(tenant, order, at).unwrap();
    order
}

fn delivered_sale<S: EventStore>(
    engine: &Engine<S>,
    tenant: TenantId,
    customer: PartyId,
    product_id: ProductId,
    quantity: Decimal,
    unit_price: Decimal,
    at: DateTime<Utc>,
) -> SalesOrderId {
    let order = engine
        .create_sales_order(
            tenant,
            NewOrder {
                party_id: customer,
                reference: format!("SO-{}", at.timestamp()),
                occurred_at: at,
            },
        )
        .unwrap();
    engine
        .add_sales_line(
            tenant,
            order,
            OrderLineRequest {
                product_id,
                quantity,
                unit_price,
                occurred_at: at,
            },
        )
        .unwrap();
    engine.deliver_sales_order(tenant, order, at).unwrap();
    order
}

fn invoice<S: EventStore>(
    engine: &Engine<S>,
    tenant: TenantId,
    party_id: PartyId,
    number: &str,
    amount: Decimal,
    order_ref: Option<AggregateId>,
    at: DateTime<Utc>,
) -> InvoiceId {
    engine
        .issue_invoice(
            tenant,
            InvoiceRequest {
                party_id,
                number: number.to_string(),
                lines: vec![InvoiceLineRequest {
                    product_id: None,
                    description: "Services".to_string(),
                    quantity: dec!(1),
                    unit_price: amount,
                }],
                order_ref,
                due_date: None,
                occurred_at: at,
            },
        )
        .unwrap()
        .invoice_id
}

fn cash_payment(invoice_id: InvoiceId, amount: Decimal, at: DateTime<Utc>) -> PaymentRequest {
    PaymentRequest {
        invoice_id,
        amount,
        method: PaymentMethod::Cash,
        bank_account: None,
        occurred_at: at,
    }
}

fn assert_consistent<S: EventStore>(engine: &Engine<S>, tenant: TenantId, party_id: PartyId) -> Decimal {
    let check = engine.verify_balance(tenant, party_id).unwrap();
    assert_eq!(check.balance, engine.ledger(tenant, party_id).current_balance);
    check.balance
}

#[test]
fn product_without_history_has_no_stock() {
    let (engine, tenant) = setup();
    let widget = product(&engine, tenant, "W-1", dec!(450));

    let level = engine.inventory(tenant, widget);
    assert_eq!(level.quantity, Decimal::ZERO);
    assert_eq!(level.stock_value, Decimal::ZERO);
    assert!(!level.oversold);
}

#[test]
fn received_goods_are_valued_at_the_receipt_price() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let widget = product(&engine, tenant, "W-1", dec!(450));

    received_purchase(&engine, tenant, supplier, widget, dec!(10), dec!(500), day(2));

    let level = engine.inventory(tenant, widget);
    assert_eq!(level.quantity, dec!(10));
    assert_eq!(level.stock_value, dec!(5000));
}

#[test]
fn delivered_sale_reduces_stock() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let widget = product(&engine, tenant, "W-1", dec!(450));

    received_purchase(&engine, tenant, supplier, widget, dec!(10), dec!(500), day(2));
    delivered_sale(&engine, tenant, customer, widget, dec!(4), dec!(800), day(3));

    let level = engine.inventory(tenant, widget);
    assert_eq!(level.quantity, dec!(6));
    assert_eq!(level.stock_value, dec!(3000));

    let report = engine.stock_report(tenant);
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.total_quantity, dec!(6));
    assert_eq!(report.total_value, dec!(3000));
}

#[test]
fn pending_orders_do_not_move_stock() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let widget = product(&engine, tenant, "W-1", dec!(450));

    let order = engine
        .create_purchase_order(
            tenant,
            NewOrder {
                party_id: supplier,
                reference: "PO-PENDING".to_string(),
                occurred_at: day(2),
            },
        )
        .unwrap();
    engine
        .add_purchase_line(
            tenant,
            order,
            OrderLineRequest {
                product_id: widget,
                quantity: dec!(5),
                unit_price: dec!(500),
                occurred_at: day(2),
            },
        )
        .unwrap();

    assert_eq!(engine.inventory(tenant, widget).quantity, Decimal::ZERO);
    assert!(engine.ledger(tenant, supplier).entries.is_empty());
    assert!(engine.journal_entries(tenant).unwrap().is_empty());
}

#[test]
fn ledger_runs_opening_balance_sale_and_payment() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    received_purchase(&engine, tenant, supplier, widget, dec!(10), dec!(100), day(1));

    engine.set_opening_balance(tenant, customer, dec!(500), day(2)).unwrap();
    let order = delivered_sale(&engine, tenant, customer, widget, dec!(1), dec!(200), day(3));
    let billed = invoice(&engine, tenant, customer, "INV-1", dec!(200), Some(order.0), day(3));
    engine
        .process_payment(tenant, cash_payment(billed, dec!(100), day(4)))
        .unwrap();

    let ledger = engine.ledger(tenant, customer);
    assert_eq!(ledger.current_balance, dec!(600));
    assert_eq!(ledger.opening_balance, dec!(500));

    let kinds: Vec<_> = ledger.entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![TransactionType::Payment, TransactionType::Sale, TransactionType::OpeningBalance]
    );
    let balances: Vec<_> = ledger.entries.iter().map(|e| e.balance).collect();
    assert_eq!(balances, vec![dec!(600), dec!(700), dec!(500)]);
    assert_eq!(ledger.entries[0].reference, "INV-1");

    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(600));
}

#[test]
fn unbalanced_posting_is_rejected_and_nothing_is_persisted() {
    let (engine, tenant) = setup();
    let accounts = engine.config().accounts.clone();

    let err = engine
        .post(
            tenant,
            vec![
                JournalEntryLine::debit(accounts.cash.clone(), dec!(100)),
                JournalEntryLine::credit(accounts.sales_revenue.clone(), dec!(90)),
            ],
            EntryMetadata::described("Bad entry", "X-1"),
            day(2),
        )
        .unwrap_err();

    assert_eq!(err, EngineError::UnbalancedPosting { difference: dec!(10) });
    assert!(engine.journal_entries(tenant).unwrap().is_empty());
    assert!(engine.store().snapshot(tenant).unwrap().events.is_empty());
}

#[test]
fn balanced_posting_reads_back_unchanged() {
    let (engine, tenant) = setup();
    let accounts = engine.config().accounts.clone();
    let lines = vec![
        JournalEntryLine::debit(accounts.cash.clone(), dec!(125.50)),
        JournalEntryLine::credit(accounts.sales_revenue.clone(), dec!(125.50)),
    ];

    let receipt = engine
        .post(tenant, lines.clone(), EntryMetadata::described("Cash sale", "CS-1"), day(2))
        .unwrap();

    let entry = engine.get_journal_entry(tenant, receipt.entry_id).unwrap().unwrap();
    assert_eq!(entry.lines, lines);
    assert!(entry.is_balanced);
    assert_eq!(entry.metadata.reference.as_deref(), Some("CS-1"));

    assert_eq!(engine.get_journal_entry(TenantId::new(), receipt.entry_id).unwrap(), None);
}

#[test]
fn stored_balance_tracks_ledger_through_every_write() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    let bank = engine.open_bank_account(tenant, "Main account", day(1)).unwrap();

    received_purchase(&engine, tenant, supplier, widget, dec!(10), dec!(100), day(2));
    assert_eq!(assert_consistent(&engine, tenant, supplier), dec!(1000));

    let freight = invoice(&engine, tenant, supplier, "PINV-7", dec!(250), None, day(3));
    assert_eq!(assert_consistent(&engine, tenant, supplier), dec!(1250));

    engine
        .process_payment(
            tenant,
            PaymentRequest {
                invoice_id: freight,
                amount: dec!(250),
                method: PaymentMethod::BankTransfer,
                bank_account: Some(bank),
                occurred_at: day(4),
            },
        )
        .unwrap();
    assert_eq!(assert_consistent(&engine, tenant, supplier), dec!(1000));

    engine
        .record_return(
            tenant,
            ReturnRequest {
                party_id: supplier,
                amount: dec!(100),
                reference: "RET-1".to_string(),
                order_ref: None,
                occurred_at: day(5),
            },
        )
        .unwrap();
    assert_eq!(assert_consistent(&engine, tenant, supplier), dec!(900));

    delivered_sale(&engine, tenant, customer, widget, dec!(3), dec!(150), day(5));
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(450));

    engine
        .record_manual_entry(
            tenant,
            ManualEntryRequest {
                party_id: customer,
                transaction_type: "adjustment".to_string(),
                amount: dec!(-50),
                reference: "ADJ-1".to_string(),
                note: Some("goodwill".to_string()),
                occurred_at: day(6),
            },
        )
        .unwrap();
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(400));

    let ledger = engine.ledger(tenant, customer);
    assert_eq!(ledger.entries[0].credit, dec!(50));
    assert_eq!(ledger.total_debit - ledger.total_credit, dec!(400));
}

#[test]
fn every_derived_posting_is_balanced() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let widget = product(&engine, tenant, "W-1", dec!(100));

    received_purchase(&engine, tenant, supplier, widget, dec!(3), dec!(33.33), day(2));
    let order = delivered_sale(&engine, tenant, customer, widget, dec!(2), dec!(49.99), day(3));
    let standalone = invoice(&engine, tenant, customer, "INV-9", dec!(10.01), None, day(3));
    engine
        .process_payment(tenant, cash_payment(standalone, dec!(10.01), day(4)))
        .unwrap();
    engine.cancel_sales_order(tenant, order, None, day(5)).unwrap();

    let entries = engine.journal_entries(tenant).unwrap();
    assert_eq!(entries.len(), 5);
    for entry in entries {
        let debit: Decimal = entry.lines.iter().map(|l| l.debit).sum();
        let credit: Decimal = entry.lines.iter().map(|l| l.credit).sum();
        assert!(entry.is_balanced);
        assert!((debit - credit).abs() <= dec!(0.01));
    }
}

#[test]
fn cancelling_a_delivered_order_reverses_its_entry_and_restores_stock() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    received_purchase(&engine, tenant, supplier, widget, dec!(10), dec!(100), day(2));

    let order = delivered_sale(&engine, tenant, customer, widget, dec!(4), dec!(150), day(3));
    assert_eq!(engine.inventory(tenant, widget).quantity, dec!(6));
    let original = engine
        .journal_entries(tenant)
        .unwrap()
        .into_iter()
        .find(|e| e.metadata.source_id == Some(order.0))
        .unwrap();

    let reversal_id = engine
        .cancel_sales_order(tenant, order, Some("customer cancelled".to_string()), day(4))
        .unwrap()
        .unwrap();

    let reversal = engine.get_journal_entry(tenant, reversal_id).unwrap().unwrap();
    assert_eq!(reversal.metadata.reversal_of, Some(original.id));
    assert_eq!(reversal.lines.len(), original.lines.len());
    for (rev, orig) in reversal.lines.iter().zip(&original.lines) {
        assert_eq!(rev.account, orig.account);
        assert_eq!(rev.debit, orig.credit);
        assert_eq!(rev.credit, orig.debit);
    }

    assert_eq!(engine.inventory(tenant, widget).quantity, dec!(10));
    assert!(engine.ledger(tenant, customer).entries.is_empty());
    assert_eq!(assert_consistent(&engine, tenant, customer), Decimal::ZERO);
}

#[test]
fn cancelling_a_pending_order_posts_nothing() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");

    let order = engine
        .create_purchase_order(
            tenant,
            NewOrder {
                party_id: supplier,
                reference: "PO-1".to_string(),
                occurred_at: day(2),
            },
        )
        .unwrap();
    let entry = engine.cancel_purchase_order(tenant, order, None, day(3)).unwrap();

    assert_eq!(entry, None);
    assert!(engine.journal_entries(tenant).unwrap().is_empty());
    assert_eq!(assert_consistent(&engine, tenant, supplier), Decimal::ZERO);
}

#[test]
fn bank_payment_is_mirrored_as_a_bank_transaction() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let bank = engine.open_bank_account(tenant, "Main account", day(1)).unwrap();
    let billed = invoice(&engine, tenant, customer, "INV-1", dec!(300), None, day(2));

    let receipt = engine
        .process_payment(
            tenant,
            PaymentRequest {
                invoice_id: billed,
                amount: dec!(120),
                method: PaymentMethod::Card,
                bank_account: Some(bank),
                occurred_at: day(3),
            },
        )
        .unwrap();

    let transactions = engine.bank_transactions(tenant, bank).unwrap();
    assert_eq!(transactions.len(), 1);
    let tx = &transactions[0];
    assert_eq!(Some(tx.id), receipt.bank_transaction_id);
    assert_eq!(tx.direction, BankDirection::Deposit);
    assert_eq!(tx.amount, dec!(120));
    assert_eq!(tx.reference, "INV-1");
    assert_eq!(tx.journal_entry_id, receipt.journal_entry_id);

    let entry = engine
        .get_journal_entry(tenant, receipt.journal_entry_id)
        .unwrap()
        .unwrap();
    let accounts = &engine.config().accounts;
    assert!(entry.lines.iter().any(|l| l.account == accounts.bank && l.debit == dec!(120)));
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(180));
}

#[test]
fn bank_payment_without_account_is_insufficient_data() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let billed = invoice(&engine, tenant, customer, "INV-1", dec!(300), None, day(2));

    let err = engine
        .process_payment(
            tenant,
            PaymentRequest {
                invoice_id: billed,
                amount: dec!(100),
                method: PaymentMethod::Cheque,
                bank_account: None,
                occurred_at: day(3),
            },
        )
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientData(_)));
    assert_eq!(engine.journal_entries(tenant).unwrap().len(), 1);
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(300));
}

#[test]
fn rejected_payment_leaves_no_partial_writes() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let billed = invoice(&engine, tenant, customer, "INV-1", dec!(300), None, day(2));
    let before = engine.store().snapshot(tenant).unwrap();

    let overpaid = engine.process_payment(tenant, cash_payment(billed, dec!(301), day(3)));
    assert!(matches!(overpaid, Err(EngineError::InvariantViolation(_))));

    let missing_bank = engine.process_payment(
        tenant,
        PaymentRequest {
            invoice_id: billed,
            amount: dec!(10),
            method: PaymentMethod::BankTransfer,
            bank_account: Some(tallybook_accounting::BankAccountId::generate()),
            occurred_at: day(3),
        },
    );
    assert_eq!(missing_bank, Err(EngineError::NotFound));

    assert_eq!(engine.store().snapshot(tenant).unwrap(), before);
}

#[test]
fn invoice_for_another_partys_order_is_rejected() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let alice = party(&engine, tenant, PartyKind::Customer, "Alice");
    let bob = party(&engine, tenant, PartyKind::Customer, "Bob");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    received_purchase(&engine, tenant, supplier, widget, dec!(5), dec!(100), day(2));
    let order = delivered_sale(&engine, tenant, alice, widget, dec!(1), dec!(150), day(3));

    let err = engine
        .issue_invoice(
            tenant,
            InvoiceRequest {
                party_id: bob,
                number: "INV-X".to_string(),
                lines: vec![InvoiceLineRequest {
                    product_id: Some(widget),
                    description: "Widget".to_string(),
                    quantity: dec!(1),
                    unit_price: dec!(150),
                }],
                order_ref: Some(order.0),
                due_date: None,
                occurred_at: day(3),
            },
        )
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(assert_consistent(&engine, tenant, bob), Decimal::ZERO);
}

#[test]
fn suspended_party_cannot_transact() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    engine
        .suspend_party(tenant, customer, Some("credit hold".to_string()), day(2))
        .unwrap();

    let err = engine
        .create_sales_order(
            tenant,
            NewOrder {
                party_id: customer,
                reference: "SO-1".to_string(),
                occurred_at: day(3),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));

    let err = engine
        .record_return(
            tenant,
            ReturnRequest {
                party_id: customer,
                amount: dec!(10),
                reference: "RET-1".to_string(),
                order_ref: None,
                occurred_at: day(3),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));

    let err = engine
        .record_manual_entry(
            tenant,
            ManualEntryRequest {
                party_id: customer,
                transaction_type: "adjustment".to_string(),
                amount: dec!(10),
                reference: "ADJ-1".to_string(),
                note: None,
                occurred_at: day(3),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));

    let err = engine
        .set_opening_balance(tenant, customer, dec!(100), day(3))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));
    assert!(engine.ledger(tenant, customer).entries.is_empty());
}

#[test]
fn manual_entries_and_opening_balances_are_rounded_to_cents() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");

    engine.set_opening_balance(tenant, customer, dec!(100.004), day(2)).unwrap();
    engine
        .record_manual_entry(
            tenant,
            ManualEntryRequest {
                party_id: customer,
                transaction_type: "adjustment".to_string(),
                amount: dec!(10.005),
                reference: "ADJ-1".to_string(),
                note: None,
                occurred_at: day(3),
            },
        )
        .unwrap();

    let ledger = engine.ledger(tenant, customer);
    assert_eq!(ledger.opening_balance, dec!(100));
    assert_eq!(ledger.entries[0].debit, dec!(10.01));
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(110.01));

    // Rounds to zero, which no manual entry may carry.
    let err = engine
        .record_manual_entry(
            tenant,
            ManualEntryRequest {
                party_id: customer,
                transaction_type: "adjustment".to_string(),
                amount: dec!(0.004),
                reference: "ADJ-2".to_string(),
                note: None,
                occurred_at: day(4),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSignConvention(_)));
}

#[test]
fn unknown_manual_entry_type_is_a_sign_convention_error() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");

    let err = engine
        .record_manual_entry(
            tenant,
            ManualEntryRequest {
                party_id: customer,
                transaction_type: "rebate".to_string(),
                amount: dec!(10),
                reference: "R-1".to_string(),
                note: None,
                occurred_at: day(2),
            },
        )
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidSignConvention(_)));
    assert!(engine.ledger(tenant, customer).entries.is_empty());
}

#[test]
fn positive_only_policy_rejects_negative_adjustments() {
    tallybook_observability::init_for_tests();
    let config = EngineConfig {
        adjustment_sign: AdjustmentSignPolicy::PositiveOnly,
        ..EngineConfig::default()
    };
    let engine = Engine::with_config(InMemoryEventStore::new(), config);
    let tenant = TenantId::new();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");

    let request = |amount| ManualEntryRequest {
        party_id: customer,
        transaction_type: "commission".to_string(),
        amount,
        reference: "C-1".to_string(),
        note: None,
        occurred_at: day(2),
    };

    let err = engine.record_manual_entry(tenant, request(dec!(-25))).unwrap_err();
    assert!(matches!(err, EngineError::InvalidSignConvention(_)));

    engine.record_manual_entry(tenant, request(dec!(25))).unwrap();
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(25));
}

#[test]
fn reads_are_repeatable_and_tenant_scoped() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    received_purchase(&engine, tenant, supplier, widget, dec!(7), dec!(110), day(2));

    assert_eq!(engine.ledger(tenant, supplier), engine.ledger(tenant, supplier));
    assert_eq!(engine.inventory(tenant, widget), engine.inventory(tenant, widget));
    assert_eq!(engine.stock_report(tenant), engine.stock_report(tenant));

    let other = TenantId::new();
    assert_eq!(engine.inventory(other, widget).quantity, Decimal::ZERO);
    assert!(engine.ledger(other, supplier).entries.is_empty());
    assert_eq!(engine.verify_balance(other, supplier), Err(EngineError::NotFound));
}

#[test]
fn sub_cent_postings_are_stored_exactly() {
    let (engine, tenant) = setup();
    let accounts = engine.config().accounts.clone();

    let split = vec![
        JournalEntryLine::debit(accounts.cash.clone(), dec!(0.005)),
        JournalEntryLine::debit(accounts.bank.clone(), dec!(0.005)),
        JournalEntryLine::credit(accounts.sales_revenue.clone(), dec!(0.01)),
    ];
    let receipt = engine
        .post(tenant, split.clone(), EntryMetadata::described("Split", "S-1"), day(2))
        .unwrap();
    let entry = engine.get_journal_entry(tenant, receipt.entry_id).unwrap().unwrap();
    assert_eq!(entry.lines, split);

    let exact = vec![
        JournalEntryLine::debit(accounts.cash.clone(), dec!(10.005)),
        JournalEntryLine::credit(accounts.sales_revenue.clone(), dec!(10.005)),
    ];
    let receipt = engine
        .post(tenant, exact.clone(), EntryMetadata::described("Exact", "S-2"), day(2))
        .unwrap();
    let entry = engine.get_journal_entry(tenant, receipt.entry_id).unwrap().unwrap();
    assert_eq!(entry.lines, exact);
    assert_eq!(entry.lines[0].debit, dec!(10.005));
}

#[test]
fn out_of_range_order_line_is_rejected() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    let huge = Decimal::from(1_000_000_000_000_000_000u64);

    let order = engine
        .create_purchase_order(
            tenant,
            NewOrder {
                party_id: supplier,
                reference: "PO-HUGE".to_string(),
                occurred_at: day(2),
            },
        )
        .unwrap();
    let err = engine
        .add_purchase_line(
            tenant,
            order,
            OrderLineRequest {
                product_id: widget,
                quantity: huge,
                unit_price: huge,
                occurred_at: day(2),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // The order stayed empty, so there is nothing to receive.
    assert!(matches!(
        engine.receive_goods(tenant, order, day(3)),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(engine.inventory(tenant, widget).quantity, Decimal::ZERO);
    assert!(engine.journal_entries(tenant).unwrap().is_empty());
}

#[test]
fn archived_product_cannot_be_ordered() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    received_purchase(&engine, tenant, supplier, widget, dec!(4), dec!(100), day(2));

    engine.archive_product(tenant, widget, day(3)).unwrap();

    let order = engine
        .create_purchase_order(
            tenant,
            NewOrder {
                party_id: supplier,
                reference: "PO-2".to_string(),
                occurred_at: day(4),
            },
        )
        .unwrap();
    let err = engine
        .add_purchase_line(
            tenant,
            order,
            OrderLineRequest {
                product_id: widget,
                quantity: dec!(1),
                unit_price: dec!(100),
                occurred_at: day(4),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));

    // Stock already on hand is still reported.
    assert_eq!(engine.inventory(tenant, widget).quantity, dec!(4));
    assert!(matches!(
        engine.archive_product(tenant, widget, day(5)),
        Err(EngineError::Concurrency(_))
    ));
    assert_eq!(
        engine.archive_product(tenant, ProductId::generate(), day(5)),
        Err(EngineError::NotFound)
    );
}

#[test]
fn changed_cost_price_is_the_valuation_fallback() {
    let (engine, tenant) = setup();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let widget = product(&engine, tenant, "W-1", dec!(100));
    let pricing = |cost| Pricing {
        cost_price: cost,
        selling_price: dec!(300),
    };

    engine.change_pricing(tenant, widget, pricing(dec!(120)), day(2)).unwrap();
    let report = engine.stock_report(tenant);
    assert_eq!(report.rows[0].position.unit_cost, dec!(120));

    // A receipt price wins over the catalog cost.
    received_purchase(&engine, tenant, supplier, widget, dec!(2), dec!(95), day(3));
    engine.change_pricing(tenant, widget, pricing(dec!(130)), day(4)).unwrap();
    let report = engine.stock_report(tenant);
    assert_eq!(report.rows[0].position.unit_cost, dec!(95));
    assert_eq!(report.total_value, dec!(190));

    let err = engine
        .change_pricing(tenant, widget, pricing(dec!(-1)), day(5))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn report_policy_exposes_oversold_stock() {
    tallybook_observability::init_for_tests();
    let config = EngineConfig {
        stock_floor: StockFloorPolicy::Report,
        ..EngineConfig::default()
    };
    let engine = Engine::with_config(InMemoryEventStore::new(), config);
    let tenant = TenantId::new();
    let supplier = party(&engine, tenant, PartyKind::Supplier, "Acme Supply");
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let widget = product(&engine, tenant, "W-1", dec!(10));

    received_purchase(&engine, tenant, supplier, widget, dec!(2), dec!(10), day(2));
    delivered_sale(&engine, tenant, customer, widget, dec!(5), dec!(30), day(3));

    let level = engine.inventory(tenant, widget);
    assert!(level.oversold);
    assert_eq!(level.quantity, dec!(-3));
    assert_eq!(level.stock_value, dec!(-30));

    let report = engine.stock_report(tenant);
    assert_eq!(report.oversold_count, 1);
    assert_eq!(report.total_quantity, dec!(-3));
}

#[test]
fn stale_balance_is_reported_and_left_alone() {
    let (engine, tenant) = setup();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    invoice(&engine, tenant, customer, "INV-1", dec!(100), None, day(2));

    // A balance change with no event behind it.
    let mut unit = UnitOfWork::new(tenant);
    unit.adjust_balance(customer.0, dec!(25));
    engine.store().commit(unit).unwrap();

    let expected = EngineError::StaleBalance {
        party_id: customer.0,
        stored: dec!(125),
        derived: dec!(100),
    };
    assert_eq!(engine.verify_balance(tenant, customer), Err(expected.clone()));
    assert_eq!(engine.store().stored_balance(tenant, customer.0).unwrap(), dec!(125));
    assert_eq!(engine.ledger(tenant, customer).current_balance, dec!(100));
    assert_eq!(engine.verify_balance(tenant, customer), Err(expected));
}

fn shared_engine() -> (
    Engine<Arc<InMemoryEventStore>>,
    CommandDispatcher<Arc<InMemoryEventStore>>,
    TenantId,
) {
    tallybook_observability::init_for_tests();
    let store = Arc::new(InMemoryEventStore::new());
    (
        Engine::new(Arc::clone(&store)),
        CommandDispatcher::new(store),
        TenantId::new(),
    )
}

fn cash_register(tenant: TenantId, invoice_id: InvoiceId, amount: Decimal) -> InvoiceCommand {
    InvoiceCommand::RegisterPayment(RegisterPayment {
        tenant_id: tenant,
        invoice_id,
        payment_id: PaymentId::generate(),
        amount,
        method: PaymentMethod::Cash,
        bank_account: None,
        occurred_at: day(3),
    })
}

#[test]
fn writers_racing_on_one_invoice_conflict() {
    let (engine, dispatcher, tenant) = shared_engine();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let billed = invoice(&engine, tenant, customer, "INV-1", dec!(300), None, day(2));

    let mut first = dispatcher.load::<Invoice>(tenant, billed.0).unwrap();
    let mut second = dispatcher.load::<Invoice>(tenant, billed.0).unwrap();
    assert_eq!(first.version(), second.version());

    let mut unit = UnitOfWork::new(tenant);
    first.decide(&cash_register(tenant, billed, dec!(200)), &mut unit).unwrap();
    unit.adjust_balance(customer.0, dec!(-200));
    dispatcher.commit(unit).unwrap();

    // Decided against the stale state, where 200 still fits.
    let mut unit = UnitOfWork::new(tenant);
    second.decide(&cash_register(tenant, billed, dec!(200)), &mut unit).unwrap();
    unit.adjust_balance(customer.0, dec!(-200));
    let err = dispatcher.commit(unit).unwrap_err();
    assert!(matches!(err, EngineError::Concurrency(_)));

    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(100));
}

#[test]
fn writers_racing_on_one_party_conflict() {
    let (engine, dispatcher, tenant) = shared_engine();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");

    let manual = |amount, reference: &str| {
        PartyCommand::RecordManualEntry(RecordManualEntry {
            tenant_id: tenant,
            party_id: customer,
            transaction_type: TransactionType::Adjustment,
            amount,
            reference: reference.to_string(),
            note: None,
            sign_policy: AdjustmentSignPolicy::default(),
            occurred_at: day(2),
        })
    };

    let mut first = dispatcher.load::<Party>(tenant, customer.0).unwrap();
    let mut second = dispatcher.load::<Party>(tenant, customer.0).unwrap();
    let mut outcomes = Vec::new();
    for (loaded, amount, reference) in [(&mut first, dec!(40), "ADJ-1"), (&mut second, dec!(60), "ADJ-2")] {
        let mut unit = UnitOfWork::new(tenant);
        let events = loaded.decide(&manual(amount, reference), &mut unit).unwrap();
        unit.adjust_balance(customer.0, events.iter().map(PartyEvent::balance_delta).sum());
        outcomes.push(dispatcher.commit(unit));
    }

    assert!(outcomes[0].is_ok());
    assert!(matches!(outcomes[1], Err(EngineError::Concurrency(_))));
    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(40));
}

#[test]
fn interleaved_payment_and_manual_entry_both_count() {
    let (engine, dispatcher, tenant) = shared_engine();
    let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
    let billed = invoice(&engine, tenant, customer, "INV-1", dec!(300), None, day(2));

    // Stage a manual entry, let a payment commit, then commit the entry.
    let mut loaded = dispatcher.load::<Party>(tenant, customer.0).unwrap();
    let mut unit = UnitOfWork::new(tenant);
    let events = loaded
        .decide(
            &PartyCommand::RecordManualEntry(RecordManualEntry {
                tenant_id: tenant,
                party_id: customer,
                transaction_type: TransactionType::Adjustment,
                amount: dec!(50),
                reference: "ADJ-1".to_string(),
                note: None,
                sign_policy: AdjustmentSignPolicy::default(),
                occurred_at: day(3),
            }),
            &mut unit,
        )
        .unwrap();
    let delta: Decimal = events.iter().map(PartyEvent::balance_delta).sum();
    assert_eq!(delta, dec!(50));
    unit.adjust_balance(customer.0, delta);

    engine
        .process_payment(tenant, cash_payment(billed, dec!(100), day(3)))
        .unwrap();
    dispatcher.commit(unit).unwrap();

    assert_eq!(assert_consistent(&engine, tenant, customer), dec!(250));
    assert_eq!(engine.ledger(tenant, customer).entries.len(), 3);
}

#[derive(Debug, Clone)]
enum Write {
    Invoice(i64),
    Pay { invoice: usize, cents: i64 },
    Adjust(i64),
    Return(i64),
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        (1i64..100_000).prop_map(Write::Invoice),
        (any::<usize>(), 1i64..100_000).prop_map(|(invoice, cents)| Write::Pay { invoice, cents }),
        (-50_000i64..50_000).prop_map(Write::Adjust),
        (1i64..20_000).prop_map(Write::Return),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Whatever mix of writes succeeds or is refused, the stored balance
    /// matches the derived ledger after every one.
    #[test]
    fn random_writes_keep_balances_consistent(writes in prop::collection::vec(write_strategy(), 1..24)) {
        let (engine, tenant) = setup();
        let customer = party(&engine, tenant, PartyKind::Customer, "Beta Retail");
        let mut invoices = Vec::new();

        for (i, write) in writes.iter().enumerate() {
            let at = day(2) + Duration::minutes(i as i64);
            let outcome = match write {
                Write::Invoice(cents) => engine
                    .issue_invoice(
                        tenant,
                        InvoiceRequest {
                            party_id: customer,
                            number: format!("INV-{i}"),
                            lines: vec![InvoiceLineRequest {
                                product_id: None,
                                description: "Services".to_string(),
                                quantity: dec!(1),
                                unit_price: Decimal::new(*cents, 2),
                            }],
                            order_ref: None,
                            due_date: None,
                            occurred_at: at,
                        },
                    )
                    .map(|receipt| invoices.push(receipt.invoice_id)),
                Write::Pay { invoice, cents } if !invoices.is_empty() => {
                    let invoice_id = invoices[invoice % invoices.len()];
                    engine
                        .process_payment(tenant, cash_payment(invoice_id, Decimal::new(*cents, 2), at))
                        .map(|_| ())
                }
                Write::Pay { .. } => Ok(()),
                Write::Adjust(cents) => engine.record_manual_entry(
                    tenant,
                    ManualEntryRequest {
                        party_id: customer,
                        transaction_type: "adjustment".to_string(),
                        amount: Decimal::new(*cents, 2),
                        reference: format!("ADJ-{i}"),
                        note: None,
                        occurred_at: at,
                    },
                ),
                Write::Return(cents) => engine
                    .record_return(
                        tenant,
                        ReturnRequest {
                            party_id: customer,
                            amount: Decimal::new(*cents, 2),
                            reference: format!("RET-{i}"),
                            order_ref: None,
                            occurred_at: at,
                        },
                    )
                    .map(|_| ()),
            };
            // Overpayments and zero adjustments are refused; both are fine here.
            if let Err(err) = outcome {
                prop_assert!(
                    matches!(err, EngineError::InvariantViolation(_) | EngineError::InvalidSignConvention(_)),
                    "unexpected error: {err:?}"
                );
            }

            let check = engine.verify_balance(tenant, customer);
            prop_assert!(check.is_ok(), "balance drifted: {check:?}");
            let ledger = engine.ledger(tenant, customer);
            prop_assert_eq!(check.map(|c| c.balance).ok(), Some(ledger.current_balance));
        }
    }
}

/// Store double whose every call fails as if the backing store were down.
struct UnavailableStore;

impl EventStore for UnavailableStore {
    fn commit(&self, _unit: UnitOfWork) -> Result<Vec<StoredEvent>, EventStoreError> {
        Err(EventStoreError::Unavailable("offline".to_string()))
    }

    fn load_stream(
        &self,
        _tenant_id: TenantId,
        _aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        Err(EventStoreError::Unavailable("offline".to_string()))
    }

    fn snapshot(&self, _tenant_id: TenantId) -> Result<LogSnapshot, EventStoreError> {
        Err(EventStoreError::Unavailable("offline".to_string()))
    }

    fn stored_balance(
        &self,
        _tenant_id: TenantId,
        _party_id: AggregateId,
    ) -> Result<Decimal, EventStoreError> {
        Err(EventStoreError::Unavailable("offline".to_string()))
    }
}

#[test]
fn reads_fail_open_when_the_store_is_unavailable() {
    tallybook_observability::init_for_tests();
    let engine = Engine::new(UnavailableStore);
    let tenant = TenantId::new();
    let party_id = PartyId::generate();

    let level = engine.inventory(tenant, ProductId::generate());
    assert_eq!(level.quantity, Decimal::ZERO);
    assert_eq!(level.stock_value, Decimal::ZERO);
    assert!(engine.stock_report(tenant).rows.is_empty());
    assert!(engine.ledger(tenant, party_id).entries.is_empty());

    assert!(matches!(
        engine.verify_balance(tenant, party_id),
        Err(EngineError::DataUnavailable(_))
    ));
    let err = engine
        .register_party(
            tenant,
            NewParty {
                kind: PartyKind::Customer,
                name: "Nobody".to_string(),
                contact: None,
                occurred_at: day(1),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::DataUnavailable(_)));
}
