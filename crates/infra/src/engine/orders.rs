use chrono::{DateTime, Utc};

use tallybook_accounting::{DerivedPosting, EntryMetadata, JournalEntryId};
use tallybook_core::TenantId;
use tallybook_parties::{PartyId, PartyKind};
use tallybook_products::{Product, ProductId};
use tallybook_purchasing::{
    AddLine as AddPurchaseLine, CancelPurchaseOrder, CreatePurchaseOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, ReceiveGoods,
};
use tallybook_sales::{
    AddLine as AddSalesLine, CancelSalesOrder, CreateSalesOrder, DeliverOrder, SalesOrder,
    SalesOrderCommand, SalesOrderEvent, SalesOrderId,
};

use super::{Engine, NewOrder, OrderLineRequest};
use crate::error::EngineError;
use crate::event_store::{EventStore, UnitOfWork};

impl<S> Engine<S>
where
    S: EventStore,
{
    fn ensure_party_kind(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        expected: PartyKind,
    ) -> Result<(), EngineError> {
        let party = self.load_active_party(tenant_id, party_id)?;
        if party.state().kind() != expected {
            return Err(EngineError::Validation(format!(
                "party {party_id} is a {:?}, expected a {expected:?}",
                party.state().kind()
            )));
        }
        Ok(())
    }

    fn ensure_tradeable(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), EngineError> {
        let product = self.dispatcher.load::<Product>(tenant_id, product_id.0)?;
        if !product.state().exists() {
            return Err(EngineError::NotFound);
        }
        if !product.state().can_be_traded() {
            return Err(EngineError::InvariantViolation(format!(
                "product {product_id} is archived"
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, supplier = %request.party_id))]
    pub fn create_purchase_order(
        &self,
        tenant_id: TenantId,
        request: NewOrder,
    ) -> Result<PurchaseOrderId, EngineError> {
        self.ensure_party_kind(tenant_id, request.party_id, PartyKind::Supplier)?;

        let order_id = PurchaseOrderId::generate();
        self.dispatcher.dispatch::<PurchaseOrder>(
            tenant_id,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                supplier_id: request.party_id,
                reference: request.reference,
                occurred_at: request.occurred_at,
            }),
        )?;
        Ok(order_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, order = %order_id))]
    pub fn add_purchase_line(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        request: OrderLineRequest,
    ) -> Result<(), EngineError> {
        self.ensure_tradeable(tenant_id, request.product_id)?;
        self.dispatcher.dispatch::<PurchaseOrder>(
            tenant_id,
            PurchaseOrderCommand::AddLine(AddPurchaseLine {
                tenant_id,
                order_id,
                product_id: request.product_id,
                quantity: request.quantity,
                unit_price: request.unit_price,
                occurred_at: request.occurred_at,
            }),
        )?;
        Ok(())
    }

    /// Receive the goods of a purchase order: its lines start counting
    /// toward stock, inventory is debited against payables and the supplier
    /// balance grows by the order total.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, order = %order_id))]
    pub fn receive_goods(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<JournalEntryId>, EngineError> {
        let mut order = self.dispatcher.load::<PurchaseOrder>(tenant_id, order_id.0)?;
        if let Some(supplier_id) = order.state().supplier_id() {
            self.load_active_party(tenant_id, supplier_id)?;
        }
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let events = order.decide(
            &PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                tenant_id,
                order_id,
                occurred_at,
            }),
            &mut unit,
        )?;

        let mut entry_id = None;
        for event in &events {
            let PurchaseOrderEvent::GoodsReceived(e) = event else {
                continue;
            };
            if !e.total.is_zero() {
                let reference = order.state().reference();
                entry_id = Some(self.stage_posting(
                    tenant_id,
                    &mut journal,
                    self.config.accounts.lines_for(DerivedPosting::GoodsReceived, e.total),
                    EntryMetadata::described(format!("Goods received {reference}"), reference)
                        .with_source(order_id.0),
                    e.occurred_at,
                    &mut unit,
                )?);
            }
            unit.adjust_balance(e.supplier_id.0, e.total);
        }

        self.commit("receive_goods", unit)?;
        Ok(entry_id)
    }

    /// Cancel a purchase order. Cancelling after receipt takes the lines back
    /// out of stock, reverses the receipt entry and the supplier balance.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, order = %order_id))]
    pub fn cancel_purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<JournalEntryId>, EngineError> {
        let mut order = self.dispatcher.load::<PurchaseOrder>(tenant_id, order_id.0)?;
        let total = order.state().total();
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let events = order.decide(
            &PurchaseOrderCommand::Cancel(CancelPurchaseOrder {
                tenant_id,
                order_id,
                reason,
                occurred_at,
            }),
            &mut unit,
        )?;

        let mut entry_id = None;
        let reverses = events.iter().any(|e| {
            matches!(e, PurchaseOrderEvent::PurchaseOrderCancelled(c) if c.reverses_receipt)
        });
        if let (true, Some(supplier_id)) = (reverses, order.state().supplier_id()) {
            entry_id = self.stage_reversal(
                tenant_id,
                &mut journal,
                order_id.0,
                DerivedPosting::GoodsReceived,
                total,
                order.state().reference(),
                occurred_at,
                &mut unit,
            )?;
            unit.adjust_balance(supplier_id.0, -total);
        }

        self.commit("cancel_purchase_order", unit)?;
        Ok(entry_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, customer = %request.party_id))]
    pub fn create_sales_order(&self, tenant_id: TenantId, request: NewOrder) -> Result<SalesOrderId, EngineError> {
        self.ensure_party_kind(tenant_id, request.party_id, PartyKind::Customer)?;

        let order_id = SalesOrderId::generate();
        self.dispatcher.dispatch::<SalesOrder>(
            tenant_id,
            SalesOrderCommand::CreateSalesOrder(CreateSalesOrder {
                tenant_id,
                order_id,
                customer_id: request.party_id,
                reference: request.reference,
                occurred_at: request.occurred_at,
            }),
        )?;
        Ok(order_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, order = %order_id))]
    pub fn add_sales_line(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        request: OrderLineRequest,
    ) -> Result<(), EngineError> {
        self.ensure_tradeable(tenant_id, request.product_id)?;
        self.dispatcher.dispatch::<SalesOrder>(
            tenant_id,
            SalesOrderCommand::AddLine(AddSalesLine {
                tenant_id,
                order_id,
                product_id: request.product_id,
                quantity: request.quantity,
                unit_price: request.unit_price,
                occurred_at: request.occurred_at,
            }),
        )?;
        Ok(())
    }

    /// Deliver a sales order: its lines leave stock, receivables are debited
    /// against revenue and the customer balance grows by the order total.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, order = %order_id))]
    pub fn deliver_sales_order(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<JournalEntryId>, EngineError> {
        let mut order = self.dispatcher.load::<SalesOrder>(tenant_id, order_id.0)?;
        if let Some(customer_id) = order.state().customer_id() {
            self.load_active_party(tenant_id, customer_id)?;
        }
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let events = order.decide(
            &SalesOrderCommand::Deliver(DeliverOrder {
                tenant_id,
                order_id,
                occurred_at,
            }),
            &mut unit,
        )?;

        let mut entry_id = None;
        for event in &events {
            let SalesOrderEvent::OrderDelivered(e) = event else {
                continue;
            };
            if !e.total.is_zero() {
                let reference = order.state().reference();
                entry_id = Some(self.stage_posting(
                    tenant_id,
                    &mut journal,
                    self.config.accounts.lines_for(DerivedPosting::SaleDelivered, e.total),
                    EntryMetadata::described(format!("Sale delivered {reference}"), reference)
                        .with_source(order_id.0),
                    e.occurred_at,
                    &mut unit,
                )?);
            }
            unit.adjust_balance(e.customer_id.0, e.total);
        }

        self.commit("deliver_sales_order", unit)?;
        Ok(entry_id)
    }

    /// Cancel a sales order. Cancelling a delivered order restores stock and
    /// reverses the sale entry and the customer balance.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, order = %order_id))]
    pub fn cancel_sales_order(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<JournalEntryId>, EngineError> {
        let mut order = self.dispatcher.load::<SalesOrder>(tenant_id, order_id.0)?;
        let total = order.state().total();
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let events = order.decide(
            &SalesOrderCommand::Cancel(CancelSalesOrder {
                tenant_id,
                order_id,
                reason,
                occurred_at,
            }),
            &mut unit,
        )?;

        let mut entry_id = None;
        let reverses = events.iter().any(|e| {
            matches!(e, SalesOrderEvent::SalesOrderCancelled(c) if c.reverses_delivery)
        });
        if let (true, Some(customer_id)) = (reverses, order.state().customer_id()) {
            entry_id = self.stage_reversal(
                tenant_id,
                &mut journal,
                order_id.0,
                DerivedPosting::SaleDelivered,
                total,
                order.state().reference(),
                occurred_at,
                &mut unit,
            )?;
            unit.adjust_balance(customer_id.0, -total);
        }

        self.commit("cancel_sales_order", unit)?;
        Ok(entry_id)
    }
}
