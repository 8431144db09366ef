use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, checked_line_total, checked_sum,
    ensure_non_negative, ensure_positive, round_currency, typed_id,
};
use tallybook_events::{Command, Event};
use tallybook_parties::PartyId;
use tallybook_products::ProductId;

typed_id!(
    /// Sales order identifier (tenant-scoped via `tenant_id` fields in events/commands).
    SalesOrderId
);

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    Pending,
    Delivered,
    Cancelled,
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl OrderLine {
    /// Saturates instead of overflowing; lines are range-checked when added.
    pub fn line_total(&self) -> Decimal {
        round_currency(self.quantity.saturating_mul(self.unit_price))
    }
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    customer_id: Option<PartyId>,
    reference: String,
    status: SalesOrderStatus,
    lines: Vec<OrderLine>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SalesOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            reference: String::new(),
            status: SalesOrderStatus::Pending,
            lines: Vec::new(),
            delivered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Pending)
    }

    /// Whether the lines currently count as delivered stock.
    pub fn counts_toward_stock(&self) -> bool {
        self.status == SalesOrderStatus::Delivered
    }

    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(OrderLine::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: PartyId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    CreateSalesOrder(CreateSalesOrder),
    AddLine(AddLine),
    Deliver(DeliverOrder),
    Cancel(CancelSalesOrder),
}

impl Command for SalesOrderCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            SalesOrderCommand::CreateSalesOrder(c) => c.order_id.0,
            SalesOrderCommand::AddLine(c) => c.order_id.0,
            SalesOrderCommand::Deliver(c) => c.order_id.0,
            SalesOrderCommand::Cancel(c) => c.order_id.0,
        }
    }
}

/// Event: SalesOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: PartyId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderLineAdded {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line: OrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: PartyId,
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    /// True when the order had been delivered (its stock is restored).
    pub reverses_delivery: bool,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    SalesOrderCreated(SalesOrderCreated),
    SalesOrderLineAdded(SalesOrderLineAdded),
    OrderDelivered(OrderDelivered),
    SalesOrderCancelled(SalesOrderCancelled),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::SalesOrderCreated(_) => "sales.order.created",
            SalesOrderEvent::SalesOrderLineAdded(_) => "sales.order.line_added",
            SalesOrderEvent::OrderDelivered(_) => "sales.order.delivered",
            SalesOrderEvent::SalesOrderCancelled(_) => "sales.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::SalesOrderCreated(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderLineAdded(e) => e.occurred_at,
            SalesOrderEvent::OrderDelivered(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::SalesOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.reference = e.reference.clone();
                self.status = SalesOrderStatus::Pending;
                self.lines.clear();
                self.created = true;
            }
            SalesOrderEvent::SalesOrderLineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            SalesOrderEvent::OrderDelivered(e) => {
                self.lines = e.lines.clone();
                self.status = SalesOrderStatus::Delivered;
                self.delivered_at = Some(e.occurred_at);
            }
            SalesOrderEvent::SalesOrderCancelled(_) => {
                self.status = SalesOrderStatus::Cancelled;
                self.delivered_at = None;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::CreateSalesOrder(cmd) => self.handle_create(cmd),
            SalesOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SalesOrderCommand::Deliver(cmd) => self.handle_deliver(cmd),
            SalesOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SalesOrder {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales order already exists"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("reference cannot be empty"));
        }

        Ok(vec![SalesOrderEvent::SalesOrderCreated(SalesOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            reference: cmd.reference.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "cannot modify order once it is delivered or cancelled",
            ));
        }

        ensure_positive(cmd.quantity, "quantity")?;
        ensure_non_negative(cmd.unit_price, "unit price")?;

        let line_total = checked_line_total(cmd.quantity, cmd.unit_price)?;
        checked_sum([self.total(), line_total], "order total")?;

        let next_line_no = u32::try_from(self.lines.len() + 1)
            .map_err(|_| DomainError::validation("order has too many lines"))?;

        Ok(vec![SalesOrderEvent::SalesOrderLineAdded(SalesOrderLineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line: OrderLine {
                line_no: next_line_no,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        match self.status {
            SalesOrderStatus::Pending => {}
            SalesOrderStatus::Delivered => {
                return Err(DomainError::conflict("order already delivered"));
            }
            SalesOrderStatus::Cancelled => {
                return Err(DomainError::invariant("cannot deliver a cancelled order"));
            }
        }

        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot deliver an order without lines"));
        }

        let customer_id = self
            .customer_id
            .ok_or_else(|| DomainError::invariant("customer must be set"))?;

        Ok(vec![SalesOrderEvent::OrderDelivered(OrderDelivered {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            customer_id,
            lines: self.lines.clone(),
            total: self.total(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status == SalesOrderStatus::Cancelled {
            return Err(DomainError::conflict("order is already cancelled"));
        }

        Ok(vec![SalesOrderEvent::SalesOrderCancelled(SalesOrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reverses_delivery: self.status == SalesOrderStatus::Delivered,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
