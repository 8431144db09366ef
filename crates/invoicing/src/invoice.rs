use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_accounting::BankAccountId;
use tallybook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, checked_line_total, checked_sum,
    ensure_non_negative, ensure_positive, round_currency, typed_id,
};
use tallybook_events::{Command, Event};
use tallybook_parties::PartyId;
use tallybook_products::ProductId;

typed_id!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

typed_id!(
    /// Payment identifier, unique within an invoice stream.
    PaymentId
);

/// Sales invoices bill customers; purchase invoices come from suppliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceKind {
    Sales,
    Purchase,
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
    Card,
}

impl PaymentMethod {
    /// Whether the payment settles through a bank account rather than cash.
    pub fn routes_through_bank(self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" | "bank" => Ok(PaymentMethod::BankTransfer),
            "cheque" | "check" => Ok(PaymentMethod::Cheque),
            "card" => Ok(PaymentMethod::Card),
            other => Err(DomainError::validation(format!("unknown payment method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl InvoiceLine {
    /// Saturates instead of overflowing; issued lines are range-checked.
    pub fn line_total(&self) -> Decimal {
        round_currency(self.quantity.saturating_mul(self.unit_price))
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    party_id: Option<PartyId>,
    kind: InvoiceKind,
    number: String,
    status: InvoiceStatus,
    lines: Vec<InvoiceLine>,
    order_ref: Option<AggregateId>,
    total_amount: Decimal,
    total_paid: Decimal,
    payments: Vec<PaymentId>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            party_id: None,
            kind: InvoiceKind::Sales,
            number: String::new(),
            status: InvoiceStatus::Open,
            lines: Vec::new(),
            order_ref: None,
            total_amount: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            payments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn party_id(&self) -> Option<PartyId> {
        self.party_id
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn order_ref(&self) -> Option<AggregateId> {
        self.order_ref
    }

    /// Invoices raised for an order are already counted through the order.
    pub fn is_standalone(&self) -> bool {
        self.order_ref.is_none()
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn total_paid(&self) -> Decimal {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> Decimal {
        self.total_amount - self.total_paid
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn can_accept_payment(&self) -> bool {
        self.created && self.status == InvoiceStatus::Open
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub party_id: PartyId,
    pub kind: InvoiceKind,
    pub number: String,
    pub lines: Vec<InvoiceLine>,
    pub order_ref: Option<AggregateId>,
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub bank_account: Option<BankAccountId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    RegisterPayment(RegisterPayment),
}

impl Command for InvoiceCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            InvoiceCommand::IssueInvoice(c) => c.invoice_id.0,
            InvoiceCommand::RegisterPayment(c) => c.invoice_id.0,
        }
    }
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub party_id: PartyId,
    pub kind: InvoiceKind,
    pub number: String,
    pub lines: Vec<InvoiceLine>,
    pub order_ref: Option<AggregateId>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub party_id: PartyId,
    pub kind: InvoiceKind,
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub bank_account: Option<BankAccountId>,
    pub new_total_paid: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentRegistered(PaymentRegistered),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.party_id = Some(e.party_id);
                self.kind = e.kind;
                self.number = e.number.clone();
                self.lines = e.lines.clone();
                self.order_ref = e.order_ref;
                self.total_amount = e.total_amount;
                self.total_paid = Decimal::ZERO;
                self.status = InvoiceStatus::Open;
                self.created = true;
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.total_paid = e.new_total_paid;
                self.payments.push(e.payment_id);
                if self.total_paid >= self.total_amount {
                    self.status = InvoiceStatus::Paid;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
        }
    }
}

impl Invoice {
    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }

        let mut total = Decimal::ZERO;
        for line in &cmd.lines {
            ensure_positive(line.quantity, "invoice line quantity")?;
            ensure_non_negative(line.unit_price, "invoice line unit price")?;
            let line_total = checked_line_total(line.quantity, line.unit_price)?;
            total = checked_sum([total, line_total], "invoice total")?;
        }
        ensure_positive(total, "invoice total")?;

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            party_id: cmd.party_id,
            kind: cmd.kind,
            number: cmd.number.trim().to_string(),
            lines: cmd.lines.clone(),
            order_ref: cmd.order_ref,
            due_date: cmd.due_date,
            total_amount: total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != cmd.invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        if self.payments.contains(&cmd.payment_id) {
            return Err(DomainError::conflict("payment already registered"));
        }

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "cannot register payment on a fully paid invoice",
            ));
        }

        ensure_positive(cmd.amount, "payment amount")?;
        if cmd.method.routes_through_bank() && cmd.bank_account.is_none() {
            return Err(DomainError::validation(format!(
                "{} payments need a bank account",
                cmd.method.as_str()
            )));
        }

        let new_total_paid = self.total_paid + round_currency(cmd.amount);
        if new_total_paid > self.total_amount {
            return Err(DomainError::invariant("cannot overpay invoice"));
        }

        let party_id = self
            .party_id
            .ok_or_else(|| DomainError::invariant("invoice party must be set"))?;

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            party_id,
            kind: self.kind,
            payment_id: cmd.payment_id,
            amount: round_currency(cmd.amount),
            method: cmd.method,
            bank_account: if cmd.method.routes_through_bank() {
                cmd.bank_account
            } else {
                None
            },
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }
}
