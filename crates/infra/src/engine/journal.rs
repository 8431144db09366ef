use chrono::{DateTime, Utc};

use tallybook_accounting::{
    BankAccount, BankAccountCommand, BankDirection, BankTransaction, BankTransactionId,
    DerivedPosting, EntryMetadata, JournalEntryLine, RecordBankTransaction,
};
use tallybook_core::{AggregateId, TenantId, round_currency};
use tallybook_invoicing::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceKind, InvoiceLine, IssueInvoice,
    PaymentId, RegisterPayment,
};
use tallybook_parties::{PartyId, PartyKind};
use tallybook_purchasing::PurchaseOrder;
use tallybook_sales::SalesOrder;

use super::{Engine, InvoiceReceipt, InvoiceRequest, PaymentReceipt, PaymentRequest, PostingReceipt};
use crate::error::EngineError;
use crate::event_store::{EventStore, UnitOfWork};

impl<S> Engine<S>
where
    S: EventStore,
{
    /// Post a journal entry. Unbalanced lines are rejected before anything
    /// is written, with the signed imbalance in the error.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, lines = lines.len()))]
    pub fn post(
        &self,
        tenant_id: TenantId,
        lines: Vec<JournalEntryLine>,
        metadata: EntryMetadata,
        occurred_at: DateTime<Utc>,
    ) -> Result<PostingReceipt, EngineError> {
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let entry_id = self
            .stage_posting(tenant_id, &mut journal, lines, metadata, occurred_at, &mut unit)
            .inspect_err(|err| tracing::warn!(error = %err, "journal entry rejected"))?;

        self.commit("post", unit)?;
        Ok(PostingReceipt { entry_id })
    }

    /// Register a payment against an invoice.
    ///
    /// One unit: the payment on the invoice, its two-line journal entry, the
    /// mirrored bank transaction when the method routes through a bank, and
    /// the party balance decrease.
    #[tracing::instrument(
        skip_all,
        fields(tenant = %tenant_id, invoice = %request.invoice_id, method = request.method.as_str())
    )]
    pub fn process_payment(&self, tenant_id: TenantId, request: PaymentRequest) -> Result<PaymentReceipt, EngineError> {
        let via_bank = request.method.routes_through_bank();
        let bank_account_id = match (via_bank, request.bank_account) {
            (true, None) => {
                return Err(EngineError::InsufficientData(format!(
                    "{} payments need a bank account",
                    request.method.as_str()
                )));
            }
            (true, Some(id)) => Some(id),
            (false, _) => None,
        };

        let mut invoice = self.dispatcher.load::<Invoice>(tenant_id, request.invoice_id.0)?;
        if !invoice.state().exists() {
            return Err(EngineError::NotFound);
        }
        let party_id = invoice
            .state()
            .party_id()
            .ok_or_else(|| EngineError::InvariantViolation("invoice party must be set".to_string()))?;
        self.load_active_party(tenant_id, party_id)?;

        let mut bank = match bank_account_id {
            Some(id) => {
                let account = self.dispatcher.load::<BankAccount>(tenant_id, id.0)?;
                if !account.state().exists() {
                    return Err(EngineError::NotFound);
                }
                Some(account)
            }
            None => None,
        };
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let amount = round_currency(request.amount);
        let payment_id = PaymentId::generate();
        invoice.decide(
            &InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id: request.invoice_id,
                payment_id,
                amount,
                method: request.method,
                bank_account: bank_account_id,
                occurred_at: request.occurred_at,
            }),
            &mut unit,
        )?;

        let number = invoice.state().number().to_string();
        let (posting, direction) = match invoice.state().kind() {
            InvoiceKind::Sales => (DerivedPosting::PaymentReceived { via_bank }, BankDirection::Deposit),
            InvoiceKind::Purchase => (DerivedPosting::PaymentMade { via_bank }, BankDirection::Withdrawal),
        };
        let journal_entry_id = self.stage_posting(
            tenant_id,
            &mut journal,
            self.config.accounts.lines_for(posting, amount),
            EntryMetadata::described(format!("Payment {number}"), number.as_str())
                .with_source(payment_id.0),
            request.occurred_at,
            &mut unit,
        )?;

        let bank_transaction_id = match (bank.as_mut(), bank_account_id) {
            (Some(account), Some(bank_account_id)) => {
                let id = BankTransactionId::generate();
                account.decide(
                    &BankAccountCommand::RecordTransaction(RecordBankTransaction {
                        tenant_id,
                        transaction: BankTransaction {
                            id,
                            bank_account_id,
                            direction,
                            amount,
                            reference: number,
                            journal_entry_id,
                            occurred_at: request.occurred_at,
                        },
                    }),
                    &mut unit,
                )?;
                Some(id)
            }
            _ => None,
        };

        unit.adjust_balance(party_id.0, -amount);
        self.commit("process_payment", unit)?;

        Ok(PaymentReceipt {
            payment_id,
            journal_entry_id,
            bank_transaction_id,
        })
    }

    /// Issue an invoice to a customer (sales) or from a supplier (purchase).
    ///
    /// Standalone invoices are posted and raise the party balance; invoices
    /// billing an order leave both to the order.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, party = %request.party_id, number = %request.number))]
    pub fn issue_invoice(&self, tenant_id: TenantId, request: InvoiceRequest) -> Result<InvoiceReceipt, EngineError> {
        let party = self.load_active_party(tenant_id, request.party_id)?;
        let kind = match party.state().kind() {
            PartyKind::Customer => InvoiceKind::Sales,
            PartyKind::Supplier => InvoiceKind::Purchase,
        };
        if let Some(order_ref) = request.order_ref {
            self.ensure_order_of(tenant_id, order_ref, request.party_id, kind)?;
        }

        let invoice_id = InvoiceId::generate();
        let mut invoice = self.dispatcher.load::<Invoice>(tenant_id, invoice_id.0)?;
        let mut journal = self.load_journal(tenant_id)?;
        let mut unit = UnitOfWork::new(tenant_id);

        let lines = request
            .lines
            .into_iter()
            .zip(1u32..)
            .map(|(line, line_no)| InvoiceLine {
                line_no,
                product_id: line.product_id,
                description: line.description,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();
        let events = invoice.decide(
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                party_id: request.party_id,
                kind,
                number: request.number,
                lines,
                order_ref: request.order_ref,
                due_date: request.due_date,
                occurred_at: request.occurred_at,
            }),
            &mut unit,
        )?;

        let mut journal_entry_id = None;
        for event in &events {
            let InvoiceEvent::InvoiceIssued(e) = event else {
                continue;
            };
            if e.order_ref.is_some() {
                continue;
            }
            let posting = match e.kind {
                InvoiceKind::Sales => DerivedPosting::SalesInvoiceIssued,
                InvoiceKind::Purchase => DerivedPosting::PurchaseInvoiceIssued,
            };
            journal_entry_id = Some(self.stage_posting(
                tenant_id,
                &mut journal,
                self.config.accounts.lines_for(posting, e.total_amount),
                EntryMetadata::described(format!("Invoice {}", e.number), e.number.as_str())
                    .with_source(invoice_id.0),
                e.occurred_at,
                &mut unit,
            )?);
            unit.adjust_balance(e.party_id.0, e.total_amount);
        }

        self.commit("issue_invoice", unit)?;
        Ok(InvoiceReceipt {
            invoice_id,
            journal_entry_id,
        })
    }

    fn ensure_order_of(
        &self,
        tenant_id: TenantId,
        order_id: AggregateId,
        party_id: PartyId,
        kind: InvoiceKind,
    ) -> Result<(), EngineError> {
        let (exists, owner) = match kind {
            InvoiceKind::Sales => {
                let order = self.dispatcher.load::<SalesOrder>(tenant_id, order_id)?;
                (order.state().exists(), order.state().customer_id())
            }
            InvoiceKind::Purchase => {
                let order = self.dispatcher.load::<PurchaseOrder>(tenant_id, order_id)?;
                (order.state().exists(), order.state().supplier_id())
            }
        };
        if !exists {
            return Err(EngineError::NotFound);
        }
        if owner != Some(party_id) {
            return Err(EngineError::Validation(format!(
                "order {order_id} does not belong to party {party_id}"
            )));
        }
        Ok(())
    }
}
