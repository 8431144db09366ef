//! Invoicing domain module (event-sourced).
//!
//! Sales invoices (receivables) and purchase invoices (payables), and the
//! payments registered against them.

pub mod invoice;

pub use invoice::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceKind, InvoiceLine,
    InvoiceStatus, IssueInvoice, PaymentId, PaymentMethod, PaymentRegistered, RegisterPayment,
};
