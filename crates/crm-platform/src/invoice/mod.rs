//! Invoice Aggregate
//!
//! Invoices billing one or more devis, with unique numbering, a
//! document-level discount and e-mail delivery.

pub mod entity;
pub mod repository;
pub mod operations;
pub mod api;

pub use entity::{format_invoice_number, Invoice};
pub use repository::{InvoiceRepository, InvoiceStore};
pub use operations::{
    ChangeInvoiceStatusUseCase, CreateInvoiceUseCase, InvoiceCommand, SendInvoiceUseCase,
    UpdateInvoiceUseCase,
};
pub use api::{invoices_router, InvoicesState};
