//! Read-only access to the ERP's transactional facts.
//!
//! The risk pipeline never writes through these traits. Each
//! [`LedgerReader`] call is an independent read; a [`TransactionalStore`]
//! also hands out snapshots whose reads all observe the same database state.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::RiskResult;
use crate::types::{
    ClientCategory, ClientId, Invoice, InvoiceId, Order, Payment, PaymentReminder,
};

pub trait LedgerReader {
    /// True when `client_id` exists and carries `category`.
    fn client_exists_and_is_category(
        &self,
        client_id: ClientId,
        category: ClientCategory,
    ) -> RiskResult<bool>;

    /// Invoices linked to the client through its orders.
    fn list_invoices_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Invoice>>;

    fn list_orders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Order>>;

    /// Reminders whose invoice belongs to the client.
    fn list_reminders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<PaymentReminder>>;

    /// Earliest payment by date (lowest id on ties), if any.
    fn first_payment_for_invoice(&self, invoice_id: InvoiceId) -> RiskResult<Option<Payment>>;
}

pub trait TransactionalStore: LedgerReader + Send + Sync {
    /// Reader bound to one read transaction, released on drop. Concurrent
    /// ERP writes are not visible through it.
    fn snapshot(&self) -> RiskResult<Box<dyn LedgerReader + '_>>;
}
