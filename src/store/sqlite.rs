//! SQLite implementation of [`TransactionalStore`] over the ERP tables.
//!
//! RULE: only this module issues SQL. The feature builder and the service go
//! through the traits.

use super::{LedgerReader, TransactionalStore};
use crate::error::RiskResult;
use crate::types::{
    ClientCategory, ClientId, Invoice, InvoiceId, InvoiceStatus, Order, OrderId, Payment,
    PaymentId, PaymentReminder, ReminderId,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use tracing::{debug, info, warn};

/// Connections are checked out round-robin; a busy connection is skipped.
pub struct SqliteStore {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl SqliteStore {
    fn from_connections(connections: Vec<Connection>) -> Self {
        Self {
            connections: connections.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Open an existing ERP database without write access, with
    /// `connections` readers. Used by the risk service.
    pub fn open_read_only<P: AsRef<Path>>(path: P, connections: usize) -> RiskResult<Self> {
        let path = path.as_ref();
        let connections = (0..connections.max(1))
            .map(|_| Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            path = %path.display(),
            connections = connections.len(),
            "Opened ERP database (read-only)"
        );
        Ok(Self::from_connections(connections))
    }

    /// Open (or create) a database for seeding.
    pub fn open<P: AsRef<Path>>(path: P) -> RiskResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connections(vec![conn]))
    }

    /// Open an in-memory database (used in tests). An in-memory database
    /// lives in its connection, so there is exactly one.
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connections(vec![conn]))
    }

    /// Create the ERP tables the pipeline reads, if absent.
    pub fn migrate(&self) -> RiskResult<()> {
        self.lock()
            .execute_batch(include_str!("../../migrations/001_erp_schema.sql"))?;
        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // A panic while holding the guard cannot leave the connection in a
    // half-written state, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        let len = self.connections.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            match self.connections[(start + offset) % len].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => continue,
            }
        }
        self.connections[start]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Seeding ────────────────────────────────────────────────

    pub fn insert_client(&self, name: &str, category: ClientCategory) -> RiskResult<ClientId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO erp_app_person (type, nom) VALUES (?1, ?2)",
            params![category.as_db_str(), name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_order(&self, client_id: ClientId, order_date: NaiveDate) -> RiskResult<OrderId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO erp_app_commande (client_id, date_commande, statut)
             VALUES (?1, ?2, 'livrée')",
            params![client_id, order_date],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_invoice(
        &self,
        order_id: OrderId,
        total_amount: f64,
        invoice_date: NaiveDate,
    ) -> RiskResult<InvoiceId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO erp_app_facture (commande_id, montant_total, montant_paye, date_facture, statut)
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![order_id, total_amount, invoice_date, InvoiceStatus::Unpaid.as_db_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record a payment and refresh the invoice's paid amount and status.
    pub fn insert_payment(
        &self,
        invoice_id: InvoiceId,
        amount: f64,
        payment_date: NaiveDate,
        is_full_payment: bool,
        remaining_due_date: Option<NaiveDate>,
    ) -> RiskResult<PaymentId> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO erp_app_paiement
                (facture_id, montant, date_paiement, methode, paiement_complet, date_echeance_solde)
             VALUES (?1, ?2, ?3, 'virement', ?4, ?5)",
            params![invoice_id, amount, payment_date, is_full_payment, remaining_due_date],
        )?;
        let payment_id = tx.last_insert_rowid();

        let (total_amount, total_paid): (f64, f64) = tx.query_row(
            "SELECT f.montant_total,
                    COALESCE((SELECT SUM(p.montant) FROM erp_app_paiement p WHERE p.facture_id = f.id), 0)
             FROM erp_app_facture f WHERE f.id = ?1",
            params![invoice_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let status = InvoiceStatus::from_amounts(total_amount, total_paid);
        tx.execute(
            "UPDATE erp_app_facture
             SET montant_paye = ?2,
                 statut = ?3,
                 date_echeance_restant = CASE WHEN ?3 = 'payée' THEN NULL
                                              ELSE COALESCE(date_echeance_restant, ?4) END
             WHERE id = ?1",
            params![invoice_id, total_paid, status.as_db_str(), remaining_due_date],
        )?;
        tx.commit()?;

        debug!(invoice_id, payment_id, status = ?status, "Payment recorded");
        Ok(payment_id)
    }

    /// Append a reminder at the next sequence number for the invoice.
    pub fn insert_reminder(&self, invoice_id: InvoiceId, sent_date: NaiveDate) -> RiskResult<ReminderId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO erp_app_relancepaiement (facture_id, date_relance, statut, numero)
             VALUES (?1, ?2, 'envoyée',
                     (SELECT COUNT(*) + 1 FROM erp_app_relancepaiement WHERE facture_id = ?1))",
            params![invoice_id, sent_date],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_client_ids(&self, category: ClientCategory) -> RiskResult<Vec<ClientId>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM erp_app_person WHERE type = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![category.as_db_str()], |row| row.get(0))?
            .collect::<Result<Vec<ClientId>, _>>()?;
        Ok(ids)
    }
}

fn parse_invoice_status(idx: usize, raw: String) -> rusqlite::Result<InvoiceStatus> {
    InvoiceStatus::from_db_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown invoice status '{raw}'").into(),
        )
    })
}

// The queries themselves, shared by single reads and snapshots.
impl LedgerReader for Connection {
    fn client_exists_and_is_category(
        &self,
        client_id: ClientId,
        category: ClientCategory,
    ) -> RiskResult<bool> {
        let stored: Option<String> = self
            .query_row(
                "SELECT type FROM erp_app_person WHERE id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.as_deref().and_then(ClientCategory::from_db_str) == Some(category))
    }

    fn list_invoices_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Invoice>> {
        let mut stmt = self.prepare(
            "SELECT f.id, f.commande_id, f.montant_total, f.montant_paye, f.statut,
                    f.date_facture, f.date_echeance_restant
             FROM erp_app_facture f
             JOIN erp_app_commande c ON c.id = f.commande_id
             WHERE c.client_id = ?1
             ORDER BY f.id ASC",
        )?;
        let invoices = stmt
            .query_map(params![client_id], |row| {
                Ok(Invoice {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    total_amount: row.get(2)?,
                    amount_paid: row.get(3)?,
                    status: parse_invoice_status(4, row.get(4)?)?,
                    invoice_date: row.get(5)?,
                    remaining_due_date: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(invoices)
    }

    fn list_orders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Order>> {
        let mut stmt = self.prepare(
            "SELECT id, client_id, date_commande, statut
             FROM erp_app_commande WHERE client_id = ?1
             ORDER BY id ASC",
        )?;
        let orders = stmt
            .query_map(params![client_id], |row| {
                Ok(Order {
                    id: row.get(0)?,
                    client_id: row.get(1)?,
                    order_date: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    fn list_reminders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<PaymentReminder>> {
        let mut stmt = self.prepare(
            "SELECT r.id, r.facture_id, r.numero, r.date_relance, r.statut
             FROM erp_app_relancepaiement r
             JOIN erp_app_facture f ON f.id = r.facture_id
             JOIN erp_app_commande c ON c.id = f.commande_id
             WHERE c.client_id = ?1
             ORDER BY r.id ASC",
        )?;
        let reminders = stmt
            .query_map(params![client_id], |row| {
                Ok(PaymentReminder {
                    id: row.get(0)?,
                    invoice_id: row.get(1)?,
                    sequence: row.get(2)?,
                    sent_date: row.get(3)?,
                    status: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    fn first_payment_for_invoice(&self, invoice_id: InvoiceId) -> RiskResult<Option<Payment>> {
        let payment = self
            .query_row(
                "SELECT id, facture_id, montant, date_paiement, paiement_complet, date_echeance_solde
                 FROM erp_app_paiement WHERE facture_id = ?1
                 ORDER BY date_paiement ASC, id ASC
                 LIMIT 1",
                params![invoice_id],
                |row| {
                    Ok(Payment {
                        id: row.get(0)?,
                        invoice_id: row.get(1)?,
                        amount: row.get(2)?,
                        payment_date: row.get(3)?,
                        is_full_payment: row.get(4)?,
                        remaining_due_date: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(payment)
    }
}

impl LedgerReader for SqliteStore {
    fn client_exists_and_is_category(
        &self,
        client_id: ClientId,
        category: ClientCategory,
    ) -> RiskResult<bool> {
        self.lock().client_exists_and_is_category(client_id, category)
    }

    fn list_invoices_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Invoice>> {
        self.lock().list_invoices_for_client(client_id)
    }

    fn list_orders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Order>> {
        self.lock().list_orders_for_client(client_id)
    }

    fn list_reminders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<PaymentReminder>> {
        self.lock().list_reminders_for_client(client_id)
    }

    fn first_payment_for_invoice(&self, invoice_id: InvoiceId) -> RiskResult<Option<Payment>> {
        self.lock().first_payment_for_invoice(invoice_id)
    }
}

impl TransactionalStore for SqliteStore {
    fn snapshot(&self) -> RiskResult<Box<dyn LedgerReader + '_>> {
        Ok(Box::new(ReadSnapshot::begin(self.lock())?))
    }
}

/// A checked-out connection inside an open read transaction. The
/// transaction's view is fixed by its first query.
struct ReadSnapshot<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> ReadSnapshot<'a> {
    fn begin(conn: MutexGuard<'a, Connection>) -> RiskResult<Self> {
        conn.execute_batch("BEGIN DEFERRED")?;
        Ok(Self { conn })
    }
}

impl Drop for ReadSnapshot<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Failed to end read transaction");
        }
    }
}

impl LedgerReader for ReadSnapshot<'_> {
    fn client_exists_and_is_category(
        &self,
        client_id: ClientId,
        category: ClientCategory,
    ) -> RiskResult<bool> {
        self.conn.client_exists_and_is_category(client_id, category)
    }

    fn list_invoices_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Invoice>> {
        self.conn.list_invoices_for_client(client_id)
    }

    fn list_orders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<Order>> {
        self.conn.list_orders_for_client(client_id)
    }

    fn list_reminders_for_client(&self, client_id: ClientId) -> RiskResult<Vec<PaymentReminder>> {
        self.conn.list_reminders_for_client(client_id)
    }

    fn first_payment_for_invoice(&self, invoice_id: InvoiceId) -> RiskResult<Option<Payment>> {
        self.conn.first_payment_for_invoice(invoice_id)
    }
}
