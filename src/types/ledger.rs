//! Transactional facts read from the ERP store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ClientId = i64;
pub type OrderId = i64;
pub type InvoiceId = i64;
pub type PaymentId = i64;
pub type ReminderId = i64;

/// Party category. Only `Client` participates in risk scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientCategory {
    Client,
    Supplier,
}

impl ClientCategory {
    /// Value stored in the ERP `person.type` column.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ClientCategory::Client => "client",
            ClientCategory::Supplier => "fournisseur",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "client" => Some(ClientCategory::Client),
            "fournisseur" => Some(ClientCategory::Supplier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientId,
    pub order_date: NaiveDate,
    pub status: String,
}

/// Settlement state of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
}

impl InvoiceStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "impayée",
            InvoiceStatus::Partial => "partielle",
            InvoiceStatus::Paid => "payée",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "impayée" => Some(InvoiceStatus::Unpaid),
            "partielle" => Some(InvoiceStatus::Partial),
            "payée" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }

    /// Status implied by the paid amount against the invoice total.
    pub fn from_amounts(total_amount: f64, amount_paid: f64) -> Self {
        if total_amount - amount_paid <= 0.0 {
            InvoiceStatus::Paid
        } else if amount_paid > 0.0 {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Unpaid
        }
    }
}

/// Client-side invoice. Every invoice handed to the pipeline originates
/// from exactly one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub order_id: OrderId,
    pub total_amount: f64,
    pub amount_paid: f64,
    pub status: InvoiceStatus,
    pub invoice_date: NaiveDate,
    pub remaining_due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub is_full_payment: bool,
    pub remaining_due_date: Option<NaiveDate>,
}

/// Dunning notice sent for an overdue invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReminder {
    pub id: ReminderId,
    pub invoice_id: InvoiceId,
    /// 1-based position in the invoice's reminder sequence
    pub sequence: u32,
    pub sent_date: NaiveDate,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_db_round_trip() {
        for category in [ClientCategory::Client, ClientCategory::Supplier] {
            assert_eq!(ClientCategory::from_db_str(category.as_db_str()), Some(category));
        }
        assert_eq!(ClientCategory::from_db_str("inconnu"), None);
    }

    #[test]
    fn test_status_from_amounts() {
        assert_eq!(InvoiceStatus::from_amounts(200.0, 0.0), InvoiceStatus::Unpaid);
        assert_eq!(InvoiceStatus::from_amounts(200.0, 100.0), InvoiceStatus::Partial);
        assert_eq!(InvoiceStatus::from_amounts(200.0, 200.0), InvoiceStatus::Paid);
        assert_eq!(InvoiceStatus::from_amounts(200.0, 250.0), InvoiceStatus::Paid);
    }

    #[test]
    fn test_status_uses_erp_spelling() {
        assert_eq!(InvoiceStatus::Paid.as_db_str(), "payée");
        assert_eq!(InvoiceStatus::from_db_str("partielle"), Some(InvoiceStatus::Partial));
    }
}
