//! Feature extraction for invoice payment-risk inference.
//!
//! This module aggregates a client's invoice, payment and reminder history
//! into the seven-column record the risk classifier was trained on.
//! Column order is part of the model contract.

use crate::error::{RiskError, RiskResult};
use crate::store::{LedgerReader, TransactionalStore};
use crate::types::{ClientCategory, ClientId, Invoice, InvoiceId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Numeric columns, in training order.
pub const NUMERIC_FEATURES: [&str; 6] = [
    "total_amount",
    "reminder_count",
    "payment_delay",
    "client_order_count",
    "client_total_purchases",
    "client_average_delay",
];

/// Categorical columns, after the numeric block.
pub const CATEGORICAL_FEATURES: [&str; 1] = ["client_type"];

pub const FEATURE_COUNT: usize = NUMERIC_FEATURES.len() + CATEGORICAL_FEATURES.len();

/// The only category present at inference time.
pub const CLIENT_TYPE: &str = "client";

/// A single value in a feature record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

/// Ordered (name, value) pairs handed to the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    fields: Vec<(String, FeatureValue)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_numeric(&mut self, name: &str, value: f64) {
        self.fields.push((name.to_string(), FeatureValue::Numeric(value)));
    }

    pub fn push_categorical(&mut self, name: &str, value: &str) {
        self.fields
            .push((name.to_string(), FeatureValue::Categorical(value.to_string())));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Column layout a model expects: numeric block followed by categorical block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl FeatureSchema {
    /// The seven-column schema produced by [`FeatureBuilder`].
    pub fn canonical() -> Self {
        Self {
            numeric: NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect(),
            categorical: CATEGORICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail unless `self` is exactly the canonical schema.
    pub fn ensure_canonical(&self) -> RiskResult<()> {
        let canonical = Self::canonical();
        if *self != canonical {
            return Err(RiskError::Schema(format!(
                "artifact expects numeric {:?} + categorical {:?}, pipeline produces numeric {:?} + categorical {:?}",
                self.numeric, self.categorical, canonical.numeric, canonical.categorical
            )));
        }
        Ok(())
    }

    /// Check count, order, names and value types of a record.
    pub fn validate(&self, record: &FeatureRecord) -> RiskResult<()> {
        if record.len() != self.len() {
            return Err(RiskError::Schema(format!(
                "expected {} fields, got {}: {:?}",
                self.len(),
                record.len(),
                record.names()
            )));
        }

        let expected = self
            .numeric
            .iter()
            .map(|name| (name, true))
            .chain(self.categorical.iter().map(|name| (name, false)));

        for (position, ((name, value), (expected_name, numeric))) in
            record.iter().zip(expected).enumerate()
        {
            if name != expected_name.as_str() {
                return Err(RiskError::Schema(format!(
                    "field {position} is '{name}', expected '{expected_name}'"
                )));
            }
            match (value, numeric) {
                (FeatureValue::Numeric(v), true) if v.is_finite() => {}
                (FeatureValue::Numeric(v), true) => {
                    return Err(RiskError::Schema(format!(
                        "field '{name}' is not a finite number: {v}"
                    )));
                }
                (FeatureValue::Categorical(_), false) => {}
                (_, true) => {
                    return Err(RiskError::Schema(format!("field '{name}' must be numeric")));
                }
                (_, false) => {
                    return Err(RiskError::Schema(format!(
                        "field '{name}' must be categorical"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Raw facts gathered for one client.
#[derive(Debug, Clone, Default)]
pub struct ClientHistory {
    pub client_id: ClientId,
    pub invoices: Vec<Invoice>,
    /// Date of the earliest payment per invoice; invoices without payments
    /// are absent.
    pub first_payment_dates: HashMap<InvoiceId, NaiveDate>,
    pub order_count: u64,
    pub reminder_count: u64,
}

impl ClientHistory {
    pub fn has_invoices(&self) -> bool {
        !self.invoices.is_empty()
    }
}

/// Per-client risk features. Recomputed on every query, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRiskFeatures {
    pub total_amount: f64,
    pub reminder_count: u64,
    pub payment_delay: f64,
    pub client_order_count: u64,
    /// Always equal to `total_amount`; kept because the model has the column.
    pub client_total_purchases: f64,
    /// Always equal to `payment_delay`; same reason.
    pub client_average_delay: f64,
    pub client_type: String,
}

impl ClientRiskFeatures {
    /// Build the ordered record: six numeric columns, then `client_type`.
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.push_numeric(NUMERIC_FEATURES[0], self.total_amount);
        record.push_numeric(NUMERIC_FEATURES[1], self.reminder_count as f64);
        record.push_numeric(NUMERIC_FEATURES[2], self.payment_delay);
        record.push_numeric(NUMERIC_FEATURES[3], self.client_order_count as f64);
        record.push_numeric(NUMERIC_FEATURES[4], self.client_total_purchases);
        record.push_numeric(NUMERIC_FEATURES[5], self.client_average_delay);
        record.push_categorical(CATEGORICAL_FEATURES[0], &self.client_type);
        record
    }
}

/// Feature builder that turns client history into model input features.
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Gather the raw facts for `client_id` from one store snapshot.
    ///
    /// Fails with `NotFound` unless the id resolves to a party of category
    /// `client`.
    pub fn collect<S: TransactionalStore + ?Sized>(
        &self,
        store: &S,
        client_id: ClientId,
    ) -> RiskResult<ClientHistory> {
        let reader = store.snapshot()?;
        if !reader.client_exists_and_is_category(client_id, ClientCategory::Client)? {
            return Err(RiskError::NotFound { client_id });
        }

        let invoices = reader.list_invoices_for_client(client_id)?;
        let order_count = reader.list_orders_for_client(client_id)?.len() as u64;
        let reminder_count = reader.list_reminders_for_client(client_id)?.len() as u64;

        let mut first_payment_dates = HashMap::with_capacity(invoices.len());
        for invoice in &invoices {
            if let Some(payment) = reader.first_payment_for_invoice(invoice.id)? {
                first_payment_dates.insert(invoice.id, payment.payment_date);
            }
        }

        debug!(
            client_id,
            invoices = invoices.len(),
            paid_invoices = first_payment_dates.len(),
            order_count,
            reminder_count,
            "Collected client history"
        );

        Ok(ClientHistory {
            client_id,
            invoices,
            first_payment_dates,
            order_count,
            reminder_count,
        })
    }

    /// Aggregate history into features. Empty collections yield zeros.
    pub fn extract(&self, history: &ClientHistory) -> ClientRiskFeatures {
        let total_amount: f64 = history.invoices.iter().map(|inv| inv.total_amount).sum();

        // payment_delay: mean days from invoice to first payment, negative
        // deltas clamped before averaging
        let delays: Vec<f64> = history
            .invoices
            .iter()
            .filter_map(|inv| {
                history
                    .first_payment_dates
                    .get(&inv.id)
                    .map(|paid_on| (*paid_on - inv.invoice_date).num_days().max(0) as f64)
            })
            .collect();
        let payment_delay = if delays.is_empty() {
            0.0
        } else {
            delays.iter().sum::<f64>() / delays.len() as f64
        };

        ClientRiskFeatures {
            total_amount,
            reminder_count: history.reminder_count,
            payment_delay,
            client_order_count: history.order_count,
            client_total_purchases: total_amount,
            client_average_delay: payment_delay,
            client_type: CLIENT_TYPE.to_string(),
        }
    }

    /// Collect and extract. Returns `None` when the client has no invoices.
    pub fn build<S: TransactionalStore + ?Sized>(
        &self,
        store: &S,
        client_id: ClientId,
    ) -> RiskResult<Option<ClientRiskFeatures>> {
        let history = self.collect(store, client_id)?;
        if !history.has_invoices() {
            return Ok(None);
        }
        Ok(Some(self.extract(&history)))
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names (training order).
    pub fn feature_names(&self) -> Vec<&'static str> {
        NUMERIC_FEATURES
            .iter()
            .chain(CATEGORICAL_FEATURES.iter())
            .copied()
            .collect()
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvoiceStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(id: InvoiceId, total: f64, on: NaiveDate) -> Invoice {
        Invoice {
            id,
            order_id: id,
            total_amount: total,
            amount_paid: 0.0,
            status: InvoiceStatus::Unpaid,
            invoice_date: on,
            remaining_due_date: None,
        }
    }

    #[test]
    fn test_feature_count() {
        let builder = FeatureBuilder::new();
        assert_eq!(builder.feature_count(), 7);
        assert_eq!(builder.feature_names().len(), 7);
        assert_eq!(builder.feature_names()[6], "client_type");
    }

    #[test]
    fn test_extract_empty_history_is_all_zero() {
        let features = FeatureBuilder::new().extract(&ClientHistory::default());

        assert_eq!(features.total_amount, 0.0);
        assert_eq!(features.payment_delay, 0.0);
        assert_eq!(features.reminder_count, 0);
        assert_eq!(features.client_type, CLIENT_TYPE);
    }

    #[test]
    fn test_payment_delay_clamps_before_averaging() {
        let mut history = ClientHistory {
            client_id: 1,
            invoices: vec![invoice(1, 100.0, date(2024, 1, 10)), invoice(2, 50.0, date(2024, 1, 10))],
            ..Default::default()
        };
        // Paid 5 days early and 10 days late: clamp gives (0 + 10) / 2, not (-5 + 10) / 2
        history.first_payment_dates.insert(1, date(2024, 1, 5));
        history.first_payment_dates.insert(2, date(2024, 1, 20));

        let features = FeatureBuilder::new().extract(&history);
        assert_eq!(features.payment_delay, 5.0);
        assert_eq!(features.client_average_delay, features.payment_delay);
        assert_eq!(features.total_amount, 150.0);
        assert_eq!(features.client_total_purchases, features.total_amount);
    }

    #[test]
    fn test_unpaid_invoices_excluded_from_delay() {
        let mut history = ClientHistory {
            client_id: 1,
            invoices: vec![invoice(1, 100.0, date(2024, 1, 1)), invoice(2, 100.0, date(2024, 1, 1))],
            ..Default::default()
        };
        history.first_payment_dates.insert(1, date(2024, 1, 31));

        assert_eq!(FeatureBuilder::new().extract(&history).payment_delay, 30.0);
    }

    #[test]
    fn test_record_order_and_shape() {
        let features = ClientRiskFeatures {
            total_amount: 400.0,
            reminder_count: 1,
            payment_delay: 12.5,
            client_order_count: 2,
            client_total_purchases: 400.0,
            client_average_delay: 12.5,
            client_type: CLIENT_TYPE.to_string(),
        };
        let record = features.to_record();

        assert_eq!(record.len(), FEATURE_COUNT);
        assert_eq!(record.names(), FeatureBuilder::new().feature_names());
        assert!(FeatureSchema::canonical().validate(&record).is_ok());
    }

    #[test]
    fn test_validate_rejects_legacy_six_field_record() {
        let mut record = FeatureRecord::new();
        for name in NUMERIC_FEATURES {
            record.push_numeric(name, 0.0);
        }

        let err = FeatureSchema::canonical().validate(&record).unwrap_err();
        assert!(matches!(err, RiskError::Schema(_)));
    }

    #[test]
    fn test_validate_rejects_reordered_and_mistyped_fields() {
        let schema = FeatureSchema::canonical();

        let mut swapped = FeatureRecord::new();
        swapped.push_numeric("reminder_count", 0.0);
        swapped.push_numeric("total_amount", 0.0);
        for name in &NUMERIC_FEATURES[2..] {
            swapped.push_numeric(name, 0.0);
        }
        swapped.push_categorical("client_type", CLIENT_TYPE);
        assert!(matches!(schema.validate(&swapped), Err(RiskError::Schema(_))));

        let mut mistyped = FeatureRecord::new();
        for name in NUMERIC_FEATURES {
            mistyped.push_numeric(name, 0.0);
        }
        mistyped.push_numeric("client_type", 1.0);
        assert!(matches!(schema.validate(&mistyped), Err(RiskError::Schema(_))));

        let mut nan = FeatureRecord::new();
        nan.push_numeric("total_amount", f64::NAN);
        for name in &NUMERIC_FEATURES[1..] {
            nan.push_numeric(name, 0.0);
        }
        nan.push_categorical("client_type", CLIENT_TYPE);
        assert!(matches!(schema.validate(&nan), Err(RiskError::Schema(_))));
    }

    #[test]
    fn test_ensure_canonical_rejects_other_layouts() {
        assert!(FeatureSchema::canonical().ensure_canonical().is_ok());

        let mut legacy = FeatureSchema::canonical();
        legacy.categorical.clear();
        assert!(matches!(legacy.ensure_canonical(), Err(RiskError::Schema(_))));
    }
}
