//! Risk tiers and assessment results

use super::ledger::ClientId;
use serde::{Deserialize, Serialize};

/// Classifier label for "will default / unpaid".
pub const LABEL_UNPAID: i64 = 0;
/// Classifier label for "partial payment".
pub const LABEL_PARTIAL: i64 = 1;
/// Classifier label for "paid in full / low risk".
pub const LABEL_PAID: i64 = 2;

/// Human-facing risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    /// Map a classifier label to a tier.
    ///
    /// Labels outside {0, 1, 2} map to `Moderate`; callers are expected to
    /// log those as anomalies (see [`RiskTier::is_known_label`]).
    pub fn from_label(label: i64) -> Self {
        match label {
            LABEL_UNPAID => RiskTier::High,
            LABEL_PARTIAL => RiskTier::Moderate,
            LABEL_PAID => RiskTier::Low,
            _ => RiskTier::Moderate,
        }
    }

    pub fn is_known_label(label: i64) -> bool {
        (LABEL_UNPAID..=LABEL_PAID).contains(&label)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Moderate => "moderate",
            RiskTier::High => "high",
        }
    }
}

/// How an assessment was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    /// Client has no invoices; the classifier was not consulted.
    NoHistory,
    /// Label produced by the classifier.
    Model,
}

/// Result of `assess_client_risk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub client_id: ClientId,

    /// Raw classifier label (or 2 for clients without history)
    pub label: i64,

    pub tier: RiskTier,

    pub source: AssessmentSource,

    /// Probability of the predicted class, when the model exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Version string of the artifact that produced the label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl RiskAssessment {
    /// Assessment for a client without any invoice.
    pub fn no_history(client_id: ClientId) -> Self {
        Self {
            client_id,
            label: LABEL_PAID,
            tier: RiskTier::Low,
            source: AssessmentSource::NoHistory,
            confidence: None,
            model_version: None,
        }
    }

    pub fn from_model(client_id: ClientId, label: i64, model_version: &str) -> Self {
        Self {
            client_id,
            label,
            tier: RiskTier::from_label(label),
            source: AssessmentSource::Model,
            confidence: None,
            model_version: Some(model_version.to_string()),
        }
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_label() {
        assert_eq!(RiskTier::from_label(0), RiskTier::High);
        assert_eq!(RiskTier::from_label(1), RiskTier::Moderate);
        assert_eq!(RiskTier::from_label(2), RiskTier::Low);
        assert_eq!(RiskTier::from_label(3), RiskTier::Moderate);
        assert_eq!(RiskTier::from_label(-1), RiskTier::Moderate);
    }

    #[test]
    fn test_known_labels() {
        assert!(RiskTier::is_known_label(0));
        assert!(RiskTier::is_known_label(2));
        assert!(!RiskTier::is_known_label(3));
    }

    #[test]
    fn test_no_history_assessment_serialization() {
        let assessment = RiskAssessment::no_history(12);
        let json = serde_json::to_value(&assessment).unwrap();

        assert_eq!(json["label"], 2);
        assert_eq!(json["tier"], "low");
        assert_eq!(json["source"], "no_history");
        assert!(json.get("confidence").is_none());
    }
}
