//! Client payment-risk assessment.
//!
//! Resolves the client, builds its features from the store, consults the
//! installed classifier and maps the label to a tier. Read-only on the store.

use crate::error::{RiskError, RiskResult};
use crate::feature_extractor::FeatureBuilder;
use crate::metrics::RiskMetrics;
use crate::models::ModelHandle;
use crate::store::TransactionalStore;
use crate::types::{ClientId, RiskAssessment, RiskTier};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RiskService {
    store: Arc<dyn TransactionalStore>,
    builder: Arc<FeatureBuilder>,
    model: Arc<ModelHandle>,
    metrics: Option<Arc<RiskMetrics>>,
}

impl RiskService {
    pub fn new(store: Arc<dyn TransactionalStore>, model: Arc<ModelHandle>) -> Self {
        Self {
            store,
            builder: Arc::new(FeatureBuilder::new()),
            model,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RiskMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Assess one client.
    ///
    /// Errors: `NotFound` for unknown or non-client ids, `Unavailable` when no
    /// usable model is installed, `Schema` when the record and the model
    /// disagree on layout.
    pub fn assess_client_risk(&self, client_id: ClientId) -> RiskResult<RiskAssessment> {
        let start = Instant::now();
        let result = self.assess_inner(client_id);

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(assessment) => metrics.record_assessment(assessment.tier, start.elapsed()),
                Err(RiskError::NotFound { .. }) => metrics.record_not_found(),
                Err(RiskError::Unavailable { .. }) => metrics.record_unavailable(),
                Err(_) => {}
            }
        }
        result
    }

    fn assess_inner(&self, client_id: ClientId) -> RiskResult<RiskAssessment> {
        let features = match self.builder.build(self.store.as_ref(), client_id)? {
            Some(features) => features,
            None => {
                debug!(client_id, "No invoice history, skipping model");
                if let Some(metrics) = &self.metrics {
                    metrics.record_no_history();
                }
                return Ok(RiskAssessment::no_history(client_id));
            }
        };

        let record = features.to_record();
        let classifier = self.model.current().map_err(unavailable)?;
        let prediction = classifier.classify(&record).map_err(unavailable)?;

        if !RiskTier::is_known_label(prediction.label) {
            warn!(
                client_id,
                label = prediction.label,
                model_version = classifier.version(),
                "Classifier returned an unknown label, reporting moderate risk"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_anomaly();
            }
        }

        let assessment = RiskAssessment::from_model(client_id, prediction.label, classifier.version())
            .with_confidence(prediction.confidence());

        debug!(
            client_id,
            label = assessment.label,
            tier = assessment.tier.as_str(),
            confidence = ?assessment.confidence,
            "Client assessed"
        );
        Ok(assessment)
    }

    /// Assess each id independently, preserving input order.
    pub fn assess_many(&self, client_ids: &[ClientId]) -> Vec<(ClientId, RiskResult<RiskAssessment>)> {
        client_ids
            .iter()
            .map(|&id| (id, self.assess_client_risk(id)))
            .collect()
    }
}

fn unavailable(err: RiskError) -> RiskError {
    match err {
        RiskError::ModelUnavailable { reason } => RiskError::Unavailable { reason },
        other => other,
    }
}
