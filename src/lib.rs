//! Invoice Risk Pipeline Library
//!
//! Scores a client's likelihood of paying its invoices from the ERP's
//! invoice, payment and reminder history, using a trained classifier
//! exported to ONNX and run through ONNX Runtime.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod service;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{RiskError, RiskResult};
pub use feature_extractor::{ClientRiskFeatures, FeatureBuilder, FeatureRecord, FeatureSchema};
pub use models::{Classifier, ModelHandle, ModelLoader};
pub use service::RiskService;
pub use store::{LedgerReader, SqliteStore, TransactionalStore};
pub use types::{RiskAssessment, RiskTier};
