//! Type definitions for the risk pipeline

pub mod ledger;
pub mod risk;
pub mod wire;

pub use ledger::{
    ClientCategory, ClientId, Invoice, InvoiceId, InvoiceStatus, Order, OrderId, Payment,
    PaymentId, PaymentReminder, ReminderId,
};
pub use risk::{AssessmentSource, RiskAssessment, RiskTier};
pub use wire::{AssessmentRequest, RiskReply};
