//! Request/reply messages exchanged with the risk responder

use super::ledger::ClientId;
use super::risk::RiskAssessment;
use crate::error::RiskError;
use serde::{Deserialize, Serialize};

/// Body of a `risk.assess` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub client_id: ClientId,

    /// Caller correlation id, echoed back in the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AssessmentRequest {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Reply body, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskReply {
    Ok {
        assessment: RiskAssessment,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Error {
        kind: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Reloaded {
        model_version: String,
    },
}

impl RiskReply {
    pub fn ok(assessment: RiskAssessment, request_id: Option<String>) -> Self {
        RiskReply::Ok {
            assessment,
            request_id,
        }
    }

    pub fn from_error(err: &RiskError, request_id: Option<String>) -> Self {
        RiskReply::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            request_id,
        }
    }

    /// Payload that could not be decoded as a request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        RiskReply::Error {
            kind: "invalid_request".to_string(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Failure inside the responder itself, not attributable to the request.
    pub fn internal(message: impl Into<String>, request_id: Option<String>) -> Self {
        RiskReply::Error {
            kind: "internal".to_string(),
            message: message.into(),
            request_id,
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, RiskReply::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_id() {
        let request: AssessmentRequest = serde_json::from_str(r#"{"client_id": 12}"#).unwrap();
        assert_eq!(request, AssessmentRequest::new(12));
    }

    #[test]
    fn test_ok_reply_shape() {
        let reply = RiskReply::ok(RiskAssessment::no_history(5), None);
        let value = serde_json::to_value(&reply).unwrap();

        assert_eq!(
            value,
            json!({
                "status": "ok",
                "assessment": {
                    "client_id": 5,
                    "label": 2,
                    "tier": "low",
                    "source": "no_history"
                }
            })
        );
    }

    #[test]
    fn test_error_reply_carries_kind() {
        let reply = RiskReply::from_error(&RiskError::NotFound { client_id: 3 }, Some("r-1".into()));
        let value = serde_json::to_value(&reply).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "not_found");
        assert_eq!(value["request_id"], "r-1");
        assert!(!reply.is_ok());
    }
}
