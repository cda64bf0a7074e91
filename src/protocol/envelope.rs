//! API response envelope.
//!
//! Every EC2 operation answers with the same envelope shape: a
//! `ResponseMetadata` block carrying the request id and HTTP status, plus an
//! operation-specific body. Failed calls use the very same shape with an
//! `Error` block in the body, which is why the proxy can cache failures
//! exactly like successes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP status code the API uses for a successful call.
pub const STATUS_OK: u16 = 200;

/// Envelope metadata present on every response, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Provider-assigned id correlating the call with its audit record.
    #[serde(rename = "RequestId")]
    pub request_id: String,

    /// HTTP status of the call; 200 means success.
    #[serde(rename = "HTTPStatusCode")]
    pub http_status_code: u16,
}

/// One full API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,

    /// Operation-specific fields (`Instances`, `Reservations`, `Images`,
    /// `TerminatingInstances`, `Error`, ...), kept in wire form.
    #[serde(flatten)]
    pub body: Value,
}

impl ApiResponse {
    /// Build a response envelope around an operation body.
    pub fn new(request_id: impl Into<String>, http_status_code: u16, body: Value) -> Self {
        Self {
            metadata: ResponseMetadata {
                request_id: request_id.into(),
                http_status_code,
            },
            body,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.metadata.request_id
    }

    pub fn status_code(&self) -> u16 {
        self.metadata.http_status_code
    }

    pub fn is_success(&self) -> bool {
        self.metadata.http_status_code == STATUS_OK
    }

    /// The full envelope as a JSON value, suitable for caching.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("envelope serialization cannot fail")
    }

    /// `Error.Code` of a failure envelope, if present.
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("Error")?.get("Code")?.as_str()
    }

    /// Instance records of a `RunInstances` response body.
    pub fn instances(&self) -> Vec<Value> {
        as_array(self.body.get("Instances"))
    }

    /// Instance records of a `DescribeInstances` response body, flattened
    /// across reservations.
    pub fn reservation_instances(&self) -> Vec<Value> {
        as_array(self.body.get("Reservations"))
            .iter()
            .flat_map(|reservation| as_array(reservation.get("Instances")))
            .collect()
    }

    /// Image records of a `DescribeImages` response body.
    pub fn images(&self) -> Vec<Value> {
        as_array(self.body.get("Images"))
    }

    /// Instance ids of a `TerminateInstances` response body.
    pub fn terminating_instance_ids(&self) -> Vec<String> {
        as_array(self.body.get("TerminatingInstances"))
            .iter()
            .filter_map(|record| record.get("InstanceId")?.as_str().map(str::to_string))
            .collect()
    }
}

fn as_array(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .map(|records| records.to_vec())
        .unwrap_or_default()
}

/// A transport or service failure that still carries a full response
/// envelope, mirroring the API's own error convention.
#[derive(Debug, Clone, thiserror::Error)]
#[error("remote call failed with status {status}: {code}")]
pub struct ApiError {
    /// HTTP status of the failure.
    pub status: u16,
    /// `Error.Code` of the failure envelope, or `"Unknown"`.
    pub code: String,
    /// The failure envelope itself.
    pub response: ApiResponse,
}

impl ApiError {
    /// Wrap a failure envelope, lifting its status and error code.
    pub fn from_response(response: ApiResponse) -> Self {
        Self {
            status: response.status_code(),
            code: response.error_code().unwrap_or("Unknown").to_string(),
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_envelope_parses_wire_form() {
        let wire = r#"{
            "ResponseMetadata": {
                "RequestId": "a1b2c3d4",
                "HTTPStatusCode": 200
            },
            "Instances": [{"InstanceId": "i-0123"}]
        }"#;

        let response: ApiResponse = serde_json::from_str(wire).unwrap();
        assert_eq!(response.request_id(), "a1b2c3d4");
        assert!(response.is_success());
        assert_eq!(response.instances().len(), 1);
    }

    #[test]
    fn test_envelope_round_trip_keeps_body() {
        let response = ApiResponse::new(
            "req-1",
            200,
            json!({"Images": [{"ImageId": "ami-1"}, {"ImageId": "ami-2"}]}),
        );

        let value = response.to_value();
        assert_eq!(value["ResponseMetadata"]["RequestId"], "req-1");
        assert_eq!(value["ResponseMetadata"]["HTTPStatusCode"], 200);
        assert_eq!(value["Images"][1]["ImageId"], "ami-2");

        let reparsed: ApiResponse = serde_json::from_value(value).unwrap();
        assert_eq!(reparsed.images().len(), 2);
    }

    #[test]
    fn test_reservation_instances_flatten() {
        let response = ApiResponse::new(
            "req-2",
            200,
            json!({"Reservations": [
                {"Instances": [{"InstanceId": "i-1"}, {"InstanceId": "i-2"}]},
                {"Instances": [{"InstanceId": "i-3"}]}
            ]}),
        );

        let instances = response.reservation_instances();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[2]["InstanceId"], "i-3");
    }

    #[test]
    fn test_terminating_instance_ids() {
        let response = ApiResponse::new(
            "req-3",
            200,
            json!({"TerminatingInstances": [
                {"InstanceId": "i-1", "CurrentState": {"Code": 48, "Name": "terminated"}}
            ]}),
        );

        assert_eq!(response.terminating_instance_ids(), vec!["i-1".to_string()]);
    }

    #[test]
    fn test_error_envelope() {
        let response = ApiResponse::new(
            "req-4",
            401,
            json!({"Error": {"Code": "AuthFailure", "Message": "not authorized"}}),
        );

        assert!(!response.is_success());
        assert_eq!(response.error_code(), Some("AuthFailure"));

        let error = ApiError::from_response(response);
        assert_eq!(error.status, 401);
        assert_eq!(error.code, "AuthFailure");
        assert!(error.to_string().contains("401"));
        assert!(error.to_string().contains("AuthFailure"));
    }

    #[test]
    fn test_missing_collections_are_empty() {
        let response = ApiResponse::new("req-5", 200, json!({}));
        assert!(response.instances().is_empty());
        assert!(response.reservation_instances().is_empty());
        assert!(response.images().is_empty());
        assert!(response.terminating_instance_ids().is_empty());
    }
}
