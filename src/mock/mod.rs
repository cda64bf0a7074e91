//! In-process EC2 mock.
//!
//! Implements [`Ec2Client`] against a fake fleet, answering with the same
//! envelope shapes the real API uses. Serves the `--mock` mode and the test
//! suite; failure injection covers the error paths (for example an
//! unauthorized endpoint answering 401 to everything).

mod state;

pub use state::{InstanceState, MockImage, MockInstance, MockState, StateReason};

use std::sync::Mutex;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::protocol::{
    ApiCallResult, ApiError, ApiResponse, DescribeImagesRequest, DescribeInstancesRequest,
    Ec2Client, RunInstancesRequest, TerminateInstancesRequest,
};

/// A failure every subsequent call should answer with.
#[derive(Debug, Clone)]
struct ForcedFailure {
    status: u16,
    code: String,
    message: String,
}

/// Configurable mock provider.
pub struct MockEc2 {
    state: Mutex<MockState>,
    failure: Mutex<Option<ForcedFailure>>,
}

impl MockEc2 {
    /// Create a mock with an empty fleet and the seeded image catalog.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::new()),
            failure: Mutex::new(None),
        }
    }

    /// Make every subsequent call fail with the given error envelope.
    pub fn fail_with(&self, status: u16, code: &str, message: &str) {
        let mut failure = self.failure.lock().unwrap();
        *failure = Some(ForcedFailure {
            status,
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// Clear a forced failure.
    pub fn clear_failure(&self) {
        let mut failure = self.failure.lock().unwrap();
        *failure = None;
    }

    fn forced_failure(&self) -> Option<ApiError> {
        let failure = self.failure.lock().unwrap();
        failure
            .as_ref()
            .map(|f| error_response(f.status, &f.code, &f.message))
    }
}

impl Default for MockEc2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ec2Client for MockEc2 {
    fn run_instances(&self, request: &RunInstancesRequest) -> ApiCallResult {
        if let Some(failure) = self.forced_failure() {
            return Err(failure);
        }
        if request.min_count == 0 || request.max_count < request.min_count {
            return Err(error_response(
                400,
                "InvalidParameterCombination",
                "MinCount must be at least 1 and no greater than MaxCount",
            ));
        }

        let mut state = self.state.lock().unwrap();
        if !state.has_image(&request.image_id) {
            return Err(error_response(
                400,
                "InvalidAMIID.NotFound",
                &format!("The image id '{}' does not exist", request.image_id),
            ));
        }

        let instances: Vec<Value> = (0..request.max_count)
            .map(|_| to_wire(&state.launch(&request.image_id, &request.instance_type)))
            .collect();

        Ok(success(json!({
            "ReservationId": format!("r-{}", short_id()),
            "Instances": instances,
        })))
    }

    fn describe_instances(&self, request: &DescribeInstancesRequest) -> ApiCallResult {
        if let Some(failure) = self.forced_failure() {
            return Err(failure);
        }

        let mut state = self.state.lock().unwrap();
        // By the time a describe observes them, pending instances have come up.
        state.promote_pending();

        let instances: Vec<Value> = match &request.instance_ids {
            Some(ids) => {
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    match state.instances.get(id) {
                        Some(instance) => selected.push(to_wire(instance)),
                        None => {
                            return Err(error_response(
                                400,
                                "InvalidInstanceID.NotFound",
                                &format!("The instance ID '{}' does not exist", id),
                            ))
                        }
                    }
                }
                selected
            }
            None => state.instances.values().map(to_wire).collect(),
        };

        let reservations: Vec<Value> = if instances.is_empty() {
            Vec::new()
        } else {
            vec![json!({
                "ReservationId": format!("r-{}", short_id()),
                "Instances": instances,
            })]
        };

        Ok(success(json!({ "Reservations": reservations })))
    }

    fn terminate_instances(&self, request: &TerminateInstancesRequest) -> ApiCallResult {
        if let Some(failure) = self.forced_failure() {
            return Err(failure);
        }

        let mut state = self.state.lock().unwrap();
        let mut terminating = Vec::with_capacity(request.instance_ids.len());
        for id in &request.instance_ids {
            match state.terminate(id) {
                Some((previous, current)) => terminating.push(json!({
                    "InstanceId": current.instance_id,
                    "CurrentState": current.state,
                    "PreviousState": previous,
                })),
                None => {
                    return Err(error_response(
                        400,
                        "InvalidInstanceID.NotFound",
                        &format!("The instance ID '{}' does not exist", id),
                    ))
                }
            }
        }

        Ok(success(json!({ "TerminatingInstances": terminating })))
    }

    fn describe_images(&self, request: &DescribeImagesRequest) -> ApiCallResult {
        if let Some(failure) = self.forced_failure() {
            return Err(failure);
        }

        let state = self.state.lock().unwrap();
        let images: Vec<Value> = match &request.image_ids {
            Some(ids) => {
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    match state.images.iter().find(|image| &image.image_id == id) {
                        Some(image) => selected.push(to_wire(image)),
                        None => {
                            return Err(error_response(
                                400,
                                "InvalidAMIID.NotFound",
                                &format!("The image id '{}' does not exist", id),
                            ))
                        }
                    }
                }
                selected
            }
            None => state.images.iter().map(to_wire).collect(),
        };

        Ok(success(json!({ "Images": images })))
    }
}

fn success(body: Value) -> ApiResponse {
    ApiResponse::new(Uuid::new_v4().to_string(), 200, body)
}

fn error_response(status: u16, code: &str, message: &str) -> ApiError {
    ApiError::from_response(ApiResponse::new(
        Uuid::new_v4().to_string(),
        status,
        json!({"Error": {"Code": code, "Message": message}}),
    ))
}

fn to_wire<T: serde::Serialize>(record: &T) -> Value {
    serde_json::to_value(record).expect("wire serialization cannot fail")
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..17].to_string()
}
