//! Typed operation payloads.
//!
//! Field names follow the provider wire form (PascalCase), so an action-file
//! payload like `{"ImageId": "ami-03cf127a", "MinCount": 1, "MaxCount": 1,
//! "InstanceType": "t2.nano"}` deserializes directly into these types.

use serde::{Deserialize, Serialize};

/// Payload of a `run_instances` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunInstancesRequest {
    /// Machine image to launch from.
    pub image_id: String,
    /// Flavor of the launched instances.
    pub instance_type: String,
    /// Minimum number of instances to launch.
    pub min_count: u32,
    /// Maximum number of instances to launch.
    pub max_count: u32,
}

/// Payload of a `describe_instances` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesRequest {
    /// Restrict the description to these instance ids; `None` describes the
    /// whole fleet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_ids: Option<Vec<String>>,
}

/// Payload of a `terminate_instances` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TerminateInstancesRequest {
    /// Instance ids to terminate.
    pub instance_ids: Vec<String>,
}

/// Payload of a `describe_images` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeImagesRequest {
    /// Restrict the description to these image ids; `None` describes all
    /// visible images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ids: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_instances_wire_names() {
        let json = r#"{
            "ImageId": "ami-03cf127a",
            "InstanceType": "t2.nano",
            "MinCount": 5,
            "MaxCount": 5
        }"#;

        let request: RunInstancesRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.image_id, "ami-03cf127a");
        assert_eq!(request.instance_type, "t2.nano");
        assert_eq!(request.min_count, 5);
        assert_eq!(request.max_count, 5);
    }

    #[test]
    fn test_describe_requests_default_to_all() {
        let request: DescribeInstancesRequest = serde_json::from_str("{}").unwrap();
        assert!(request.instance_ids.is_none());

        let request: DescribeImagesRequest = serde_json::from_str("{}").unwrap();
        assert!(request.image_ids.is_none());
    }

    #[test]
    fn test_terminate_requires_ids() {
        assert!(serde_json::from_str::<TerminateInstancesRequest>("{}").is_err());

        let request: TerminateInstancesRequest =
            serde_json::from_str(r#"{"InstanceIds": ["i-1", "i-2"]}"#).unwrap();
        assert_eq!(request.instance_ids.len(), 2);
    }
}
