//! Proxy for the supported EC2 actions.
//!
//! Every operation follows the same shape: issue the remote call, record the
//! full response in the request history (success or failure), and on success
//! fold the returned resource records into the matching cache. Remote
//! failures are never propagated — the failing envelope is cached and
//! returned like any other response, so the caller learns the outcome by
//! reading the corresponding request record.
//!
//! Each resource kind has its own guarded store, so concurrent filesystem
//! operations on different kinds never contend on one lock. No store lock is
//! held while a remote call is in flight.

use chrono::Duration;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::protocol::{
    ApiCallResult, ApiResponse, DescribeImagesRequest, DescribeInstancesRequest, Ec2Client,
    RunInstancesRequest, TerminateInstancesRequest,
};
use crate::store::{CacheEntry, ExpiringKvStore, GuardedKvStore};

/// Capacity limit of the request history.
pub const REQUESTS_MAX_LEN: usize = 1000;

/// Age limit of a request history record, in seconds.
pub const REQUESTS_MAX_AGE_SECONDS: i64 = 1500;

/// Flavor catalog bundled with the crate. There is no EC2 call to enumerate
/// instance types, so the list ships as a static file.
const FLAVOR_CATALOG: &str = include_str!("flavors.txt");

/// Caching proxy over an [`Ec2Client`].
pub struct Ec2Proxy {
    client: Box<dyn Ec2Client>,
    instances: GuardedKvStore,
    images: GuardedKvStore,
    flavors: GuardedKvStore,
    requests: ExpiringKvStore,
}

impl Ec2Proxy {
    /// Create a proxy with empty resource caches and the bundled flavor
    /// catalog loaded.
    pub fn new(client: Box<dyn Ec2Client>) -> Self {
        let proxy = Self {
            client,
            instances: GuardedKvStore::new(),
            images: GuardedKvStore::new(),
            flavors: GuardedKvStore::new(),
            requests: ExpiringKvStore::new(
                REQUESTS_MAX_LEN,
                Duration::seconds(REQUESTS_MAX_AGE_SECONDS),
            ),
        };

        // The catalog store keeps empty values; only the key set matters.
        // It goes through a guarded store anyway for consistency with the
        // other resource kinds.
        proxy.flavors.bulk_insert(
            FLAVOR_CATALOG
                .lines()
                .map(str::trim)
                .filter(|flavor| !flavor.is_empty())
                .map(|flavor| (flavor.to_string(), Value::String(String::new()))),
        );

        info!(flavors = proxy.flavors.len(), "proxy initialized");
        proxy
    }

    /// Run `run_instances` and cache the created instances.
    pub fn run_instances(&self, request: &RunInstancesRequest) -> ApiResponse {
        let response = self.record("run_instances", self.client.run_instances(request));
        if response.is_success() {
            self.instances
                .bulk_insert(keyed_by(response.instances(), "InstanceId"));
        }
        response
    }

    /// Run `describe_instances` and cache the described instances.
    pub fn describe_instances(&self, request: &DescribeInstancesRequest) -> ApiResponse {
        let response = self.record(
            "describe_instances",
            self.client.describe_instances(request),
        );
        if response.is_success() {
            self.instances
                .bulk_insert(keyed_by(response.reservation_instances(), "InstanceId"));
        }
        response
    }

    /// Run `terminate_instances`, then re-describe exactly the terminated
    /// ids so their cached state reflects the post-termination snapshot.
    ///
    /// Terminated entries stay in the cache: termination is a state
    /// transition of the resource, not an entity deletion.
    pub fn terminate_instances(&self, request: &TerminateInstancesRequest) -> ApiResponse {
        let response = self.record(
            "terminate_instances",
            self.client.terminate_instances(request),
        );
        if response.is_success() {
            let terminated = response.terminating_instance_ids();
            self.describe_instances(&DescribeInstancesRequest {
                instance_ids: Some(terminated),
            });
        }
        response
    }

    /// Run `describe_images` and cache the described images.
    pub fn describe_images(&self, request: &DescribeImagesRequest) -> ApiResponse {
        let response = self.record("describe_images", self.client.describe_images(request));
        if response.is_success() {
            self.images
                .bulk_insert(keyed_by(response.images(), "ImageId"));
        }
        response
    }

    /// No-argument describe of instances and images, refreshing both caches.
    pub fn refresh(&self) {
        self.describe_instances(&DescribeInstancesRequest::default());
        self.describe_images(&DescribeImagesRequest::default());
    }

    /// Full snapshot of the cached instances.
    pub fn cached_instances(&self) -> std::collections::HashMap<String, CacheEntry> {
        self.instances.snapshot()
    }

    /// Full snapshot of the cached images.
    pub fn cached_images(&self) -> std::collections::HashMap<String, CacheEntry> {
        self.images.snapshot()
    }

    /// The flavor catalog, sorted for a stable listing.
    pub fn cached_flavors(&self) -> Vec<String> {
        let mut flavors = self.flavors.keys();
        flavors.sort();
        flavors
    }

    /// Full snapshot of the request history.
    pub fn cached_requests(&self) -> std::collections::HashMap<String, CacheEntry> {
        self.requests.snapshot()
    }

    /// Cached record of one instance.
    pub fn instance(&self, instance_id: &str) -> Option<CacheEntry> {
        self.instances.get(instance_id)
    }

    /// Cached record of one image.
    pub fn image(&self, image_id: &str) -> Option<CacheEntry> {
        self.images.get(image_id)
    }

    /// Cached record of one request.
    pub fn request(&self, request_id: &str) -> Option<CacheEntry> {
        self.requests.get(request_id)
    }

    /// Current cached instance ids.
    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.keys()
    }

    /// Current cached image ids.
    pub fn image_ids(&self) -> Vec<String> {
        self.images.keys()
    }

    /// Current live request ids.
    pub fn request_ids(&self) -> Vec<String> {
        self.requests.keys()
    }

    /// Common tail of every operation: unwrap a failure into its envelope,
    /// record the response in the request history, and log the outcome.
    fn record(&self, operation: &str, outcome: ApiCallResult) -> ApiResponse {
        let response = match outcome {
            Ok(response) => response,
            Err(failure) => failure.response,
        };

        self.requests
            .insert(response.request_id().to_string(), response.to_value());

        if response.is_success() {
            info!(
                operation,
                request_id = response.request_id(),
                "api call succeeded"
            );
        } else {
            error!(
                operation,
                request_id = response.request_id(),
                status = response.status_code(),
                code = response.error_code().unwrap_or("Unknown"),
                "api call failed"
            );
        }

        response
    }
}

/// Key resource records by an id field, skipping records without one.
fn keyed_by(records: Vec<Value>, field: &str) -> Vec<(String, Value)> {
    records
        .into_iter()
        .filter_map(|record| {
            let key = record.get(field).and_then(Value::as_str).map(str::to_string);
            match key {
                Some(key) => Some((key, record)),
                None => {
                    warn!(field, "dropping resource record without id field");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEc2;

    fn mocked_proxy() -> Ec2Proxy {
        Ec2Proxy::new(Box::new(MockEc2::new()))
    }

    fn run_request(count: u32) -> RunInstancesRequest {
        RunInstancesRequest {
            image_id: "ami-03cf127a".to_string(),
            instance_type: "t2.nano".to_string(),
            min_count: count,
            max_count: count,
        }
    }

    #[test]
    fn test_run_instances_caches_each_instance() {
        let proxy = mocked_proxy();

        let response = proxy.run_instances(&run_request(5));

        assert_eq!(response.status_code(), 200);
        assert_eq!(proxy.cached_instances().len(), 5);
        assert!(proxy.cached_requests().contains_key(response.request_id()));
    }

    #[test]
    fn test_describe_instances_with_empty_fleet() {
        let proxy = mocked_proxy();

        let response = proxy.describe_instances(&DescribeInstancesRequest::default());

        assert_eq!(response.status_code(), 200);
        assert!(proxy.cached_instances().is_empty());
        assert_eq!(proxy.cached_requests().len(), 1);
        assert!(proxy.cached_requests().contains_key(response.request_id()));
    }

    #[test]
    fn test_describe_images_caches_catalog() {
        let proxy = mocked_proxy();

        let response = proxy.describe_images(&DescribeImagesRequest::default());

        assert_eq!(response.status_code(), 200);
        assert!(proxy.cached_requests().contains_key(response.request_id()));
        assert!(!proxy.cached_images().is_empty());
    }

    #[test]
    fn test_terminate_refreshes_cached_state_and_keeps_entry() {
        let proxy = mocked_proxy();
        proxy.run_instances(&run_request(1));
        let instance_id = proxy.instance_ids().remove(0);

        let response = proxy.terminate_instances(&TerminateInstancesRequest {
            instance_ids: vec![instance_id.clone()],
        });

        assert_eq!(response.status_code(), 200);
        assert!(proxy.cached_requests().contains_key(response.request_id()));

        // Entry survives termination with the post-termination snapshot.
        let entry = proxy.instance(&instance_id).unwrap();
        assert_eq!(entry.data["State"]["Code"], 48);
        assert_eq!(entry.data["State"]["Name"], "terminated");
        assert_eq!(
            entry.data["StateReason"]["Code"],
            "Client.UserInitiatedShutdown"
        );
        assert_eq!(proxy.cached_instances().len(), 1);
    }

    #[test]
    fn test_terminate_records_two_requests() {
        let proxy = mocked_proxy();
        proxy.run_instances(&run_request(1));
        let instance_id = proxy.instance_ids().remove(0);
        let before = proxy.cached_requests().len();

        proxy.terminate_instances(&TerminateInstancesRequest {
            instance_ids: vec![instance_id],
        });

        // Terminate itself plus the follow-up describe.
        assert_eq!(proxy.cached_requests().len(), before + 2);
    }

    #[test]
    fn test_flavor_catalog_is_loaded_and_invariant() {
        let proxy = mocked_proxy();
        assert_eq!(proxy.cached_flavors().len(), 307);

        proxy.run_instances(&run_request(2));
        proxy.refresh();

        assert_eq!(proxy.cached_flavors().len(), 307);
    }

    #[test]
    fn test_remote_failure_is_cached_not_raised() {
        let client = MockEc2::new();
        client.fail_with(401, "AuthFailure", "AWS was not able to validate the credentials");
        let proxy = Ec2Proxy::new(Box::new(client));

        let response = proxy.describe_instances(&DescribeInstancesRequest::default());

        assert_eq!(response.status_code(), 401);
        assert_eq!(response.error_code(), Some("AuthFailure"));
        assert!(proxy.cached_instances().is_empty());
        // The failure is inspectable as a request record like any success.
        let entry = proxy.request(response.request_id()).unwrap();
        assert_eq!(entry.data["Error"]["Code"], "AuthFailure");
    }

    #[test]
    fn test_refresh_describes_instances_and_images() {
        let proxy = mocked_proxy();
        proxy.run_instances(&run_request(3));
        let before = proxy.cached_requests().len();

        proxy.refresh();

        assert_eq!(proxy.cached_requests().len(), before + 2);
        assert_eq!(proxy.cached_instances().len(), 3);
        assert!(!proxy.cached_images().is_empty());
    }
}
