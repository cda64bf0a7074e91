//! Client seam between the proxy and the network transport.

use super::envelope::{ApiError, ApiResponse};
use super::ops::{
    DescribeImagesRequest, DescribeInstancesRequest, RunInstancesRequest,
    TerminateInstancesRequest,
};

/// Result of one remote call. The `Err` arm still carries a full response
/// envelope; the proxy treats it as data, not as a failure to propagate.
pub type ApiCallResult = Result<ApiResponse, ApiError>;

/// The fixed set of remote operations the proxy knows how to issue.
///
/// Implementations may block on network I/O; the proxy never calls them
/// while holding a store lock. `Send + Sync` because the filesystem driver
/// dispatches operations from multiple threads.
pub trait Ec2Client: Send + Sync {
    fn run_instances(&self, request: &RunInstancesRequest) -> ApiCallResult;

    fn describe_instances(&self, request: &DescribeInstancesRequest) -> ApiCallResult;

    fn terminate_instances(&self, request: &TerminateInstancesRequest) -> ApiCallResult;

    fn describe_images(&self, request: &DescribeImagesRequest) -> ApiCallResult;
}
