//! Wire types for the EC2-facing API.
//!
//! Defines the response envelope shared by every operation, the typed
//! operation payloads, and the client seam the proxy calls through. The
//! actual network transport lives outside this crate; anything that speaks
//! these types can stand in for it (see [`crate::mock`]).

mod client;
mod envelope;
mod ops;

pub use client::{ApiCallResult, Ec2Client};
pub use envelope::{ApiError, ApiResponse, ResponseMetadata};
pub use ops::{
    DescribeImagesRequest, DescribeInstancesRequest, RunInstancesRequest,
    TerminateInstancesRequest,
};
