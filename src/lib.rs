//! ec2fs: EC2 resources projected as a filesystem.
//!
//! A caching proxy issues EC2 API calls, keeps every resource record and
//! every response envelope in thread-safe stores, and a namespace layer
//! projects those caches as directories of JSON files. Writing JSON
//! arguments to an action file triggers the corresponding API call; remote
//! failures become readable request records instead of errors.

pub mod config;
pub mod fs;
pub mod mock;
pub mod protocol;
pub mod proxy;
pub mod store;

pub use fs::{Ec2Fs, FsError};
pub use mock::MockEc2;
pub use protocol::{ApiError, ApiResponse, Ec2Client};
pub use proxy::Ec2Proxy;
pub use store::{CacheEntry, ExpiringKvStore, GuardedKvStore, StoreError};
