//! Filesystem namespace over the proxy caches.
//!
//! The namespace is a fixed table of nodes built at construction time, plus
//! resource views derived on every request from whatever the caches hold at
//! that moment. Reads are served straight from the cached canonical bytes;
//! writes to action files parse their payload into the operation's arguments
//! and dispatch it through the proxy.
//!
//! Layout:
//!
//! ```text
//! /instances/<instance-id>       cached instance records
//! /images/<image-id>             cached image records
//! /requests/<request-id>         request history (bounded, expiring)
//! /flavors                       bundled instance-type catalog
//! /actions/run_instances         write JSON arguments to trigger
//! /actions/describe_instances
//! /actions/terminate_instances
//! /actions/describe_images
//! /refresh                       write anything to re-describe everything
//! ```

mod error;
mod node;

pub use error::FsError;
pub use node::{ActionKind, CacheSource, FsAttributes, Node, DEFAULT_MODE, S_IFDIR, S_IFREG};

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::proxy::Ec2Proxy;
use crate::store::CacheEntry;

/// The namespace projector.
pub struct Ec2Fs {
    proxy: Ec2Proxy,
    nodes: HashMap<String, Node>,
}

impl Ec2Fs {
    /// Build the namespace table over a proxy.
    pub fn new(proxy: Ec2Proxy) -> Self {
        let mut fs = Self {
            proxy,
            nodes: HashMap::new(),
        };

        fs.nodes.insert("/".to_string(), Node::dir());
        fs.register("/instances", Node::dynamic_dir(CacheSource::Instances));
        fs.register("/images", Node::dynamic_dir(CacheSource::Images));
        fs.register("/requests", Node::dynamic_dir(CacheSource::Requests));

        let catalog = fs.proxy.cached_flavors().join("\n");
        fs.register("/flavors", Node::file(catalog.into_bytes()));

        fs.register("/actions", Node::dir());
        fs.register(
            "/actions/run_instances",
            Node::action(Some(ActionKind::RunInstances)),
        );
        fs.register(
            "/actions/describe_instances",
            Node::action(Some(ActionKind::DescribeInstances)),
        );
        fs.register(
            "/actions/terminate_instances",
            Node::action(Some(ActionKind::TerminateInstances)),
        );
        fs.register(
            "/actions/describe_images",
            Node::action(Some(ActionKind::DescribeImages)),
        );
        fs.register("/refresh", Node::action(Some(ActionKind::Refresh)));

        fs
    }

    /// The proxy behind the namespace.
    pub fn proxy(&self) -> &Ec2Proxy {
        &self.proxy
    }

    /// Mount-time hook.
    pub fn init(&self) {
        info!("filesystem initialized");
    }

    /// Unmount-time hook.
    pub fn destroy(&self) {
        info!("filesystem destroyed");
    }

    /// Attributes of the node at `path`.
    ///
    /// Resource views report the cached byte length as their size and the
    /// entry's creation and update times as their timestamps.
    pub fn getattr(&self, path: &str) -> Result<FsAttributes, FsError> {
        let (dirname, basename) = split_path(path);
        if let Some(Node::DynamicDir { source, .. }) = self.nodes.get(dirname) {
            let entry = self
                .dynamic_entry(*source, basename)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            return Ok(FsAttributes::for_entry(&entry));
        }

        self.nodes
            .get(path)
            .map(|node| node.attrs().clone())
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Directory listing, including the `.` and `..` entries.
    ///
    /// Dynamic directories list the live key set of their cache, so the
    /// listing changes as operations run and history records expire.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let mut listing = vec![".".to_string(), "..".to_string()];
        match node {
            Node::Dir { children, .. } => listing.extend(children.iter().cloned()),
            Node::DynamicDir { source, .. } => {
                let mut keys = self.dynamic_keys(*source);
                keys.sort();
                listing.extend(keys);
            }
            _ => return Err(FsError::NotFound(path.to_string())),
        }
        Ok(listing)
    }

    /// Read up to `size` bytes at `offset` from the node's content.
    ///
    /// Resource views serve the entry's canonical bytes; out-of-range
    /// offsets read as empty, never as an error.
    pub fn read(&self, path: &str, size: usize, offset: usize) -> Result<Vec<u8>, FsError> {
        let content = self.content(path)?;
        let start = offset.min(content.len());
        let end = offset.saturating_add(size).min(content.len());
        Ok(content[start..end].to_vec())
    }

    /// Write `data` at `offset`.
    ///
    /// Only action files do anything with a write: the payload parses into
    /// the operation's arguments and dispatches through the proxy. Writes
    /// must land whole at offset 0. Static files accept writes without
    /// effect; resource views and directories refuse them.
    pub fn write(&self, path: &str, data: &[u8], offset: usize) -> Result<usize, FsError> {
        if offset != 0 {
            return Err(FsError::PermissionDenied(format!(
                "{}: payload must arrive in one write at offset 0",
                path
            )));
        }

        match self.nodes.get(path) {
            Some(Node::Action { action, .. }) => {
                match action {
                    Some(kind) => self.dispatch(*kind, data)?,
                    None => debug!(path, "write to unbound action file ignored"),
                }
                Ok(data.len())
            }
            Some(Node::File { .. }) => Ok(data.len()),
            Some(_) => Err(FsError::PermissionDenied(format!(
                "{} is a directory",
                path
            ))),
            None => {
                let (dirname, basename) = split_path(path);
                if let Some(Node::DynamicDir { source, .. }) = self.nodes.get(dirname) {
                    if self.dynamic_entry(*source, basename).is_some() {
                        return Err(FsError::PermissionDenied(format!(
                            "{} is a read-only resource view",
                            path
                        )));
                    }
                }
                Err(FsError::NotFound(path.to_string()))
            }
        }
    }

    /// Truncation is accepted and ignored; editors truncate before writing
    /// an action payload.
    pub fn truncate(&self, _path: &str, _size: u64) -> Result<(), FsError> {
        Ok(())
    }

    /// Timestamp updates are accepted and ignored.
    pub fn utimens(&self, _path: &str) -> Result<(), FsError> {
        Ok(())
    }

    /// Register a node and link it into its parent's child list.
    fn register(&mut self, path: &str, node: Node) {
        let (dirname, basename) = split_path(path);
        if let Some(Node::Dir { children, .. }) = self.nodes.get_mut(dirname) {
            children.push(basename.to_string());
        }
        self.nodes.insert(path.to_string(), node);
    }

    fn dynamic_entry(&self, source: CacheSource, key: &str) -> Option<CacheEntry> {
        match source {
            CacheSource::Instances => self.proxy.instance(key),
            CacheSource::Images => self.proxy.image(key),
            CacheSource::Requests => self.proxy.request(key),
        }
    }

    fn dynamic_keys(&self, source: CacheSource) -> Vec<String> {
        match source {
            CacheSource::Instances => self.proxy.instance_ids(),
            CacheSource::Images => self.proxy.image_ids(),
            CacheSource::Requests => self.proxy.request_ids(),
        }
    }

    fn content(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let (dirname, basename) = split_path(path);
        if let Some(Node::DynamicDir { source, .. }) = self.nodes.get(dirname) {
            return self
                .dynamic_entry(*source, basename)
                .map(|entry| entry.raw)
                .ok_or_else(|| FsError::NotFound(path.to_string()));
        }

        match self.nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Action { .. }) => Ok(Vec::new()),
            Some(_) => Err(FsError::PermissionDenied(format!(
                "{} is a directory",
                path
            ))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    fn dispatch(&self, action: ActionKind, payload: &[u8]) -> Result<(), FsError> {
        match action {
            ActionKind::RunInstances => {
                self.proxy.run_instances(&parse_payload(payload)?);
            }
            ActionKind::DescribeInstances => {
                self.proxy.describe_instances(&parse_payload(payload)?);
            }
            ActionKind::TerminateInstances => {
                self.proxy.terminate_instances(&parse_payload(payload)?);
            }
            ActionKind::DescribeImages => {
                self.proxy.describe_images(&parse_payload(payload)?);
            }
            ActionKind::Refresh => {
                // Refresh takes no arguments; the payload is just the trigger.
                self.proxy.refresh();
            }
        }
        Ok(())
    }
}

/// Split an absolute path into its parent directory and final component.
fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

fn parse_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FsError> {
    serde_json::from_slice(payload).map_err(|error| FsError::MalformedPayload(error.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mock::MockEc2;

    fn mocked_fs() -> Ec2Fs {
        Ec2Fs::new(Ec2Proxy::new(Box::new(MockEc2::new())))
    }

    fn run_payload(count: u32) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "ImageId": "ami-03cf127a",
            "InstanceType": "t2.nano",
            "MinCount": count,
            "MaxCount": count,
        }))
        .unwrap()
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/instances/i-1"), ("/instances", "i-1"));
        assert_eq!(split_path("/flavors"), ("/", "flavors"));
        assert_eq!(
            split_path("/actions/run_instances"),
            ("/actions", "run_instances")
        );
    }

    #[test]
    fn test_getattr_static_nodes() {
        let fs = mocked_fs();

        assert!(fs.getattr("/").unwrap().is_dir());
        assert!(fs.getattr("/instances").unwrap().is_dir());
        assert!(fs.getattr("/actions").unwrap().is_dir());
        assert!(!fs.getattr("/refresh").unwrap().is_dir());

        let flavors = fs.getattr("/flavors").unwrap();
        assert!(!flavors.is_dir());
        assert!(flavors.size > 0);

        assert!(matches!(
            fs.getattr("/nonexistent"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_readdir_root_layout() {
        let fs = mocked_fs();
        let listing = fs.readdir("/").unwrap();

        for name in [
            ".",
            "..",
            "instances",
            "images",
            "requests",
            "flavors",
            "actions",
            "refresh",
        ] {
            assert!(listing.contains(&name.to_string()), "missing {}", name);
        }

        let actions = fs.readdir("/actions").unwrap();
        assert!(actions.contains(&"run_instances".to_string()));
        assert!(actions.contains(&"terminate_instances".to_string()));
    }

    #[test]
    fn test_readdir_file_is_an_error() {
        let fs = mocked_fs();
        assert!(fs.readdir("/flavors").is_err());
        assert!(fs.readdir("/missing").is_err());
    }

    #[test]
    fn test_flavor_catalog_read() {
        let fs = mocked_fs();
        let content = fs.read("/flavors", usize::MAX, 0).unwrap();
        let text = String::from_utf8(content).unwrap();

        assert_eq!(text.lines().count(), 307);
        assert!(text.lines().all(|line| !line.trim().is_empty()));
    }

    #[test]
    fn test_read_slices_by_offset_and_size() {
        let fs = mocked_fs();
        let full = fs.read("/flavors", usize::MAX, 0).unwrap();

        let slice = fs.read("/flavors", 10, 5).unwrap();
        assert_eq!(slice, full[5..15].to_vec());

        // Out-of-range reads come back empty, not as errors.
        let beyond = fs.read("/flavors", 10, full.len() + 100).unwrap();
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_action_write_creates_instances() {
        let fs = mocked_fs();
        let payload = run_payload(5);

        let written = fs
            .write("/actions/run_instances", &payload, 0)
            .unwrap();
        assert_eq!(written, payload.len());

        let listing = fs.readdir("/instances").unwrap();
        // Five instances plus the dot entries.
        assert_eq!(listing.len(), 7);

        // Each resource view resolves and serves its cached record.
        let id = listing[2].clone();
        let attrs = fs.getattr(&format!("/instances/{}", id)).unwrap();
        let content = fs
            .read(&format!("/instances/{}", id), usize::MAX, 0)
            .unwrap();
        assert_eq!(attrs.size as usize, content.len());

        let record: serde_json::Value = serde_json::from_slice(&content).unwrap();
        assert_eq!(record["InstanceId"], id.as_str());
    }

    #[test]
    fn test_action_write_records_request() {
        let fs = mocked_fs();
        fs.write("/actions/run_instances", &run_payload(1), 0)
            .unwrap();

        let requests = fs.readdir("/requests").unwrap();
        assert_eq!(requests.len(), 3);

        let record = fs
            .read(&format!("/requests/{}", requests[2]), usize::MAX, 0)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&record).unwrap();
        assert_eq!(value["ResponseMetadata"]["HTTPStatusCode"], 200);
    }

    #[test]
    fn test_terminate_through_action_file() {
        let fs = mocked_fs();
        fs.write("/actions/run_instances", &run_payload(1), 0)
            .unwrap();
        let id = fs.proxy().instance_ids().remove(0);

        let payload = serde_json::to_vec(&json!({ "InstanceIds": [id] })).unwrap();
        fs.write("/actions/terminate_instances", &payload, 0)
            .unwrap();

        let content = fs
            .read(&format!("/instances/{}", id), usize::MAX, 0)
            .unwrap();
        let record: serde_json::Value = serde_json::from_slice(&content).unwrap();
        assert_eq!(record["State"]["Name"], "terminated");
    }

    #[test]
    fn test_refresh_ignores_payload() {
        let fs = mocked_fs();
        fs.write("/refresh", b"anything at all", 0).unwrap();

        // Refresh issued the two describes.
        assert_eq!(fs.readdir("/requests").unwrap().len(), 4);
        assert!(!fs.proxy().image_ids().is_empty());
    }

    #[test]
    fn test_malformed_payload_is_rejected_without_side_effects() {
        let fs = mocked_fs();

        let error = fs
            .write("/actions/run_instances", b"{not json", 0)
            .unwrap_err();
        assert!(matches!(error, FsError::MalformedPayload(_)));

        assert!(fs.proxy().instance_ids().is_empty());
        assert!(fs.proxy().request_ids().is_empty());
    }

    #[test]
    fn test_write_at_nonzero_offset_is_denied() {
        let fs = mocked_fs();
        let error = fs
            .write("/actions/run_instances", &run_payload(1), 1)
            .unwrap_err();
        assert!(matches!(error, FsError::PermissionDenied(_)));
        assert!(fs.proxy().instance_ids().is_empty());
    }

    #[test]
    fn test_resource_views_are_read_only() {
        let fs = mocked_fs();
        fs.write("/actions/run_instances", &run_payload(1), 0)
            .unwrap();
        let id = fs.proxy().instance_ids().remove(0);

        let error = fs
            .write(&format!("/instances/{}", id), b"{}", 0)
            .unwrap_err();
        assert!(matches!(error, FsError::PermissionDenied(_)));

        let error = fs.write("/instances/i-unknown", b"{}", 0).unwrap_err();
        assert!(matches!(error, FsError::NotFound(_)));
    }

    #[test]
    fn test_static_file_write_is_inert() {
        let fs = mocked_fs();
        let written = fs.write("/flavors", b"scribble", 0).unwrap();
        assert_eq!(written, 8);

        let content = fs.read("/flavors", usize::MAX, 0).unwrap();
        assert_eq!(String::from_utf8(content).unwrap().lines().count(), 307);
    }

    #[test]
    fn test_unbound_action_write_is_accepted_and_inert() {
        let mut fs = mocked_fs();
        fs.register("/actions/reboot_instances", Node::action(None));

        let written = fs.write("/actions/reboot_instances", &[], 0).unwrap();
        assert_eq!(written, 0);
        assert!(fs.proxy().request_ids().is_empty());
    }

    #[test]
    fn test_action_files_read_empty() {
        let fs = mocked_fs();
        assert!(fs
            .read("/actions/run_instances", usize::MAX, 0)
            .unwrap()
            .is_empty());
        assert!(fs.read("/refresh", usize::MAX, 0).unwrap().is_empty());
    }

    #[test]
    fn test_truncate_and_utimens_are_noops() {
        let fs = mocked_fs();
        fs.truncate("/actions/run_instances", 0).unwrap();
        fs.truncate("/flavors", 0).unwrap();
        fs.utimens("/refresh").unwrap();

        assert!(!fs.read("/flavors", usize::MAX, 0).unwrap().is_empty());
    }

    #[test]
    fn test_getattr_resource_view_reflects_entry() {
        let fs = mocked_fs();
        fs.write("/actions/run_instances", &run_payload(1), 0)
            .unwrap();
        let id = fs.proxy().instance_ids().remove(0);

        let entry = fs.proxy().instance(&id).unwrap();
        let attrs = fs.getattr(&format!("/instances/{}", id)).unwrap();

        assert_eq!(attrs.size as usize, entry.size);
        assert_eq!(attrs.ctime, entry.created_at);
        assert_eq!(attrs.mtime, entry.updated_at);
    }
}
