//! Mock provider state.
//!
//! Holds the fake fleet and image catalog behind the in-process EC2 mock.
//! Records serialize into the provider wire form (PascalCase fields,
//! timestamps as RFC 3339 text), so the proxy caches them exactly as it
//! would cache real responses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instance lifecycle state as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceState {
    pub code: u16,
    pub name: String,
}

impl InstanceState {
    pub fn pending() -> Self {
        Self { code: 0, name: "pending".to_string() }
    }

    pub fn running() -> Self {
        Self { code: 16, name: "running".to_string() }
    }

    pub fn terminated() -> Self {
        Self { code: 48, name: "terminated".to_string() }
    }
}

/// Reason attached to a state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateReason {
    pub code: String,
    pub message: String,
}

impl StateReason {
    pub fn user_initiated_shutdown() -> Self {
        Self {
            code: "Client.UserInitiatedShutdown".to_string(),
            message: "Client.UserInitiatedShutdown: User initiated shutdown".to_string(),
        }
    }
}

/// One fake instance, in provider wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MockInstance {
    pub instance_id: String,
    pub image_id: String,
    pub instance_type: String,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_reason: Option<StateReason>,
    pub launch_time: DateTime<Utc>,
}

/// One fake machine image, in provider wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MockImage {
    pub image_id: String,
    pub name: String,
    pub state: String,
    pub architecture: String,
    pub creation_date: String,
}

/// Mock provider state container.
#[derive(Debug, Default)]
pub struct MockState {
    /// Fake fleet by instance id.
    pub instances: HashMap<String, MockInstance>,
    /// Seeded image catalog.
    pub images: Vec<MockImage>,
    /// Counter for generating unique instance ids.
    id_counter: u64,
}

impl MockState {
    /// Create a state container with the seeded image catalog.
    pub fn new() -> Self {
        Self {
            images: seed_images(),
            ..Self::default()
        }
    }

    /// Generate a unique instance id.
    pub fn next_instance_id(&mut self) -> String {
        self.id_counter += 1;
        format!("i-{:017x}", self.id_counter)
    }

    /// True if the image id is in the catalog.
    pub fn has_image(&self, image_id: &str) -> bool {
        self.images.iter().any(|image| image.image_id == image_id)
    }

    /// Launch one instance in `pending` state and return a copy of it.
    pub fn launch(&mut self, image_id: &str, instance_type: &str) -> MockInstance {
        let instance = MockInstance {
            instance_id: self.next_instance_id(),
            image_id: image_id.to_string(),
            instance_type: instance_type.to_string(),
            state: InstanceState::pending(),
            state_reason: None,
            launch_time: Utc::now(),
        };
        self.instances
            .insert(instance.instance_id.clone(), instance.clone());
        instance
    }

    /// Promote pending instances to running, as the provider would have by
    /// the time a describe call observes them.
    pub fn promote_pending(&mut self) {
        for instance in self.instances.values_mut() {
            if instance.state == InstanceState::pending() {
                instance.state = InstanceState::running();
            }
        }
    }

    /// Transition an instance to `terminated`; returns the previous state
    /// and a copy of the updated record, or `None` for an unknown id.
    pub fn terminate(&mut self, instance_id: &str) -> Option<(InstanceState, MockInstance)> {
        let instance = self.instances.get_mut(instance_id)?;
        let previous = instance.state.clone();
        instance.state = InstanceState::terminated();
        instance.state_reason = Some(StateReason::user_initiated_shutdown());
        Some((previous, instance.clone()))
    }
}

fn seed_images() -> Vec<MockImage> {
    vec![
        MockImage {
            image_id: "ami-03cf127a".to_string(),
            name: "amzn2-ami-hvm-2.0-x86_64-gp2".to_string(),
            state: "available".to_string(),
            architecture: "x86_64".to_string(),
            creation_date: "2019-08-16T10:24:07.000Z".to_string(),
        },
        MockImage {
            image_id: "ami-0b69ea66ff7391e80".to_string(),
            name: "amzn-ami-hvm-2018.03.0-x86_64-gp2".to_string(),
            state: "available".to_string(),
            architecture: "x86_64".to_string(),
            creation_date: "2019-06-19T21:59:14.000Z".to_string(),
        },
        MockImage {
            image_id: "ami-0c55b159cbfafe1f0".to_string(),
            name: "ubuntu/images/hvm-ssd/ubuntu-bionic-18.04-amd64-server".to_string(),
            state: "available".to_string(),
            architecture: "x86_64".to_string(),
            creation_date: "2019-02-20T00:00:00.000Z".to_string(),
        },
    ]
}
