//! Data structures used throughout ecs-gen.
//!
//! Two families live here.  The cluster records (`ClusterInfo`, `Task`,
//! `TaskDefinition` and friends) are plain values handed back by a
//! [`ClusterProvider`](crate::provider::ClusterProvider); optional data
//! is spelled out as `Option` so the resolver can decide between
//! skipping an entry and aborting a cycle.  [`Endpoint`] and
//! [`RoutingGroup`] are the derived state that feeds the template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Status a cluster must report before it is scanned.
pub const CLUSTER_ACTIVE: &str = "ACTIVE";

/// One routable container, as exposed to the template.
///
/// Identity is structural.  `env` is a sorted map so that iteration
/// (and therefore the fingerprint) never depends on discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Routing key, usually a virtual hostname.
    pub host: String,
    /// Host port the container is reachable on.
    pub port: String,
    /// Private address of the node running the container.  Empty when
    /// the owning instance could not be resolved.
    pub address: String,
    pub env: BTreeMap<String, String>,
}

/// Endpoints grouped by routing key.
///
/// Keys are kept sorted and each group preserves discovery order, so
/// identical input always renders identical output.
pub type RoutingGroup = BTreeMap<String, Vec<Endpoint>>;

/// Build a [`RoutingGroup`] from a resolved endpoint list.
pub fn group_by_host(endpoints: &[Endpoint]) -> RoutingGroup {
    let mut group = RoutingGroup::new();
    for endpoint in endpoints {
        group
            .entry(endpoint.host.clone())
            .or_default()
            .push(endpoint.clone());
    }
    group
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub status: String,
}

impl ClusterInfo {
    pub fn is_active(&self) -> bool {
        self.status == CLUSTER_ACTIVE
    }
}

/// A registered container instance and the EC2 node backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInstance {
    pub arn: String,
    pub ec2_instance_id: Option<String>,
}

/// Live port mapping of a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkBinding {
    pub container_port: u16,
    pub host_port: u16,
}

/// A running container inside a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub network_bindings: Vec<NetworkBinding>,
}

/// A scheduled task.  `container_instance_arn` is absent for tasks that
/// are not placed on a registered instance (e.g. Fargate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub arn: String,
    pub task_definition_arn: String,
    pub container_instance_arn: Option<String>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinition {
    pub name: String,
    pub environment: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub arn: String,
    pub container_definitions: Vec<ContainerDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: &str) -> Endpoint {
        Endpoint {
            host: host.into(),
            port: port.into(),
            address: "10.0.0.1".into(),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn grouping_keeps_discovery_order_within_a_host() {
        let endpoints = vec![
            endpoint("b.example.com", "1"),
            endpoint("a.example.com", "2"),
            endpoint("b.example.com", "3"),
        ];
        let group = group_by_host(&endpoints);

        assert_eq!(
            group.keys().collect::<Vec<_>>(),
            ["a.example.com", "b.example.com"]
        );
        let ports: Vec<_> = group["b.example.com"]
            .iter()
            .map(|e| e.port.as_str())
            .collect();
        assert_eq!(ports, ["1", "3"]);
    }

    #[test]
    fn only_active_clusters_are_active() {
        let mut info = ClusterInfo {
            name: "prod".into(),
            status: "ACTIVE".into(),
        };
        assert!(info.is_active());
        info.status = "INACTIVE".into();
        assert!(!info.is_active());
    }
}
