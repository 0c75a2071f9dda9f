//! Turns raw cluster records into routable [`Endpoint`]s.
//!
//! A resolve either fails as a whole ([`ResolveError`], the cycle is
//! skipped) or succeeds with whatever containers could be routed.  A
//! container that cannot be routed is reported as a [`SkipReason`] and
//! left out; it never affects its siblings.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use thiserror::Error;

use crate::error::ResolveError;
use crate::provider::ClusterProvider;
use crate::types::{ContainerDefinition, Endpoint, NetworkBinding, Task, TaskDefinition};

/// Environment variable used to pick one of several port bindings.
pub const VIRTUAL_PORT_VAR: &str = "virtual_port";

/// Why a single container definition produced no endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("[{0}] container is own container. skipping")]
    OwnContainer(String),

    #[error("[{0}] container has no network bindings. skipping")]
    NoNetworkBindings(String),

    #[error("[{container}] {var} environment variable not found. skipping")]
    MissingRoutingKey { container: String, var: String },

    #[error("[{0}] no valid port configuration found. skipping")]
    NoPort(String),
}

/// Values pulled out of a container definition's environment.
#[derive(Debug, Default, PartialEq, Eq)]
struct ExtractedVars {
    routing_key: Option<String>,
    virtual_port: Option<String>,
    env: BTreeMap<String, String>,
}

fn extract_vars(def: &ContainerDefinition, host_var: &str) -> ExtractedVars {
    let mut vars = ExtractedVars::default();
    for var in &def.environment {
        vars.env.insert(var.name.clone(), var.value.clone());
        if var.name.eq_ignore_ascii_case(host_var) {
            vars.routing_key = Some(var.value.clone());
        } else if var.name.eq_ignore_ascii_case(VIRTUAL_PORT_VAR) {
            vars.virtual_port = Some(var.value.clone());
        }
    }
    vars
}

/// Pick the host port for a container.
///
/// A single binding always wins, whatever `virtual_port` says.  With
/// several bindings `virtual_port` must name one of the container ports.
fn resolve_port(bindings: &[NetworkBinding], virtual_port: Option<&str>) -> Option<u16> {
    if let [only] = bindings {
        return Some(only.host_port);
    }
    let wanted = virtual_port?.trim();
    bindings
        .iter()
        .find(|nb| nb.container_port.to_string() == wanted)
        .map(|nb| nb.host_port)
}

/// Build the endpoint for one container definition of a task.
pub fn extract_endpoint(
    def: &ContainerDefinition,
    bindings: &[NetworkBinding],
    address: &str,
    host_var: &str,
    own_task_name: &str,
) -> Result<Endpoint, SkipReason> {
    if def.name.eq_ignore_ascii_case(own_task_name) {
        return Err(SkipReason::OwnContainer(def.name.clone()));
    }
    if bindings.is_empty() {
        return Err(SkipReason::NoNetworkBindings(def.name.clone()));
    }

    let vars = extract_vars(def, host_var);
    let host = match vars.routing_key {
        Some(host) if !host.is_empty() => host,
        _ => {
            return Err(SkipReason::MissingRoutingKey {
                container: def.name.clone(),
                var: host_var.to_string(),
            })
        }
    };

    let port = resolve_port(bindings, vars.virtual_port.as_deref())
        .ok_or_else(|| SkipReason::NoPort(def.name.clone()))?;

    Ok(Endpoint {
        host,
        port: port.to_string(),
        address: address.to_string(),
        env: vars.env,
    })
}

pub struct Resolver<P> {
    provider: P,
    own_task_name: String,
}

impl<P: ClusterProvider> Resolver<P> {
    pub fn new(provider: P, own_task_name: impl Into<String>) -> Self {
        Self {
            provider,
            own_task_name: own_task_name.into(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Resolve every routable container in `cluster`, keyed by `host_var`.
    pub async fn resolve(
        &self,
        cluster: &str,
        host_var: &str,
    ) -> Result<Vec<Endpoint>, ResolveError> {
        info!("getting ECS cluster information");
        let info = self
            .provider
            .describe_cluster(cluster)
            .await
            .map_err(|source| ResolveError::ClusterUnavailable {
                cluster: cluster.to_string(),
                source,
            })?;
        if !info.is_active() {
            return Err(ResolveError::ClusterNotActive {
                cluster: cluster.to_string(),
                status: info.status,
            });
        }

        let addresses = self.instance_addresses(cluster).await?;
        let tasks = self.tasks(cluster).await?;

        let mut definitions: HashMap<String, TaskDefinition> = HashMap::new();
        let mut endpoints = Vec::new();
        for task in &tasks {
            if !definitions.contains_key(&task.task_definition_arn) {
                let def = self
                    .provider
                    .describe_task_definition(&task.task_definition_arn)
                    .await?;
                definitions.insert(task.task_definition_arn.clone(), def);
            }
            let def = &definitions[&task.task_definition_arn];
            self.collect_task(task, def, &addresses, host_var, &mut endpoints);
        }

        info!(
            "resolved {} endpoints from {} tasks in {}",
            endpoints.len(),
            tasks.len(),
            cluster
        );
        Ok(endpoints)
    }

    /// Map of container instance ARN to node private address.
    async fn instance_addresses(
        &self,
        cluster: &str,
    ) -> Result<HashMap<String, String>, ResolveError> {
        let arns = self.provider.list_container_instances(cluster).await?;
        if arns.is_empty() {
            return Ok(HashMap::new());
        }
        let instances = self
            .provider
            .describe_container_instances(cluster, &arns)
            .await?;

        let mut addresses = HashMap::new();
        for instance in instances {
            let Some(ec2_id) = instance.ec2_instance_id.as_deref() else {
                debug!("container instance {} has no EC2 instance", instance.arn);
                continue;
            };
            match self.provider.describe_instance_address(ec2_id).await? {
                Some(address) => {
                    addresses.insert(instance.arn, address);
                }
                None => debug!("EC2 instance {} has no private address", ec2_id),
            }
        }
        Ok(addresses)
    }

    async fn tasks(&self, cluster: &str) -> Result<Vec<Task>, ResolveError> {
        let arns = self.provider.list_tasks(cluster).await?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.provider.describe_tasks(cluster, &arns).await?)
    }

    fn collect_task(
        &self,
        task: &Task,
        def: &TaskDefinition,
        addresses: &HashMap<String, String>,
        host_var: &str,
        out: &mut Vec<Endpoint>,
    ) {
        let bindings: HashMap<&str, &[NetworkBinding]> = task
            .containers
            .iter()
            .map(|c| (c.name.as_str(), c.network_bindings.as_slice()))
            .collect();

        let address = task
            .container_instance_arn
            .as_ref()
            .and_then(|arn| addresses.get(arn))
            .map(String::as_str)
            .unwrap_or_default();
        if address.is_empty() {
            warn!("task {} has no resolvable instance address", task.arn);
        }

        for container in &def.container_definitions {
            let container_bindings = bindings
                .get(container.name.as_str())
                .copied()
                .unwrap_or_default();
            match extract_endpoint(
                container,
                container_bindings,
                address,
                host_var,
                &self.own_task_name,
            ) {
                Ok(endpoint) => out.push(endpoint),
                Err(reason) => info!("{}", reason),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnvVar;

    fn def(name: &str, env: &[(&str, &str)]) -> ContainerDefinition {
        ContainerDefinition {
            name: name.into(),
            environment: env
                .iter()
                .map(|(k, v)| EnvVar {
                    name: (*k).into(),
                    value: (*v).into(),
                })
                .collect(),
        }
    }

    fn binding(container_port: u16, host_port: u16) -> NetworkBinding {
        NetworkBinding {
            container_port,
            host_port,
        }
    }

    #[test]
    fn single_binding_ignores_virtual_port() {
        let d = def("web", &[("VIRTUAL_HOST", "a.com"), ("VIRTUAL_PORT", "443")]);
        let ep = extract_endpoint(
            &d,
            &[binding(80, 32768)],
            "10.0.0.5",
            "virtual_host",
            "ecs-nginx-proxy",
        )
        .unwrap();
        assert_eq!(ep.port, "32768");
        assert_eq!(ep.host, "a.com");
        assert_eq!(ep.address, "10.0.0.5");
        assert_eq!(ep.env.get("VIRTUAL_PORT").map(String::as_str), Some("443"));
    }

    #[test]
    fn virtual_port_selects_among_bindings() {
        let d = def("web", &[("virtual_host", "a.com"), ("Virtual_Port", "443")]);
        let ep = extract_endpoint(
            &d,
            &[binding(80, 32768), binding(443, 32769)],
            "",
            "virtual_host",
            "proxy",
        )
        .unwrap();
        assert_eq!(ep.port, "32769");
        assert_eq!(ep.address, "");
    }

    #[test]
    fn ambiguous_bindings_are_skipped() {
        let bindings = [binding(80, 32768), binding(443, 32769)];
        let without = def("web", &[("virtual_host", "a.com")]);
        assert_eq!(
            extract_endpoint(&without, &bindings, "", "virtual_host", "proxy"),
            Err(SkipReason::NoPort("web".into()))
        );
        let unmatched = def("web", &[("virtual_host", "a.com"), ("virtual_port", "8080")]);
        assert_eq!(
            extract_endpoint(&unmatched, &bindings, "", "virtual_host", "proxy"),
            Err(SkipReason::NoPort("web".into()))
        );
    }

    #[test]
    fn own_container_is_excluded_case_insensitively() {
        let d = def("ECS-Nginx-Proxy", &[("virtual_host", "a.com")]);
        assert_eq!(
            extract_endpoint(&d, &[binding(80, 80)], "", "virtual_host", "ecs-nginx-proxy"),
            Err(SkipReason::OwnContainer("ECS-Nginx-Proxy".into()))
        );
    }

    #[test]
    fn missing_or_empty_routing_key_is_skipped() {
        let missing = def("web", &[("OTHER", "x")]);
        assert!(matches!(
            extract_endpoint(&missing, &[binding(80, 80)], "", "virtual_host", "proxy"),
            Err(SkipReason::MissingRoutingKey { .. })
        ));
        let empty = def("web", &[("virtual_host", "")]);
        assert!(matches!(
            extract_endpoint(&empty, &[binding(80, 80)], "", "virtual_host", "proxy"),
            Err(SkipReason::MissingRoutingKey { .. })
        ));
    }

    #[test]
    fn custom_host_var_is_matched_case_insensitively() {
        let d = def("api", &[("Service_Domain", "api.example.com")]);
        let ep =
            extract_endpoint(&d, &[binding(8080, 31000)], "", "SERVICE_DOMAIN", "proxy").unwrap();
        assert_eq!(ep.host, "api.example.com");
    }

    #[test]
    fn no_bindings_is_skipped() {
        let d = def("worker", &[("virtual_host", "a.com")]);
        assert_eq!(
            extract_endpoint(&d, &[], "", "virtual_host", "proxy"),
            Err(SkipReason::NoNetworkBindings("worker".into()))
        );
    }
}
