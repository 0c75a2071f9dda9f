#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ecs_gen::error::ProviderError;
use ecs_gen::provider::ClusterProvider;
use ecs_gen::types::{
    ClusterInfo, Container, ContainerDefinition, ContainerInstance, EnvVar, NetworkBinding, Task,
    TaskDefinition,
};
use ecs_gen::Settings;

pub const OWN_TASK: &str = "ecs-nginx-proxy";

/// In-memory cluster.  Calls are counted so tests can tell whether a
/// cycle reached the provider at all.
pub struct FakeCluster {
    pub status: Mutex<String>,
    pub instances: Vec<ContainerInstance>,
    pub addresses: HashMap<String, String>,
    pub tasks: Mutex<Vec<Task>>,
    pub definitions: HashMap<String, TaskDefinition>,
    pub fail_list_tasks: AtomicBool,
    pub describe_cluster_calls: AtomicUsize,
    pub definition_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            status: Mutex::new("ACTIVE".into()),
            instances: Vec::new(),
            addresses: HashMap::new(),
            tasks: Mutex::new(Vec::new()),
            definitions: HashMap::new(),
            fail_list_tasks: AtomicBool::new(false),
            describe_cluster_calls: AtomicUsize::new(0),
            definition_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_instance(mut self, arn: &str, ec2_id: &str, address: Option<&str>) -> Self {
        self.instances.push(ContainerInstance {
            arn: arn.into(),
            ec2_instance_id: Some(ec2_id.into()),
        });
        if let Some(address) = address {
            self.addresses.insert(ec2_id.into(), address.into());
        }
        self
    }

    /// A registered instance whose EC2 node is unknown.
    pub fn with_instance_without_ec2(mut self, arn: &str) -> Self {
        self.instances.push(ContainerInstance {
            arn: arn.into(),
            ec2_instance_id: None,
        });
        self
    }

    pub fn with_definition(mut self, arn: &str, containers: Vec<ContainerDefinition>) -> Self {
        self.definitions.insert(
            arn.into(),
            TaskDefinition {
                arn: arn.into(),
                container_definitions: containers,
            },
        );
        self
    }

    pub fn with_task(self, task: Task) -> Self {
        self.tasks.lock().unwrap().push(task);
        self
    }
}

pub fn container_def(name: &str, env: &[(&str, &str)]) -> ContainerDefinition {
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

pub fn running(name: &str, bindings: &[(u16, u16)]) -> Container {
    Container {
        name: name.into(),
        network_bindings: bindings
            .iter()
            .map(|&(container_port, host_port)| NetworkBinding {
                container_port,
                host_port,
            })
            .collect(),
    }
}

pub fn task(
    arn: &str,
    definition: &str,
    instance: Option<&str>,
    containers: Vec<Container>,
) -> Task {
    Task {
        arn: arn.into(),
        task_definition_arn: definition.into(),
        container_instance_arn: instance.map(str::to_string),
        containers,
    }
}

#[async_trait]
impl ClusterProvider for FakeCluster {
    async fn describe_cluster(&self, cluster: &str) -> Result<ClusterInfo, ProviderError> {
        self.describe_cluster_calls.fetch_add(1, Ordering::SeqCst);
        if cluster != "test-cluster" {
            return Err(ProviderError::ClusterNotFound(cluster.into()));
        }
        Ok(ClusterInfo {
            name: cluster.into(),
            status: self.status.lock().unwrap().clone(),
        })
    }

    async fn list_container_instances(&self, _cluster: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self.instances.iter().map(|i| i.arn.clone()).collect())
    }

    async fn describe_container_instances(
        &self,
        _cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstance>, ProviderError> {
        Ok(self
            .instances
            .iter()
            .filter(|i| arns.contains(&i.arn))
            .cloned()
            .collect())
    }

    async fn describe_instance_address(
        &self,
        ec2_instance_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        Ok(self.addresses.get(ec2_instance_id).cloned())
    }

    async fn list_tasks(&self, _cluster: &str) -> Result<Vec<String>, ProviderError> {
        if self.fail_list_tasks.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                operation: "ListTasks",
                message: "throttled".into(),
            });
        }
        Ok(self.tasks.lock().unwrap().iter().map(|t| t.arn.clone()).collect())
    }

    async fn describe_tasks(
        &self,
        _cluster: &str,
        arns: &[String],
    ) -> Result<Vec<Task>, ProviderError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| arns.contains(&t.arn))
            .cloned()
            .collect())
    }

    async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition, ProviderError> {
        self.definition_calls.fetch_add(1, Ordering::SeqCst);
        self.definitions.get(arn).cloned().ok_or(ProviderError::Api {
            operation: "DescribeTaskDefinition",
            message: format!("unknown task definition {}", arn),
        })
    }
}

/// Settings pointing every file at `dir`.  The reload command appends a
/// line to `reloads.log` so tests can count invocations.
pub fn settings(dir: &Path, template: &str) -> Settings {
    let template_path = dir.join("nginx.tmpl");
    std::fs::write(&template_path, template).unwrap();
    Settings {
        region: "us-east-1".into(),
        cluster: "test-cluster".into(),
        template: template_path,
        output: dir.join("default.conf"),
        own_task_name: OWN_TASK.into(),
        host_var: "virtual_host".into(),
        reload_command: format!("echo reloaded >> '{}'", dir.join("reloads.log").display()),
        interval: Duration::from_secs(1),
        once: true,
        state_file: dir.join("ecs-gen.tmp"),
    }
}

pub fn reload_count(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("reloads.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
