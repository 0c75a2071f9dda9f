use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::error::DisplayErrorContext;
use log::debug;

use super::ClusterProvider;
use crate::error::ProviderError;
use crate::types::{
    ClusterInfo, Container, ContainerDefinition, ContainerInstance, EnvVar, NetworkBinding, Task,
    TaskDefinition,
};

/// Maximum number of references accepted by a single ECS describe call.
const DESCRIBE_BATCH: usize = 100;

/// [`ClusterProvider`] backed by the ECS and EC2 APIs.
pub struct AwsProvider {
    ecs: aws_sdk_ecs::Client,
    ec2: aws_sdk_ec2::Client,
}

impl AwsProvider {
    /// Build clients for `region` using the default credential chain.
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            ecs: aws_sdk_ecs::Client::new(&config),
            ec2: aws_sdk_ec2::Client::new(&config),
        }
    }
}

fn api_error<E: std::error::Error>(operation: &'static str, err: E) -> ProviderError {
    ProviderError::api(operation, DisplayErrorContext(err))
}

fn port(value: Option<i32>) -> Option<u16> {
    value.and_then(|p| u16::try_from(p).ok())
}

fn convert_task(task: &aws_sdk_ecs::types::Task) -> Result<Task, ProviderError> {
    let arn = task.task_arn().unwrap_or_default().to_string();
    let task_definition_arn = task
        .task_definition_arn()
        .ok_or(ProviderError::Incomplete {
            operation: "DescribeTasks",
            field: "taskDefinitionArn",
        })?
        .to_string();

    let containers = task
        .containers()
        .iter()
        .filter_map(|c| {
            let name = c.name()?.to_string();
            let network_bindings = c
                .network_bindings()
                .iter()
                .filter_map(|nb| {
                    Some(NetworkBinding {
                        container_port: port(nb.container_port())?,
                        host_port: port(nb.host_port())?,
                    })
                })
                .collect();
            Some(Container {
                name,
                network_bindings,
            })
        })
        .collect();

    Ok(Task {
        arn,
        task_definition_arn,
        container_instance_arn: task.container_instance_arn().map(str::to_string),
        containers,
    })
}

fn convert_container_definition(
    def: &aws_sdk_ecs::types::ContainerDefinition,
) -> Option<ContainerDefinition> {
    let name = def.name()?.to_string();
    let environment = def
        .environment()
        .iter()
        .filter_map(|kv| {
            Some(EnvVar {
                name: kv.name()?.to_string(),
                value: kv.value().unwrap_or_default().to_string(),
            })
        })
        .collect();
    Some(ContainerDefinition { name, environment })
}

#[async_trait]
impl ClusterProvider for AwsProvider {
    async fn describe_cluster(&self, cluster: &str) -> Result<ClusterInfo, ProviderError> {
        let resp = self
            .ecs
            .describe_clusters()
            .clusters(cluster)
            .send()
            .await
            .map_err(|e| api_error("DescribeClusters", e))?;

        let found = resp
            .clusters()
            .first()
            .ok_or_else(|| ProviderError::ClusterNotFound(cluster.to_string()))?;

        Ok(ClusterInfo {
            name: found.cluster_name().unwrap_or(cluster).to_string(),
            status: found.status().unwrap_or_default().to_string(),
        })
    }

    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<String>, ProviderError> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let resp = self
                .ecs
                .list_container_instances()
                .cluster(cluster)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| api_error("ListContainerInstances", e))?;
            arns.extend(resp.container_instance_arns().iter().cloned());
            match resp.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        debug!("Listed {} container instances in {}", arns.len(), cluster);
        Ok(arns)
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstance>, ProviderError> {
        let mut instances = Vec::with_capacity(arns.len());
        for chunk in arns.chunks(DESCRIBE_BATCH) {
            let resp = self
                .ecs
                .describe_container_instances()
                .cluster(cluster)
                .set_container_instances(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| api_error("DescribeContainerInstances", e))?;
            for ci in resp.container_instances() {
                let Some(arn) = ci.container_instance_arn() else {
                    continue;
                };
                instances.push(ContainerInstance {
                    arn: arn.to_string(),
                    ec2_instance_id: ci.ec2_instance_id().map(str::to_string),
                });
            }
        }
        Ok(instances)
    }

    async fn describe_instance_address(
        &self,
        ec2_instance_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let resp = self
            .ec2
            .describe_instances()
            .instance_ids(ec2_instance_id)
            .send()
            .await
            .map_err(|e| api_error("DescribeInstances", e))?;

        Ok(resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find_map(|i| i.private_ip_address())
            .map(str::to_string))
    }

    async fn list_tasks(&self, cluster: &str) -> Result<Vec<String>, ProviderError> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let resp = self
                .ecs
                .list_tasks()
                .cluster(cluster)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| api_error("ListTasks", e))?;
            arns.extend(resp.task_arns().iter().cloned());
            match resp.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        debug!("Listed {} tasks in {}", arns.len(), cluster);
        Ok(arns)
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<Task>, ProviderError> {
        let mut tasks = Vec::with_capacity(arns.len());
        for chunk in arns.chunks(DESCRIBE_BATCH) {
            let resp = self
                .ecs
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| api_error("DescribeTasks", e))?;
            for task in resp.tasks() {
                tasks.push(convert_task(task)?);
            }
        }
        Ok(tasks)
    }

    async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition, ProviderError> {
        let resp = self
            .ecs
            .describe_task_definition()
            .task_definition(arn)
            .send()
            .await
            .map_err(|e| api_error("DescribeTaskDefinition", e))?;

        let def = resp.task_definition().ok_or(ProviderError::Incomplete {
            operation: "DescribeTaskDefinition",
            field: "taskDefinition",
        })?;

        Ok(TaskDefinition {
            arn: arn.to_string(),
            container_definitions: def
                .container_definitions()
                .iter()
                .filter_map(convert_container_definition)
                .collect(),
        })
    }
}
