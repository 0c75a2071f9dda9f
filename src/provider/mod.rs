//! Read-only access to cluster state.
//!
//! The resolver only ever talks to a [`ClusterProvider`]; the AWS
//! implementation lives in [`aws`], node-local discovery of the region
//! and cluster name in [`metadata`].

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{ClusterInfo, ContainerInstance, Task, TaskDefinition};

pub mod aws;
pub mod metadata;

pub use aws::AwsProvider;

#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Describe a single cluster.  Fails with
    /// [`ProviderError::ClusterNotFound`] when the name is unknown.
    async fn describe_cluster(&self, cluster: &str) -> Result<ClusterInfo, ProviderError>;

    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<String>, ProviderError>;

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstance>, ProviderError>;

    /// Private address of an EC2 instance, `None` if it has none.
    async fn describe_instance_address(
        &self,
        ec2_instance_id: &str,
    ) -> Result<Option<String>, ProviderError>;

    async fn list_tasks(&self, cluster: &str) -> Result<Vec<String>, ProviderError>;

    async fn describe_tasks(&self, cluster: &str, arns: &[String])
        -> Result<Vec<Task>, ProviderError>;

    async fn describe_task_definition(&self, arn: &str) -> Result<TaskDefinition, ProviderError>;
}
