//! Node-local discovery of the region and cluster name.
//!
//! Used at startup when neither is configured.  The region comes from the
//! EC2 instance metadata service; the cluster name from the ECS agent's
//! introspection endpoint on the same host.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::Deserialize;

const IMDS_BASE: &str = "http://169.254.169.254/latest";
const ECS_AGENT_PORT: u16 = 51678;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Response of the ECS agent's `/v1/metadata` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentMetadata {
    pub cluster: String,
    #[serde(default)]
    pub container_instance_arn: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

pub struct MetadataClient {
    http: reqwest::Client,
    imds_base: String,
}

impl MetadataClient {
    pub fn new() -> Result<Self> {
        Self::with_base(IMDS_BASE)
    }

    pub fn with_base(imds_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building metadata http client")?;
        Ok(Self {
            http,
            imds_base: imds_base.into(),
        })
    }

    /// IMDSv2 session token.  `None` when the service only speaks v1.
    async fn token(&self) -> Option<String> {
        let resp = self
            .http
            .put(format!("{}/api/token", self.imds_base))
            .header("X-aws-ec2-metadata-token-ttl-seconds", "60")
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.text().await.ok()
    }

    async fn imds_get(&self, path: &str) -> Result<String> {
        let mut req = self.http.get(format!("{}/meta-data/{}", self.imds_base, path));
        if let Some(token) = self.token().await {
            req = req.header("X-aws-ec2-metadata-token", token);
        }
        let body = req
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("fetching instance metadata {}", path))?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }

    /// Region of the current instance, derived from its availability zone.
    pub async fn region(&self) -> Result<String> {
        let zone = self.imds_get("placement/availability-zone").await?;
        let region = region_from_zone(&zone)?;
        info!("found cluster region to be: {}", region);
        Ok(region)
    }

    /// Cluster the local ECS agent is registered with.
    pub async fn cluster(&self) -> Result<String> {
        let host_ip = self.imds_get("local-ipv4").await?;
        debug!("Querying ECS agent on {}", host_ip);
        let meta: AgentMetadata = self
            .http
            .get(format!("http://{}:{}/v1/metadata", host_ip, ECS_AGENT_PORT))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("querying ECS agent metadata")?
            .json()
            .await
            .context("decoding ECS agent metadata")?;
        if meta.cluster.is_empty() {
            return Err(anyhow!("ECS agent reported an empty cluster name"));
        }
        info!("found cluster name to be: {}", meta.cluster);
        Ok(meta.cluster)
    }
}

/// `us-east-1a` → `us-east-1`.
fn region_from_zone(zone: &str) -> Result<String> {
    let trimmed = zone.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if trimmed.is_empty() || !trimmed.ends_with(|c: char| c.is_ascii_digit()) {
        return Err(anyhow!("unexpected availability zone {:?}", zone));
    }
    Ok(trimmed.to_string())
}
