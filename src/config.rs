use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::fingerprint::ChangeDetector;

/// Raw configuration as assembled from defaults, files, environment and
/// command line.  Turned into [`Settings`] once region and cluster are
/// known.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Name of the container running ecs-gen itself.
    pub task: String,
    /// Environment variable holding the routing key.
    pub host_var: String,
    /// Reload command run after each render.
    pub signal: String,
    /// Seconds between cycles.
    pub frequency: u64,
    pub once: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            cluster: None,
            template: None,
            output: None,
            task: "ecs-nginx-proxy".into(),
            host_var: "virtual_host".into(),
            signal: "nginx -s reload".into(),
            frequency: 30,
            once: false,
            state_file: None,
        }
    }
}

/// Command-line values.  Unset fields are not serialized, so they never
/// shadow lower layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub once: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Config {
    /// Defaults, then `ecs-gen.toml`/`ecs-gen.json` (or `config_file`),
    /// then `ECS_GEN_*` variables, then `overrides`.
    ///
    /// An explicit `config_file` must exist; it is read as JSON when its
    /// extension is `.json` and as TOML otherwise.
    pub fn load(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        figment = match config_file {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()).into());
            }
            Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
                figment.merge(Json::file(path))
            }
            Some(path) => figment.merge(Toml::file(path)),
            None => figment
                .merge(Toml::file("ecs-gen.toml"))
                .merge(Json::file("ecs-gen.json")),
        };
        let mut config: Config = figment
            .merge(Env::prefixed("ECS_GEN_"))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // An empty value means "discover it".
        config.region = config.region.filter(|r| !r.is_empty());
        config.cluster = config.cluster.filter(|c| !c.is_empty());
        Ok(config)
    }

    /// Checks that do not need the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let template = self
            .template
            .as_ref()
            .ok_or(ConfigError::Missing("template"))?;
        if !template.is_file() {
            return Err(ConfigError::TemplateNotFound(template.clone()));
        }
        if self.output.is_none() {
            return Err(ConfigError::Missing("output"));
        }
        if self.frequency == 0 {
            return Err(ConfigError::InvalidFrequency);
        }
        if self.host_var.is_empty() {
            return Err(ConfigError::EmptyHostVar);
        }
        Ok(())
    }

    /// Freeze into [`Settings`] with the now-known region and cluster.
    pub fn into_settings(
        self,
        region: String,
        cluster: String,
    ) -> Result<Settings, ConfigError> {
        self.validate()?;
        Ok(Settings {
            region,
            cluster,
            template: self.template.ok_or(ConfigError::Missing("template"))?,
            output: self.output.ok_or(ConfigError::Missing("output"))?,
            own_task_name: self.task,
            host_var: self.host_var,
            reload_command: self.signal,
            interval: Duration::from_secs(self.frequency),
            once: self.once,
            state_file: self
                .state_file
                .unwrap_or_else(ChangeDetector::default_state_path),
        })
    }
}

/// Immutable runtime configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub cluster: String,
    pub template: PathBuf,
    pub output: PathBuf,
    pub own_task_name: String,
    pub host_var: String,
    pub reload_command: String,
    pub interval: Duration,
    pub once: bool,
    pub state_file: PathBuf,
}
