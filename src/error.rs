//! Error types for each stage of a reconciliation cycle.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failure talking to the cluster control plane.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("cluster {0} not found. Did you specify the correct cluster and region?")]
    ClusterNotFound(String),

    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned a record without {field}")]
    Incomplete {
        operation: &'static str,
        field: &'static str,
    },
}

impl ProviderError {
    pub fn api(operation: &'static str, err: impl std::fmt::Display) -> Self {
        ProviderError::Api {
            operation,
            message: err.to_string(),
        }
    }
}

/// Reasons a whole resolve is abandoned.  The cycle is skipped.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cluster {cluster} is unavailable: {source}")]
    ClusterUnavailable {
        cluster: String,
        #[source]
        source: ProviderError,
    },

    #[error("cluster {cluster} is not active (status {status})")]
    ClusterNotActive { cluster: String, status: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("unable to read template file {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {path} failed: {message}")]
    Template { path: PathBuf, message: String },

    #[error("unable to write output file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("unable to run reload command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reload command `{command}` exited with {status}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

/// Problems with the assembled configuration.  Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("template file {0} does not exist")]
    TemplateNotFound(PathBuf),

    #[error("config file {0} does not exist")]
    ConfigFileNotFound(PathBuf),

    #[error("frequency must be greater than 0")]
    InvalidFrequency,

    #[error("host-var must not be empty")]
    EmptyHostVar,

    #[error("could not determine cluster {what}. please define using --{flag}: {reason}")]
    Discovery {
        what: &'static str,
        flag: &'static str,
        reason: String,
    },
}
