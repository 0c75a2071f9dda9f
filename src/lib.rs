//! Regenerates a reverse-proxy configuration from the live state of an
//! ECS cluster and signals the proxy to reload when it changes.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod provider;
pub mod reconcile;
pub mod reload;
pub mod render;
pub mod resolver;
pub mod types;

pub use config::{Config, Settings};
pub use reconcile::{CycleOutcome, Reconciler};
pub use types::Endpoint;
