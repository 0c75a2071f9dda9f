//! Change detection.
//!
//! A [`Fingerprint`] is a SHA-256 digest over the template bytes and the
//! resolved endpoints.  The last applied fingerprint is kept hex-encoded
//! in a single state file; a missing or unparsable file means there is
//! no prior state.

use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};

use crate::error::DetectError;
use crate::types::Endpoint;

/// File name of the persisted fingerprint inside the temp directory.
pub const STATE_FILE_NAME: &str = "ecs-gen.tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 32]);

/// Strings are length-prefixed so adjacent fields cannot run together.
fn update_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

impl Fingerprint {
    pub fn compute(template: &[u8], endpoints: &[Endpoint]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((template.len() as u64).to_le_bytes());
        hasher.update(template);

        hasher.update((endpoints.len() as u64).to_le_bytes());
        for endpoint in endpoints {
            update_field(&mut hasher, &endpoint.host);
            update_field(&mut hasher, &endpoint.port);
            update_field(&mut hasher, &endpoint.address);
            hasher.update((endpoint.env.len() as u64).to_le_bytes());
            // BTreeMap iterates in key order.
            for (key, value) in &endpoint.env {
                update_field(&mut hasher, key);
                update_field(&mut hasher, value);
            }
        }
        Fingerprint(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(encoded: &str) -> Option<Self> {
        let bytes = hex::decode(encoded.trim()).ok()?;
        bytes.try_into().ok().map(Fingerprint)
    }
}

/// Result of comparing the current state with the persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub fingerprint: Fingerprint,
    pub changed: bool,
}

pub struct ChangeDetector {
    state_path: PathBuf,
}

impl ChangeDetector {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// `<temp dir>/ecs-gen.tmp`
    pub fn default_state_path() -> PathBuf {
        std::env::temp_dir().join(STATE_FILE_NAME)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn previous(&self) -> Option<Fingerprint> {
        match tokio::fs::read_to_string(&self.state_path).await {
            Ok(contents) => {
                let parsed = Fingerprint::from_hex(&contents);
                if parsed.is_none() {
                    warn!(
                        "ignoring corrupt fingerprint file {}",
                        self.state_path.display()
                    );
                }
                parsed
            }
            Err(e) => {
                debug!(
                    "unable to read fingerprint file {}: {}",
                    self.state_path.display(),
                    e
                );
                None
            }
        }
    }

    /// Compare without persisting anything.
    pub async fn check(
        &self,
        endpoints: &[Endpoint],
        template_path: &Path,
    ) -> Result<Change, DetectError> {
        let template = tokio::fs::read(template_path)
            .await
            .map_err(|source| DetectError::TemplateRead {
                path: template_path.to_path_buf(),
                source,
            })?;
        let fingerprint = Fingerprint::compute(&template, endpoints);
        let changed = self.previous().await != Some(fingerprint);
        if changed {
            info!("changes detected");
        } else {
            info!("no changes detected");
        }
        Ok(Change {
            fingerprint,
            changed,
        })
    }

    /// Persist `fingerprint` as the last applied state.  Failures are
    /// logged only: the worst outcome is one redundant render.
    pub async fn commit(&self, fingerprint: &Fingerprint) {
        if let Err(e) = tokio::fs::write(&self.state_path, fingerprint.to_hex()).await {
            error!(
                "unable to write fingerprint file {}: {}",
                self.state_path.display(),
                e
            );
        }
    }

    /// Check and, on change, persist in one step.
    pub async fn has_changed(
        &self,
        endpoints: &[Endpoint],
        template_path: &Path,
    ) -> Result<bool, DetectError> {
        let change = self.check(endpoints, template_path).await?;
        if change.changed {
            self.commit(&change.fingerprint).await;
        }
        Ok(change.changed)
    }
}
