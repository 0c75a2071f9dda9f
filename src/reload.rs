//! Signals the downstream process once a new config is in place.

use log::info;
use tokio::process::Command;

use crate::error::ReloadError;

/// Captured output of a successful reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadOutput {
    pub output: String,
}

/// Run `command_line` through `/bin/sh -c` and wait for it.
///
/// Stderr is redirected into stdout inside the shell, so the captured
/// output keeps the order the command wrote it in.  A non-zero exit is an
/// error carrying that output; there is no retry and no timeout.
pub async fn reload(command_line: &str) -> Result<ReloadOutput, ReloadError> {
    info!("running signal command");
    let result = Command::new("/bin/sh")
        .arg("-c")
        .arg(format!("exec 2>&1; {}", command_line))
        .output()
        .await
        .map_err(|source| ReloadError::Spawn {
            command: command_line.to_string(),
            source,
        })?;

    let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
    // Only non-empty if the shell failed before the redirect took effect.
    output.push_str(&String::from_utf8_lossy(&result.stderr));
    info!("===== output start =====");
    info!("{}", output.trim_end());
    info!("===== output end =====");

    if !result.status.success() {
        return Err(ReloadError::Failed {
            command: command_line.to_string(),
            status: result.status,
            output,
        });
    }
    Ok(ReloadOutput { output })
}
