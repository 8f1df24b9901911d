//! Configuration management for portal-cli.

use anyhow::{Context, Result};
use clipportal_client::ClientConfig;
use clipportal_types::UserId;
use serde::{Deserialize, Serialize};
use std::path::Path;

const SETTINGS_FILE: &str = "settings.json";
const CONFIG_FILE: &str = "config.toml";

/// CLI settings stored next to the friend list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Outgoing receiver for `send`.
    #[serde(rename = "receiverId", default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
}

impl Settings {
    /// Load settings from a directory. Missing file means defaults.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).context("Invalid settings file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).context("Failed to read settings"),
        }
    }

    /// Save settings to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(SETTINGS_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save settings")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }
}

/// Load the client configuration.
///
/// An explicit `--config` path must exist. Otherwise `config.toml` in the
/// data directory is used if present, and built-in defaults if not.
pub fn load_client_config(explicit: Option<&Path>, data_dir: &Path) -> Result<ClientConfig> {
    if let Some(path) = explicit {
        return Ok(ClientConfig::from_file(path)?);
    }
    let path = data_dir.join(CONFIG_FILE);
    if path.exists() {
        Ok(ClientConfig::from_file(&path)?)
    } else {
        Ok(ClientConfig::default())
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
