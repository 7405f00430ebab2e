//! Persisted connection settings.
//!
//! A flat record read at startup and written on every change: whether to
//! auto-connect, whether discovery is restricted to the local machine, whether
//! the default transport may be used when no host is selected, and the name of
//! the last host a connection succeeded to (used for reconnect preference).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Flat settings record for connection behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Automatically discover and connect while disconnected.
    pub auto_connect: bool,
    /// Restrict discovery to hosts on the local machine.
    pub local_only: bool,
    /// Allow connecting over the default transport when no host is selected.
    pub connect_default_transport: bool,
    /// Name of the last host a connection succeeded to.
    pub last_connected_host: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            local_only: true,
            connect_default_transport: false,
            last_connected_host: String::new(),
        }
    }
}

impl ConnectionSettings {
    /// Loads settings from `path`, creating the file with defaults when it
    /// does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, SessionError> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            return Ok(settings);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes the settings to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Records the last successfully connected host name.
    ///
    /// mDNS-discovered names may carry a `.localdomain` suffix that is not
    /// stable across announcements; it is stripped before storing.
    pub fn set_last_connected_host(&mut self, name: &str) {
        self.last_connected_host = name.replace(".localdomain", "");
    }
}

/// Settings store bound to a file path.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: ConnectionSettings,
}

impl SettingsStore {
    /// Opens the store, loading from disk or seeding defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let settings = ConnectionSettings::load_or_default(&path)?;
        Ok(Self { path, settings })
    }

    /// An in-memory store that never touches disk. Used when the embedding
    /// application manages persistence itself.
    pub fn ephemeral(settings: ConnectionSettings) -> Self {
        Self {
            path: PathBuf::new(),
            settings,
        }
    }

    /// Current settings snapshot.
    pub fn get(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Applies a mutation and persists the result (when backed by a file).
    pub fn update(
        &mut self,
        f: impl FnOnce(&mut ConnectionSettings),
    ) -> Result<(), SessionError> {
        f(&mut self.settings);
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        self.settings.save(&self.path)
    }
}
