//! Persisted application settings

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current settings version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Maximum number of entries kept in the recent files list
pub const MAX_RECENT_FILES: usize = 5;

/// Default port of the local server
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Persisted settings for the application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    /// Most-recent-first list of project files opened from this machine
    #[serde(default)]
    pub recent_files: Vec<PathBuf>,
    #[serde(default)]
    pub general: GeneralSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub cloud: CloudSection,
    #[serde(default)]
    pub ui: UiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSection {
    /// Directory proposed for new projects
    pub projects_path: PathBuf,
}

impl Default for GeneralSection {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self {
            projects_path: home.join("netlab").join("projects"),
        }
    }
}

/// Local server endpoint and launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Path to the local server executable, if one is installed
    pub path: Option<PathBuf>,
    /// Start the local server automatically when none is reachable
    pub auto_start: bool,
    /// Timeout for a single TCP connection attempt in seconds
    pub connect_timeout_secs: u64,
    /// Overall bound on waiting for a freshly started server in seconds
    pub wait_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_SERVER_PORT,
            path: None,
            auto_start: true,
            connect_timeout_secs: 5,
            wait_timeout_secs: 30,
        }
    }
}

/// Cloud provider credentials and defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudSection {
    pub api_user: String,
    pub api_key: String,
    pub region: String,
    pub default_flavor: String,
    pub default_image: String,
}

/// Opaque window layout blobs owned by the window layer
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiSection {
    /// Base64-encoded window geometry
    pub geometry: Option<String>,
    /// Base64-encoded dock/toolbar state
    pub state: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            recent_files: Vec::new(),
            general: GeneralSection::default(),
            server: ServerSection::default(),
            cloud: CloudSection::default(),
            ui: UiSection::default(),
        }
    }
}

impl Settings {
    /// Get the default settings file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("netlab")
            .join("settings.toml")
    }

    /// Load settings from file, or create default if not exists
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            let settings = Self::default();
            settings.save()?;
            Ok(settings)
        }
    }

    /// Load settings from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;

        // Version migration would go here
        if settings.version != SETTINGS_VERSION {
            // For now, just use as-is; future versions would migrate
        }

        Ok(settings)
    }

    /// Save settings to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::validation("Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::validation("Server port must be greater than 0"));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(Error::validation("Connect timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// Record a project file as most recently used.
    ///
    /// The path moves to the front of the list, duplicates are removed and
    /// the list is capped at [`MAX_RECENT_FILES`] entries.
    pub fn add_recent_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.recent_files.retain(|p| *p != path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    /// Update the cloud settings, persisting them to disk only when asked.
    ///
    /// The in-memory copy always takes the new values; when `persist` is
    /// false the file keeps default (empty) cloud credentials.
    pub fn set_cloud(&mut self, new_cloud: CloudSection, persist: bool) -> Result<()> {
        self.cloud = new_cloud;
        self.save_to_with_cloud(&Self::default_path(), persist)
    }

    /// Write settings to `path`, withholding cloud credentials unless
    /// `persist_cloud` is set.
    pub fn save_to_with_cloud(&self, path: &Path, persist_cloud: bool) -> Result<()> {
        if persist_cloud {
            self.save_to(path)
        } else {
            let mut on_disk = self.clone();
            on_disk.cloud = CloudSection::default();
            on_disk.save_to(path)
        }
    }

    /// Store the window geometry blob
    pub fn set_geometry(&mut self, blob: &[u8]) {
        self.ui.geometry = Some(BASE64.encode(blob));
    }

    /// Retrieve the window geometry blob, if any
    pub fn geometry(&self) -> Option<Vec<u8>> {
        self.ui
            .geometry
            .as_ref()
            .and_then(|encoded| BASE64.decode(encoded).ok())
    }

    /// Store the window state blob
    pub fn set_window_state(&mut self, blob: &[u8]) {
        self.ui.state = Some(BASE64.encode(blob));
    }

    /// Retrieve the window state blob, if any
    pub fn window_state(&self) -> Option<Vec<u8>> {
        self.ui
            .state
            .as_ref()
            .and_then(|encoded| BASE64.decode(encoded).ok())
    }
}
