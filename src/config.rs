//! Configuration system for the Area RandR property server
//!
//! Loads configuration from TOML file at `~/.config/area-randr/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::property::{Format, PropertyFlags, PropertyValue};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub extension: ExtensionConfig,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            extension: ExtensionConfig::default(),
            outputs: vec![OutputConfig::default()],
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config = Self::from_toml_str(&content)?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area-randr");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = Self::default();
        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for output in &self.outputs {
            if output.id == 0 {
                bail!("Output {:?} needs a nonzero id", output.name);
            }
            if output.root == 0 {
                bail!("Output {:?} needs a nonzero root window", output.name);
            }
            if output.windows.iter().any(|w| w.id == 0 || w.id == output.root) {
                bail!("Output {:?}: window ids must be nonzero and not the root", output.name);
            }
            for property in &output.properties {
                Format::try_from(property.format).map_err(|_| {
                    anyhow::anyhow!(
                        "Property {:?} on {:?}: format must be 8, 16 or 32",
                        property.name,
                        output.name
                    )
                })?;
                if property.range && property.valid_values.len() % 2 != 0 {
                    bail!(
                        "Property {:?} on {:?}: range needs (min, max) pairs",
                        property.name,
                        output.name
                    );
                }
            }
        }
        Ok(())
    }
}

/// Socket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening socket; defaults to `$XDG_RUNTIME_DIR/area-randr.sock`
    pub socket_path: Option<PathBuf>,
    /// Largest request accepted, in bytes
    pub max_request_length: u32,
    /// How often staged property values are committed, in milliseconds
    #[serde(default = "default_commit_interval")]
    pub commit_interval_ms: u64,
}

fn default_commit_interval() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_request_length: 256 * 1024,
            commit_interval_ms: default_commit_interval(),
        }
    }
}

/// Opcode and event/error bases advertised for the extension
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            major_opcode: 140,
            first_event: 89,
            first_error: 147,
        }
    }
}

/// One output and the properties seeded on it at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub id: u32,
    pub name: String,
    /// Root window of the output's screen
    pub root: u32,
    #[serde(default)]
    pub leased: bool,
    /// Refuse modifying access (get-with-delete)
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
    /// Windows below the root that receive notifications, parents first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub windows: Vec<WindowConfig>,
}

/// A window in an output's screen tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    pub id: u32,
    /// Defaults to the output's root window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            id: 0x42,
            name: "eDP-1".into(),
            root: 0x100,
            leased: false,
            read_only: false,
            properties: vec![
                PropertyConfig {
                    name: crate::atoms::NON_DESKTOP.into(),
                    type_: "INTEGER".into(),
                    format: 32,
                    values: vec![0],
                    text: None,
                    pending: false,
                    range: true,
                    immutable: true,
                    valid_values: vec![0, 1],
                },
                PropertyConfig {
                    name: "Backlight".into(),
                    type_: "INTEGER".into(),
                    format: 32,
                    values: vec![50],
                    text: None,
                    pending: true,
                    range: true,
                    immutable: false,
                    valid_values: vec![0, 100],
                },
            ],
            windows: Vec::new(),
        }
    }
}

/// A property created before any client connects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    /// Type atom name, e.g. "INTEGER" or "ATOM"
    #[serde(rename = "type")]
    pub type_: String,
    pub format: u8,
    #[serde(default)]
    pub values: Vec<i64>,
    /// 8-bit string value; takes precedence over `values`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub range: bool,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default)]
    pub valid_values: Vec<i32>,
}

impl PropertyConfig {
    pub fn flags(&self) -> PropertyFlags {
        PropertyFlags::from_bools(self.pending, self.range, self.immutable)
    }

    /// Encode the configured elements in host byte order
    pub fn value(&self, type_: u32) -> Result<PropertyValue> {
        let format = Format::try_from(self.format)
            .map_err(|_| anyhow::anyhow!("Invalid format {} for {:?}", self.format, self.name))?;

        let data = match (&self.text, format) {
            (Some(text), Format::Card8) => text.as_bytes().to_vec(),
            (Some(_), _) => bail!("Text property {:?} must use format 8", self.name),
            // Values wrap to the element width, so -1 fills it with ones
            (None, Format::Card8) => self.values.iter().map(|&v| v as u8).collect(),
            (None, Format::Card16) => {
                let elements: Vec<u16> = self.values.iter().map(|&v| v as u16).collect();
                bytemuck::cast_slice(&elements).to_vec()
            }
            (None, Format::Card32) => {
                let elements: Vec<u32> = self.values.iter().map(|&v| v as u32).collect();
                bytemuck::cast_slice(&elements).to_vec()
            }
        };

        PropertyValue::new(type_, format, data)
            .with_context(|| format!("Invalid value for property {:?}", self.name))
    }
}
