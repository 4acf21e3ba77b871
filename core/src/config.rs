use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use crate::error::{PostNotesError, Result};
use crate::host::{default_content_types, ContentRegistry, ContentType, ATTACHMENT_TYPE};
use crate::sanitize::{sanitize, sanitize_line};
use crate::store::SharedStore;

/// Option name the settings object is persisted under
pub const SETTINGS_OPTION: &str = "spnotes_settings";

/// Label used when none is configured
pub const DEFAULT_LABEL: &str = "Notes";

/// Content types with notes enabled when none are configured
pub const DEFAULT_TYPES: [&str; 2] = ["post", "page"];

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7856";

/// Plugin-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Content types that may carry notes, in configured order, no duplicates
    #[serde(rename = "post_types")]
    pub enabled_types: Vec<String>,
    /// Display label of the note field, stored raw
    #[serde(rename = "notes_label")]
    pub label: String,
    /// Hint text shown inside an empty note field, stored raw
    #[serde(rename = "notes_placeholder")]
    pub placeholder: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled_types: DEFAULT_TYPES.iter().map(|t| t.to_string()).collect(),
            label: DEFAULT_LABEL.to_string(),
            placeholder: String::new(),
        }
    }
}

impl Settings {
    /// Reads persisted settings, applying defaults to every missing or empty field.
    /// Malformed fields count as missing.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(value) => Self::coerce(value).with_defaults(),
            None => Settings::default(),
        }
    }

    /// Coerces an untyped settings object field by field without applying defaults
    pub fn coerce(value: &Value) -> Self {
        let enabled_types = match value.get("post_types") {
            Some(Value::Array(items)) => {
                let mut types: Vec<String> = Vec::with_capacity(items.len());
                for name in items.iter().filter_map(coerce_string) {
                    if !name.is_empty() && !types.contains(&name) {
                        types.push(name);
                    }
                }
                types
            }
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                tracing::warn!("Ignoring malformed post_types setting: {}", other);
                Vec::new()
            }
        };

        Settings {
            enabled_types,
            label: value.get("notes_label").and_then(coerce_string).unwrap_or_default(),
            placeholder: value
                .get("notes_placeholder")
                .and_then(coerce_string)
                .unwrap_or_default(),
        }
    }

    /// Fills empty fields with their defaults
    pub fn with_defaults(mut self) -> Self {
        if self.enabled_types.is_empty() {
            self.enabled_types = DEFAULT_TYPES.iter().map(|t| t.to_string()).collect();
        }
        if self.label.is_empty() {
            self.label = DEFAULT_LABEL.to_string();
        }
        self
    }

    /// The persisted shape of these settings
    pub fn to_value(&self) -> Value {
        json!({
            "post_types": self.enabled_types,
            "notes_label": self.label,
            "notes_placeholder": self.placeholder,
        })
    }

    /// Whether notes are enabled for a content type
    pub fn is_enabled(&self, content_type: &str) -> bool {
        self.enabled_types.iter().any(|t| t == content_type)
    }

    /// Label as plain single-line text
    pub fn display_label(&self) -> String {
        sanitize_line(&self.label)
    }

    /// Placeholder as plain text
    pub fn display_placeholder(&self) -> String {
        sanitize(&self.placeholder)
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Loads and saves [`Settings`]. Create one per request: the first `load`
/// reads the store, later loads return the cached value.
pub struct ConfigStore {
    store: SharedStore,
    cache: OnceCell<Settings>,
}

impl ConfigStore {
    pub fn new(store: SharedStore) -> Self {
        ConfigStore {
            store,
            cache: OnceCell::new(),
        }
    }

    /// Returns the settings, reading the store only on the first call
    pub fn load(&self) -> Result<Settings> {
        let settings = self.cache.get_or_try_init(|| {
            let raw = self.store.get_option(SETTINGS_OPTION)?;
            Ok::<_, PostNotesError>(Settings::from_value(raw.as_ref()))
        })?;
        Ok(settings.clone())
    }

    /// Persists the candidate as given and refreshes the cached view
    pub fn save(&mut self, candidate: &Settings) -> Result<()> {
        let value = candidate.to_value();
        self.store.set_option(SETTINGS_OPTION, &value)?;
        self.cache = OnceCell::with_value(Settings::from_value(Some(&value)));

        tracing::info!(
            "Saved settings: {} enabled type(s)",
            candidate.enabled_types.len()
        );
        Ok(())
    }

    /// Installs the default settings unless settings already exist.
    /// Returns whether anything was written.
    pub fn activate(&mut self) -> Result<bool> {
        if self.store.get_option(SETTINGS_OPTION)?.is_some() {
            return Ok(false);
        }

        self.store
            .set_option(SETTINGS_OPTION, &Settings::default().to_value())?;
        self.cache = OnceCell::new();
        tracing::info!("Installed default settings");
        Ok(true)
    }

    /// Removes the persisted settings
    pub fn uninstall(&mut self) -> Result<()> {
        self.store.delete_option(SETTINGS_OPTION)?;
        self.cache = OnceCell::new();
        tracing::info!("Removed settings");
        Ok(())
    }
}

/// A content type as offered on the settings screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeChoice {
    #[serde(flatten)]
    pub content_type: ContentType,
    pub selected: bool,
}

/// Public content types except attachments, marked when notes are enabled for them
pub fn content_type_choices(
    registry: &dyn ContentRegistry,
    settings: &Settings,
) -> Vec<ContentTypeChoice> {
    registry
        .content_types()
        .into_iter()
        .filter(|t| t.public && t.name != ATTACHMENT_TYPE)
        .map(|content_type| ContentTypeChoice {
            selected: settings.is_enabled(&content_type.name),
            content_type,
        })
        .collect()
}

/// Configuration of the standalone server process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the IPC listener binds to
    pub listen_addr: String,
    /// JSON file holding notes and settings
    pub store_path: PathBuf,
    /// Key used to sign edit tokens
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// Content types reported by the registry
    pub content_types: Vec<ContentType>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        ServerConfig {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            store_path: data_dir.join("postnotes").join("store.json"),
            secret: None,
            content_types: default_content_types(),
        }
    }
}

impl ServerConfig {
    /// Loads `server.json` from the user config directory (if present) and
    /// applies environment overrides
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            PostNotesError::Config("Could not determine config directory".to_string())
        })?;

        let mut config = Self::load_from_file(&config_dir.join("postnotes").join("server.json"))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads a config file, falling back to defaults when it does not exist
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Server config not found at {:?}, using defaults", path);
            return Ok(ServerConfig::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)
            .map_err(|e| PostNotesError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded server config from {:?}", path);
        Ok(config)
    }

    /// Applies `POSTNOTES_ADDR`, `POSTNOTES_STORE` and `POSTNOTES_SECRET`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("POSTNOTES_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(path) = lookup("POSTNOTES_STORE") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("POSTNOTES_SECRET") {
            self.secret = Some(secret);
        }
    }

    /// The token secret; required to serve requests
    pub fn secret(&self) -> Result<&str> {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(PostNotesError::Config(
                "POSTNOTES_SECRET is not set".to_string(),
            )),
        }
    }
}
