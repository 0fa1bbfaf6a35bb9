//! Remembered user preferences
//!
//! The selection machine receives a [`Preferences`] value at construction and
//! writes changes back through an injected [`PreferenceStore`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::domain::Shape;
use crate::error::{CaptureError, Result};

/// Key-value persistence for preferences
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Preferences carried from one selection session to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// Last shape the user picked with the 1/2 keys
    pub shape: Shape,
}

impl Preferences {
    const KEY: &'static str = "capturekit.preferences";

    /// Load preferences, falling back to defaults on any error
    pub fn load(store: &dyn PreferenceStore) -> Self {
        match store.get(Self::KEY) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(prefs) => prefs,
                Err(err) => {
                    log::warn!("Error parsing preferences, using defaults: {}", err);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(err) => {
                log::warn!("Could not read preferences, using defaults: {}", err);
                Self::default()
            }
        }
    }

    /// Save preferences through the store
    pub fn save(&self, store: &dyn PreferenceStore) -> Result<()> {
        let json = serde_json::to_string(self).map_err(|e| CaptureError::Preferences {
            message: e.to_string(),
        })?;
        store.set(Self::KEY, &json)
    }
}

/// In-memory store; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| CaptureError::Preferences {
            message: "memory store poisoned".to_string(),
        })?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| CaptureError::Preferences {
            message: "memory store poisoned".to_string(),
        })?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/capturekit/preferences.json`
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| CaptureError::Preferences {
            message: "no configuration directory on this platform".to_string(),
        })?;
        Ok(Self::new(dir.join("capturekit").join("preferences.json")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&json).map_err(|e| CaptureError::Preferences {
            message: format!("failed to parse {}: {}", self.path.display(), e),
        })
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().map_err(|_| CaptureError::Preferences {
            message: "file store poisoned".to_string(),
        })?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| CaptureError::Preferences {
            message: "file store poisoned".to_string(),
        })?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&values).map_err(|e| CaptureError::Preferences {
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, json)?;
        log::debug!("Saved preference '{}' to {}", key, self.path.display());
        Ok(())
    }
}
