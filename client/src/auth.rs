//! Storage for the chat authentication token.

use std::{fs, path::PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use war_api::prelude::*;

use crate::error::{ClientError, Result};

pub trait TokenStore: Send + Sync {
    /// The stored token, if one is present and non-empty.
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// A token kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.lock().clone().filter(|t| !t.is_empty())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock() = None;
        Ok(())
    }
}

/// A JSON key/value file shared with other local settings. Only the token
/// key is touched.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/meme-war/storage.json`.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| ClientError::Storage("no config directory".to_string()))?;
        Ok(Self::new(dir.join("meme-war").join("storage.json")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(storage(e)),
        };
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(ClientError::Storage(format!("{} is not a JSON object", self.path.display()))),
        }
    }

    fn write(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        let raw = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, raw).map_err(storage)
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        match self.read() {
            Ok(map) => map
                .get(AUTH_TOKEN_KEY)
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            Err(e) => {
                tracing::warn!("Could not read auth token: {}", e);
                None
            }
        }
    }

    fn set_token(&self, token: &str) -> Result<()> {
        let mut map = self.read()?;
        map.insert(AUTH_TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write(&map)
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.read()?;
        if map.remove(AUTH_TOKEN_KEY).is_some() {
            self.write(&map)?;
        }
        Ok(())
    }
}

fn storage(e: std::io::Error) -> ClientError {
    ClientError::Storage(e.to_string())
}
