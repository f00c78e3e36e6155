// ─── server.properties ───
// Flat key=value file written by the server itself. Order is preserved so a
// round trip does not reshuffle the user's file.

use std::path::Path;

use serde::Serialize;

use crate::core::error::{ManagerError, ManagerResult};

pub const PROPERTIES_FILE: &str = "server.properties";

/// A typed property value, inferred from its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl PropertyValue {
    /// `true`/`false` (any case) → bool, optionally-signed digits → int,
    /// anything else → text.
    pub fn infer(raw: &str) -> Self {
        let lowered = raw.to_ascii_lowercase();
        if lowered == "true" || lowered == "false" {
            return PropertyValue::Bool(lowered == "true");
        }
        if is_integer(raw) {
            if let Ok(value) = raw.parse::<i64>() {
                return PropertyValue::Int(value);
            }
        }
        PropertyValue::Text(raw.to_string())
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(value) => write!(f, "{}", value),
            PropertyValue::Int(value) => write!(f, "{}", value),
            PropertyValue::Text(value) => write!(f, "{}", value),
        }
    }
}

fn is_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Ordered contents of a `server.properties` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerProperties {
    entries: Vec<(String, PropertyValue)>,
}

impl ServerProperties {
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!("Skipping malformed property line: {}", line);
                continue;
            };
            entries.push((key.trim().to_string(), PropertyValue::infer(value.trim())));
        }
        Self { entries }
    }

    /// Load `server.properties` from `server_dir`.
    pub fn load(server_dir: &Path) -> ManagerResult<Self> {
        let path = server_dir.join(PROPERTIES_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|source| ManagerError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self::parse(&raw))
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect()
    }

    pub fn save(&self, server_dir: &Path) -> ManagerResult<()> {
        let path = server_dir.join(PROPERTIES_FILE);
        std::fs::write(&path, self.render()).map_err(|source| ManagerError::Io { path, source })
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace an existing key's value, keeping its type.
    pub fn set_from_str(&mut self, key: &str, raw: &str) -> ManagerResult<()> {
        let raw = raw.trim();
        let slot = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
            .ok_or_else(|| ManagerError::PropertyNotFound(key.to_string()))?;

        *slot = match &*slot {
            PropertyValue::Bool(_) => match raw.to_ascii_lowercase().as_str() {
                "true" => PropertyValue::Bool(true),
                "false" => PropertyValue::Bool(false),
                _ => {
                    return Err(ManagerError::InvalidPropertyValue {
                        key: key.to_string(),
                        expected: "boolean",
                    })
                }
            },
            PropertyValue::Int(_) => {
                let parsed = is_integer(raw).then(|| raw.parse::<i64>().ok()).flatten();
                match parsed {
                    Some(value) => PropertyValue::Int(value),
                    None => {
                        return Err(ManagerError::InvalidPropertyValue {
                            key: key.to_string(),
                            expected: "integer",
                        })
                    }
                }
            }
            PropertyValue::Text(_) => PropertyValue::Text(raw.to_string()),
        };
        Ok(())
    }
}
