use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::version::ModuleVersion;

/// Unique identifier of a configured worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CoreError::InvalidWorkerId {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Name of a module, compared and hashed case-insensitively.
///
/// The original spelling is kept for display and for file lookups.
#[derive(Debug, Clone)]
pub struct ModuleName {
    name: String,
    key: String,
}

impl ModuleName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = name.to_lowercase();
        Self { name, key }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Lower-cased form used for equality and hashing.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for ModuleName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ModuleName {}

impl Hash for ModuleName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModuleName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A module reference: a name plus the minimum version the caller accepts.
///
/// String form is `name` or `name@version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub name: ModuleName,
    pub version: Option<ModuleVersion>,
}

impl ModuleRef {
    pub fn new(name: impl Into<ModuleName>, version: Option<ModuleVersion>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for ModuleRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name.trim(), Some(version.parse()?)),
            None => (s.trim(), None),
        };
        if name.is_empty() {
            return Err(CoreError::Config(format!("empty module name in '{s}'")));
        }
        Ok(Self::new(name, version))
    }
}
