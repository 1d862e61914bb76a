use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Version attached to a module, ordered component-wise.
///
/// Accepts one to four numeric components (`2`, `1.4`, `1.4.0`, `1.4.0.17`);
/// missing components count as zero. A leading `v` and any pre-release or
/// build-metadata suffix (`-rc.1`, `+sha`) are ignored for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleVersion {
    major: u64,
    minor: u64,
    patch: u64,
    build: u64,
}

impl ModuleVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
        }
    }

    pub const fn with_build(mut self, build: u64) -> Self {
        self.build = build;
        self
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn build(&self) -> u64 {
        self.build
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build != 0 {
            write!(f, ".{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidVersion {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        // Strip pre-release / metadata suffix: "1.2.0-rc.1" -> "1.2.0"
        let core = trimmed.split(['-', '+']).next().unwrap_or_default();
        if core.is_empty() {
            return Err(invalid("empty version"));
        }

        let mut parts = [0u64; 4];
        let mut count = 0;
        for component in core.split('.') {
            if count == parts.len() {
                return Err(invalid("more than four components"));
            }
            if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("components must be non-negative integers"));
            }
            parts[count] = component
                .parse()
                .map_err(|_| invalid("component out of range"))?;
            count += 1;
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            build: parts[3],
        })
    }
}

impl TryFrom<String> for ModuleVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleVersion> for String {
    fn from(version: ModuleVersion) -> Self {
        version.to_string()
    }
}
