// ABOUTME: Execution-target and permission settings for a site.
// ABOUTME: Parses runner kind, octal chmod modes, and permission-failure severity.

use serde::Deserialize;
use serde::de::{self, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Where a site's commands execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    #[default]
    Local,
    Ssh,
    Docker,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Local => write!(f, "local"),
            RunnerKind::Ssh => write!(f, "ssh"),
            RunnerKind::Docker => write!(f, "docker"),
        }
    }
}

/// A chmod mode in octal notation, e.g. `775` or `2775`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMode(String);

impl FileMode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric permission bits, for comparing against file metadata.
    pub fn bits(&self) -> u32 {
        u32::from_str_radix(&self.0, 8).unwrap_or(0)
    }
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode("775".to_string())
    }
}

impl FromStr for FileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = (3..=4).contains(&s.len()) && s.chars().all(|c| ('0'..='7').contains(&c));
        if valid {
            Ok(FileMode(s.to_string()))
        } else {
            Err(format!("invalid chmod mode '{}': expected 3 or 4 octal digits", s))
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // `775` arrives as an integer from YAML, `"0775"` as a string.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u32),
            Text(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Int(n) => n.to_string(),
            Raw::Text(s) => s,
        };
        text.parse().map_err(de::Error::custom)
    }
}

/// How a failed writable-permission step affects the deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Record a warning and carry on.
    #[default]
    Warn,
    /// Abort the deploy and roll back.
    Fatal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_mode_accepts_octal() {
        assert_eq!("775".parse::<FileMode>().unwrap().bits(), 0o775);
        assert_eq!("2775".parse::<FileMode>().unwrap().bits(), 0o2775);
    }

    #[test]
    fn file_mode_rejects_non_octal() {
        assert!("789".parse::<FileMode>().is_err());
        assert!("77".parse::<FileMode>().is_err());
        assert!("u+rwx".parse::<FileMode>().is_err());
    }

    #[test]
    fn file_mode_from_yaml_integer() {
        let mode: FileMode = serde_yaml::from_str("775").unwrap();
        assert_eq!(mode.as_str(), "775");
    }
}
