// ABOUTME: Validated site identifier.
// ABOUTME: Domain-like names that are safe to embed in file names and shell words.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiteNameError {
    #[error("site name cannot be empty")]
    Empty,

    #[error("site name exceeds maximum length of 253 characters")]
    TooLong,

    #[error("site name cannot start with '{0}'")]
    BadStart(char),

    #[error("invalid character in site name: '{0}'")]
    InvalidChar(char),
}

/// Identifier of one deployable site, usually its domain (`app.example.com`).
///
/// The name ends up in backup archive names and log lines, so it is limited
/// to ASCII alphanumerics plus `.`, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteName(String);

impl SiteName {
    pub fn new(value: &str) -> Result<Self, SiteNameError> {
        if value.is_empty() {
            return Err(SiteNameError::Empty);
        }

        if value.len() > 253 {
            return Err(SiteNameError::TooLong);
        }

        if let Some(first) = value.chars().next()
            && (first == '.' || first == '-')
        {
            return Err(SiteNameError::BadStart(first));
        }

        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-') {
                return Err(SiteNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for SiteName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_domain_names() {
        for name in ["app.writeable.cl", "example.com", "my_site-2", "A1"] {
            assert!(SiteName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_path_separators() {
        assert_eq!(
            SiteName::new("../etc").unwrap_err(),
            SiteNameError::BadStart('.')
        );
        assert_eq!(
            SiteName::new("a/b").unwrap_err(),
            SiteNameError::InvalidChar('/')
        );
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert_eq!(
            SiteName::new("site;rm").unwrap_err(),
            SiteNameError::InvalidChar(';')
        );
        assert_eq!(
            SiteName::new("my site").unwrap_err(),
            SiteNameError::InvalidChar(' ')
        );
    }

    #[test]
    fn rejects_empty_and_leading_hyphen() {
        assert_eq!(SiteName::new("").unwrap_err(), SiteNameError::Empty);
        assert_eq!(
            SiteName::new("-site").unwrap_err(),
            SiteNameError::BadStart('-')
        );
    }
}
