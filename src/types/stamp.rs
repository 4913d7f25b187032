// ABOUTME: Millisecond timestamp identifiers for releases and backups.
// ABOUTME: Phantom-typed so a release id can never be passed where a backup id is expected.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use thiserror::Error;

/// Rendered layout: `YYYYMMDD_HHMMSS_mmm`.
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
const STAMP_LEN: usize = 19;

pub enum ReleaseMarker {}
pub enum BackupMarker {}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timestamp id '{0}': expected YYYYMMDD_HHMMSS_mmm")]
pub struct ParseStampError(pub String);

/// A UTC timestamp rendered at millisecond resolution.
///
/// The fixed-width rendering sorts lexicographically in creation order, which
/// is what directory listings and archive names rely on. Values are generated
/// with [`Stamp::next_after`], which never hands out a value that is not
/// strictly greater than the newest one already in use.
#[must_use = "ids name on-disk resources and should not be ignored"]
pub struct Stamp<T> {
    at: DateTime<Utc>,
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Stamp<T> {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let at = DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at);
        Self {
            value: at.format(STAMP_FORMAT).to_string(),
            at,
            _marker: PhantomData,
        }
    }

    /// Generate an id for "now" that sorts after `previous`.
    pub fn next_after(previous: Option<&Self>) -> Self {
        Self::next_after_at(Utc::now(), previous)
    }

    /// Same as [`Stamp::next_after`] with an explicit clock reading.
    ///
    /// When the clock has not advanced past `previous` (same millisecond, or
    /// the clock stepped backwards) the result is `previous + 1ms`.
    pub fn next_after_at(now: DateTime<Utc>, previous: Option<&Self>) -> Self {
        let candidate = Self::from_datetime(now);
        match previous {
            Some(prev) if candidate <= *prev => {
                Self::from_datetime(prev.at + chrono::Duration::milliseconds(1))
            }
            _ => candidate,
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParseStampError> {
        let err = || ParseStampError(value.to_string());
        let bytes = value.as_bytes();
        if bytes.len() != STAMP_LEN || bytes[8] != b'_' || bytes[15] != b'_' {
            return Err(err());
        }
        let digits_ok = bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || i == 15 || b.is_ascii_digit());
        if !digits_ok {
            return Err(err());
        }

        let seconds =
            NaiveDateTime::parse_from_str(&value[..15], "%Y%m%d_%H%M%S").map_err(|_| err())?;
        let millis: i64 = value[16..].parse().map_err(|_| err())?;
        Ok(Self::from_datetime(
            seconds.and_utc() + chrono::Duration::milliseconds(millis),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.at
    }
}

impl<T> std::fmt::Debug for Stamp<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Stamp").field(&self.value).finish()
    }
}

impl<T> Clone for Stamp<T> {
    fn clone(&self) -> Self {
        Self {
            at: self.at,
            value: self.value.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Stamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Stamp<T> {}

impl<T> PartialOrd for Stamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Stamp<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Stamp<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Stamp<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Stamp<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

pub type ReleaseId = Stamp<ReleaseMarker>;
pub type BackupId = Stamp<BackupMarker>;
