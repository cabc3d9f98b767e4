//! Query time bounds
//!
//! A bound is either open (`-` for the earliest sample, `+` for the latest)
//! or a Unix-millisecond timestamp. Request parameters may also give an
//! RFC 3339 datetime, which is converted to milliseconds.

use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// One end of a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBound {
    /// Open lower bound (`-`)
    Earliest,
    /// Open upper bound (`+`)
    Latest,
    /// Unix milliseconds
    At(i64),
}

impl TimeBound {
    /// Parse `-`, `+`, integer milliseconds, or an RFC 3339 datetime.
    pub fn parse(s: &str) -> Result<Self, RelayError> {
        let s = s.trim();
        match s {
            "-" => return Ok(TimeBound::Earliest),
            "+" => return Ok(TimeBound::Latest),
            _ => {}
        }
        if let Ok(ms) = s.parse::<i64>() {
            return Ok(TimeBound::At(ms));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| TimeBound::At(dt.timestamp_millis()))
            .map_err(|_| RelayError::InvalidTimeBound(s.to_string()))
    }

    /// Parse an optional request parameter; missing or blank means `default`.
    pub fn parse_or(s: Option<&str>, default: TimeBound) -> Result<Self, RelayError> {
        match s {
            Some(v) if !v.trim().is_empty() => Self::parse(v),
            _ => Ok(default),
        }
    }

    /// Inclusive lower edge in milliseconds.
    pub fn lower_ms(&self) -> i64 {
        match self {
            TimeBound::Earliest => i64::MIN,
            TimeBound::Latest => i64::MAX,
            TimeBound::At(ms) => *ms,
        }
    }

    /// Inclusive upper edge in milliseconds.
    pub fn upper_ms(&self) -> i64 {
        match self {
            TimeBound::Earliest => i64::MIN,
            TimeBound::Latest => i64::MAX,
            TimeBound::At(ms) => *ms,
        }
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Earliest => write!(f, "-"),
            TimeBound::Latest => write!(f, "+"),
            TimeBound::At(ms) => write!(f, "{}", ms),
        }
    }
}

/// Inclusive `[start, end]` query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeBound,
    pub end: TimeBound,
}

impl TimeRange {
    pub fn new(start: TimeBound, end: TimeBound) -> Self {
        Self { start, end }
    }

    /// `[-, +]`: every sample.
    pub fn all() -> Self {
        Self::new(TimeBound::Earliest, TimeBound::Latest)
    }

    /// Build from optional `start`/`end` request parameters.
    pub fn from_params(start: Option<&str>, end: Option<&str>) -> Result<Self, RelayError> {
        Ok(Self {
            start: TimeBound::parse_or(start, TimeBound::Earliest)?,
            end: TimeBound::parse_or(end, TimeBound::Latest)?,
        })
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start.lower_ms() && timestamp <= self.end.upper_ms()
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::all()
    }
}
