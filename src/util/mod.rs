//! Utilities. OBVIOUSLY.

use chrono::{DateTime, TimeZone, Utc};
use serde_derive::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;

pub(crate) mod ser;

pub use url::Url;

/// A library-local representation of a time.
///
/// We want to do the Right Thing when serializing (RFC3339 when a human is
/// looking, milliseconds since the epoch otherwise), and the millisecond
/// precision matters: timestamps are signed into statements, so whatever we
/// sign has to survive a trip through serialization untouched.
///
/// Any place that takes a `Timestamp` will receive any value that can be
/// converted into a `Timestamp` via `From/Into` and you can always get the
/// underlying type via a `&timestamp` deref.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(#[serde(with = "crate::util::ser::timestamp")] DateTime<Utc>);

impl Timestamp {
    /// Create a new Timestamp from the current date/time.
    pub fn now() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    /// Create a timestamp from milliseconds since the unix epoch. Values
    /// outside of chrono's range clamp to the epoch.
    pub fn from_millis(millis: i64) -> Self {
        let datetime = Utc.timestamp_millis_opt(millis).single().unwrap_or_default();
        Self(datetime)
    }

    /// Milliseconds since the unix epoch.
    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Deref for Timestamp {
    type Target = DateTime<Utc>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(date: DateTime<Utc>) -> Self {
        Self::from_millis(date.timestamp_millis())
    }
}

impl FromStr for Timestamp {
    type Err = chrono::format::ParseError;
    fn from_str(s: &str) -> std::result::Result<Timestamp, Self::Err> {
        let datetime: DateTime<Utc> = s.parse()?;
        Ok(Timestamp::from(datetime))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
