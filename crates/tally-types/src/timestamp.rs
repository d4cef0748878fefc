use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Time at which a receipt was emitted.
///
/// The ledger accepts both an ISO-8601 string and numeric UNIX seconds; both
/// compare by the instant they resolve to. A timestamp that does not resolve
/// (empty, garbled) sorts before every real instant, so callers filtering by
/// "older than" see it and callers filtering by "since" do not.
///
/// Either form is kept exactly as read, so a line written back serializes
/// to the same bytes (and the same Merkle leaf) it was read from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Seconds since the UNIX epoch, integral or fractional.
    Unix(Number),
    /// ISO-8601 / RFC 3339 string.
    Iso(String),
}

impl Timestamp {
    /// The current wall-clock time, rendered as UTC ISO-8601 with
    /// microseconds and a `Z` suffix.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Iso(at.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    /// Midnight UTC of the given `YYYY-MM-DD` day.
    pub fn start_of_day(day: &str) -> Self {
        Self::Iso(format!("{day}T00:00:00Z"))
    }

    /// Resolve to a UTC instant, if possible.
    ///
    /// Strings without an offset are taken to be UTC.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unix(secs) => match secs.as_i64() {
                Some(whole) => DateTime::from_timestamp(whole, 0),
                None => secs.as_f64().and_then(from_fractional_secs),
            },
            Self::Iso(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                }),
        }
    }

    /// `true` if this timestamp is strictly earlier than `cutoff`.
    pub fn precedes(&self, cutoff: &DateTime<Utc>) -> bool {
        match self.instant() {
            Some(at) => at < *cutoff,
            None => true,
        }
    }

    /// `true` if this timestamp is at or after `since`.
    pub fn is_at_or_after(&self, since: &DateTime<Utc>) -> bool {
        self.instant().is_some_and(|at| at >= *since)
    }

    /// UTC calendar day as `YYYY-MM-DD`.
    pub fn day(&self) -> Option<String> {
        self.instant().map(|at| at.format("%Y-%m-%d").to_string())
    }
}

fn from_fractional_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::Iso(String::new())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(secs) => write!(f, "{secs}"),
            Self::Iso(s) => f.write_str(s),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_datetime(at)
    }
}
