// Job timestamps
//
// The backend serializes datetimes either with an offset ("...Z", "+00:00")
// or naive ("2024-01-02T00:00:00.123456"). Naive values are UTC.

use super::error::DomainError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// UTC instant parsed from a backend ISO-8601 string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl FromStr for Timestamp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(at.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| Self(naive.and_utc()))
            .map_err(|_| DomainError::InvalidTimestamp(s.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zulu_and_offset() {
        let z: Timestamp = "2024-01-02T00:00:00Z".parse().unwrap();
        let offset: Timestamp = "2024-01-02T01:00:00+01:00".parse().unwrap();
        assert_eq!(z, offset);
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let naive: Timestamp = "2024-01-02T00:00:00.250000".parse().unwrap();
        let zulu: Timestamp = "2024-01-02T00:00:00.25Z".parse().unwrap();
        assert_eq!(naive, zulu);
    }

    #[test]
    fn test_ordering_follows_instant() {
        let earlier: Timestamp = "2024-01-01T23:59:59Z".parse().unwrap();
        let later: Timestamp = "2024-01-02T00:00:00Z".parse().unwrap();
        assert!(later > earlier);
    }

    #[test]
    fn test_rejects_garbage() {
        let err = "yesterday".parse::<Timestamp>().unwrap_err();
        assert_eq!(err, DomainError::InvalidTimestamp("yesterday".to_string()));
    }

    #[test]
    fn test_serde_uses_rfc3339() {
        let ts: Timestamp = serde_json::from_str("\"2024-01-02T00:00:00\"").unwrap();
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"2024-01-02T00:00:00Z\"");
    }
}
