//! Metric record model
//!
//! A [`MetricRecord`] is the canonical representation of one sample on the
//! wire, in the snapshot file and in storage listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Wire name of gauge metrics
pub const GAUGE: &str = "gauge";
/// Wire name of counter metrics
pub const COUNTER: &str = "counter";

/// Gauge vs. counter semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Overwritten on every update
    Gauge,
    /// Running sum of every delta ever applied
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => GAUGE,
            MetricKind::Counter => COUNTER,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            GAUGE => Ok(MetricKind::Gauge),
            COUNTER => Ok(MetricKind::Counter),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// One metric sample
///
/// Exactly one of `value` / `delta` is populated, selected by `kind`. Both
/// are optional on the wire so that a gauge of `0.0` stays distinguishable
/// from a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Transport unit of the batch endpoint. Duplicate ids are allowed.
pub type MetricBatch = Vec<MetricRecord>;

impl MetricRecord {
    /// Create a gauge record
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            value: Some(value),
            delta: None,
            hash: None,
        }
    }

    /// Create a counter record
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            value: None,
            delta: Some(delta),
            hash: None,
        }
    }

    /// Parse a record from the textual `kind` / `value` pair used by the
    /// path-encoded update endpoint.
    pub fn parse(kind: &str, id: &str, raw_value: &str) -> Result<Self, ValidationError> {
        let kind: MetricKind = kind.parse()?;
        if id.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let invalid = || ValidationError::InvalidValue {
            kind: kind.to_string(),
            value: raw_value.to_string(),
        };
        match kind {
            MetricKind::Gauge => {
                let value: f64 = raw_value.parse().map_err(|_| invalid())?;
                Ok(Self::gauge(id, value))
            }
            MetricKind::Counter => {
                let delta: i64 = raw_value.parse().map_err(|_| invalid())?;
                Ok(Self::counter(id, delta))
            }
        }
    }

    /// Check that a decoded record honours the one-payload-per-kind invariant
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let present = match self.kind {
            MetricKind::Gauge => self.value.is_some(),
            MetricKind::Counter => self.delta.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(ValidationError::MissingValue {
                id: self.id.clone(),
                kind: self.kind.to_string(),
            })
        }
    }

    /// Render the payload the way the plain-text endpoints print it
    pub fn display_value(&self) -> Option<String> {
        match self.kind {
            MetricKind::Gauge => self.value.map(format_gauge),
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
        }
    }
}

/// Shortest round-trippable rendering of a gauge value (`12.5`, `3`, `1e-7`)
pub fn format_gauge(value: f64) -> String {
    format!("{}", value)
}

/// Request body of the JSON value-read endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_zero_is_serialized() {
        let json = serde_json::to_string(&MetricRecord::gauge("cpu", 0.0)).unwrap();
        assert_eq!(json, r#"{"id":"cpu","type":"gauge","value":0.0}"#);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let json = serde_json::to_string(&MetricRecord::counter("PollCount", 5)).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":5}"#);
    }

    #[test]
    fn test_decode_without_value() {
        let record: MetricRecord = serde_json::from_str(r#"{"id":"x","type":"gauge"}"#).unwrap();
        assert_eq!(record.value, None);
        assert!(matches!(
            record.validate(),
            Err(ValidationError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(serde_json::from_str::<MetricRecord>(r#"{"id":"x","type":"histogram"}"#).is_err());
        assert_eq!(
            "histogram".parse::<MetricKind>(),
            Err(ValidationError::UnknownKind("histogram".into()))
        );
    }

    #[test]
    fn test_parse_path_values() {
        assert_eq!(
            MetricRecord::parse("gauge", "cpu", "45.5").unwrap(),
            MetricRecord::gauge("cpu", 45.5)
        );
        assert_eq!(
            MetricRecord::parse("counter", "hits", "7").unwrap(),
            MetricRecord::counter("hits", 7)
        );
        assert!(matches!(
            MetricRecord::parse("counter", "hits", "7.5"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert_eq!(
            MetricRecord::parse("gauge", "", "1"),
            Err(ValidationError::EmptyName)
        );
    }

    #[test]
    fn test_display_value() {
        assert_eq!(MetricRecord::gauge("a", 78.2).display_value().as_deref(), Some("78.2"));
        assert_eq!(MetricRecord::gauge("a", 3.0).display_value().as_deref(), Some("3"));
        assert_eq!(MetricRecord::counter("b", -4).display_value().as_deref(), Some("-4"));
    }
}
