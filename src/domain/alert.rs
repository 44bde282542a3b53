//! Alert Types
//!
//! A [`RawAlert`] is the vendor-shaped payload as received at the boundary.
//! Drivers turn it into a [`ParsedAlert`] draft, and the only way to obtain a
//! [`CanonicalAlertModel`] is to validate that draft.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field carrying the storage system reference in a raw alert
pub const STORAGE_ID_KEY: &str = "storage_id";
/// Enrichment field: descriptor name
pub const STORAGE_NAME_KEY: &str = "storage_name";
/// Enrichment field: descriptor vendor
pub const VENDOR_KEY: &str = "vendor";
/// Enrichment field: descriptor model
pub const MODEL_KEY: &str = "model";

// =============================================================================
// Raw Alert
// =============================================================================

/// A primitive value in a raw alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AlertValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertValue::Bool(v) => write!(f, "{}", v),
            AlertValue::Integer(v) => write!(f, "{}", v),
            AlertValue::Float(v) => write!(f, "{}", v),
            AlertValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for AlertValue {
    fn from(s: &str) -> Self {
        AlertValue::Text(s.to_string())
    }
}

impl From<String> for AlertValue {
    fn from(s: String) -> Self {
        AlertValue::Text(s)
    }
}

impl From<i64> for AlertValue {
    fn from(v: i64) -> Self {
        AlertValue::Integer(v)
    }
}

impl From<bool> for AlertValue {
    fn from(v: bool) -> Self {
        AlertValue::Bool(v)
    }
}

/// Untyped, flat vendor alert payload (trap variables or webhook body)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAlert {
    fields: BTreeMap<String, AlertValue>,
}

impl RawAlert {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AlertValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, overwriting any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AlertValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AlertValue> {
        self.fields.get(key)
    }

    /// Any primitive field rendered as text
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|v| v.to_string())
    }

    /// The referenced storage system, if present and non-blank
    pub fn storage_id(&self) -> Option<String> {
        self.text(STORAGE_ID_KEY)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AlertValue)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<AlertValue>> FromIterator<(K, V)> for RawAlert {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Canonical alert severity; vendor severities map onto this set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    Major,
    Minor,
    Warning,
    Informational,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Critical => write!(f, "Critical"),
            AlertSeverity::Major => write!(f, "Major"),
            AlertSeverity::Minor => write!(f, "Minor"),
            AlertSeverity::Warning => write!(f, "Warning"),
            AlertSeverity::Informational => write!(f, "Informational"),
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(AlertSeverity::Critical),
            "major" => Ok(AlertSeverity::Major),
            "minor" => Ok(AlertSeverity::Minor),
            "warning" => Ok(AlertSeverity::Warning),
            "informational" | "info" => Ok(AlertSeverity::Informational),
            other => Err(Error::InvalidResults(format!("Unknown severity: {}", other))),
        }
    }
}

// =============================================================================
// Driver Output
// =============================================================================

/// What a driver extracted from a raw alert; anything may still be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAlert {
    pub me_dn: Option<String>,
    pub me_name: Option<String>,
    pub manufacturer: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub probable_cause: Option<String>,
    pub me_category: Option<String>,
    pub native_me_dn: Option<String>,
    pub alarm_id: Option<String>,
    pub alarm_name: Option<String>,
    pub occur_time: Option<DateTime<Utc>>,
}

impl ParsedAlert {
    /// Names of every required field that is absent or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let text_fields: [(&'static str, &Option<String>); 10] = [
            ("me_dn", &self.me_dn),
            ("me_name", &self.me_name),
            ("manufacturer", &self.manufacturer),
            ("location", &self.location),
            ("event_type", &self.event_type),
            ("probable_cause", &self.probable_cause),
            ("me_category", &self.me_category),
            ("native_me_dn", &self.native_me_dn),
            ("alarm_id", &self.alarm_id),
            ("alarm_name", &self.alarm_name),
        ];

        let mut missing: Vec<&'static str> = text_fields
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        if self.severity.is_none() {
            missing.push("severity");
        }
        if self.occur_time.is_none() {
            missing.push("occur_time");
        }
        missing
    }

    /// Validate the draft into a canonical model
    pub fn into_canonical(self) -> Result<CanonicalAlertModel> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(Error::InvalidResults(format!(
                "Failed to fill the alert model from driver: missing {}",
                missing.join(", ")
            )));
        }

        // Every field was checked above
        let take = |v: Option<String>| v.unwrap_or_default();
        Ok(CanonicalAlertModel {
            me_dn: take(self.me_dn),
            me_name: take(self.me_name),
            manufacturer: take(self.manufacturer),
            location: take(self.location),
            event_type: take(self.event_type),
            severity: self.severity.unwrap_or(AlertSeverity::Informational),
            probable_cause: take(self.probable_cause),
            me_category: take(self.me_category),
            native_me_dn: take(self.native_me_dn),
            alarm_id: take(self.alarm_id),
            alarm_name: take(self.alarm_name),
            occur_time: self.occur_time.unwrap_or_else(Utc::now),
        })
    }
}

// =============================================================================
// Canonical Alert Model
// =============================================================================

/// Vendor-independent alert; every field is present and non-empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalAlertModel {
    me_dn: String,
    me_name: String,
    manufacturer: String,
    location: String,
    event_type: String,
    severity: AlertSeverity,
    probable_cause: String,
    me_category: String,
    native_me_dn: String,
    alarm_id: String,
    alarm_name: String,
    occur_time: DateTime<Utc>,
}

impl CanonicalAlertModel {
    /// Managed-element distinguished name
    pub fn me_dn(&self) -> &str {
        &self.me_dn
    }

    /// Managed-element name
    pub fn me_name(&self) -> &str {
        &self.me_name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn severity(&self) -> AlertSeverity {
        self.severity
    }

    pub fn probable_cause(&self) -> &str {
        &self.probable_cause
    }

    pub fn me_category(&self) -> &str {
        &self.me_category
    }

    /// Vendor's own name for the managed element
    pub fn native_me_dn(&self) -> &str {
        &self.native_me_dn
    }

    pub fn alarm_id(&self) -> &str {
        &self.alarm_id
    }

    pub fn alarm_name(&self) -> &str {
        &self.alarm_name
    }

    pub fn occur_time(&self) -> DateTime<Utc> {
        self.occur_time
    }
}
