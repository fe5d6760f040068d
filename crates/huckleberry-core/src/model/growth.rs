//! Growth slice extracted from raw health documents

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_WEIGHT_UNITS: &str = "kg";
pub const DEFAULT_HEIGHT_UNITS: &str = "cm";
pub const DEFAULT_HEAD_UNITS: &str = "hcm";

/// Last known growth measurement, or a placeholder carrying only units
///
/// A placeholder means "checked, no data". It is distinct from an absent
/// slice, which means the health stream has not delivered anything yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// Head circumference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<f64>,

    pub weight_units: String,
    pub height_units: String,
    pub head_units: String,

    /// Measurement time (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl GrowthData {
    /// Placeholder with default units and no measurement values
    pub fn placeholder() -> Self {
        Self {
            weight: None,
            height: None,
            head: None,
            weight_units: DEFAULT_WEIGHT_UNITS.to_string(),
            height_units: DEFAULT_HEIGHT_UNITS.to_string(),
            head_units: DEFAULT_HEAD_UNITS.to_string(),
            timestamp: None,
        }
    }

    /// Extract the growth slice from a raw health document
    ///
    /// Reads `prefs.lastGrowthEntry`. A missing, empty or non-object `prefs`
    /// or entry yields [`GrowthData::placeholder`]. Never fails.
    pub fn from_health_document(document: &Value) -> Self {
        let entry = document
            .get("prefs")
            .and_then(|prefs| prefs.get("lastGrowthEntry"))
            .and_then(Value::as_object)
            .filter(|entry| !entry.is_empty());

        let Some(entry) = entry else {
            return Self::placeholder();
        };

        let units = |key: &str, default: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        Self {
            weight: entry.get("weight").and_then(Value::as_f64),
            height: entry.get("height").and_then(Value::as_f64),
            head: entry.get("head").and_then(Value::as_f64),
            weight_units: units("weightUnits", DEFAULT_WEIGHT_UNITS),
            height_units: units("heightUnits", DEFAULT_HEIGHT_UNITS),
            head_units: units("headUnits", DEFAULT_HEAD_UNITS),
            timestamp: entry.get("start").and_then(Value::as_f64),
        }
    }

    /// True when no measurement value is present
    pub fn is_placeholder(&self) -> bool {
        self.weight.is_none() && self.height.is_none() && self.head.is_none()
    }
}

impl Default for GrowthData {
    fn default() -> Self {
        Self::placeholder()
    }
}
