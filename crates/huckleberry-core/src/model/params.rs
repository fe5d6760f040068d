//! Typed parameters for diaper and growth logging

use serde::{Deserialize, Serialize};

/// What a diaper change contained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiaperMode {
    Pee,
    Poo,
    Both,
    Dry,
}

impl DiaperMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiaperMode::Pee => "pee",
            DiaperMode::Poo => "poo",
            DiaperMode::Both => "both",
            DiaperMode::Dry => "dry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiaperAmount {
    Little,
    Medium,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiaperColor {
    Yellow,
    Brown,
    Black,
    Green,
    Red,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiaperConsistency {
    Solid,
    Loose,
    Runny,
    Mucousy,
    Hard,
    Pebbles,
    Diarrhea,
}

/// A diaper change to log
///
/// Fields that do not apply to the mode are left `None` (a pee-only change
/// carries no poo amount, color or consistency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaperEntry {
    pub mode: DiaperMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pee_amount: Option<DiaperAmount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poo_amount: Option<DiaperAmount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<DiaperColor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<DiaperConsistency>,

    #[serde(default)]
    pub diaper_rash: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DiaperEntry {
    /// Entry of the given mode with every optional detail unset
    pub fn new(mode: DiaperMode) -> Self {
        Self {
            mode,
            pee_amount: None,
            poo_amount: None,
            color: None,
            consistency: None,
            diaper_rash: false,
            notes: None,
        }
    }

    /// Clear the fields that do not apply to this entry's mode
    pub fn normalized(mut self) -> Self {
        match self.mode {
            DiaperMode::Pee => {
                self.poo_amount = None;
                self.color = None;
                self.consistency = None;
            }
            DiaperMode::Poo => {
                self.pee_amount = None;
            }
            DiaperMode::Both => {}
            DiaperMode::Dry => {
                self.pee_amount = None;
                self.poo_amount = None;
                self.color = None;
                self.consistency = None;
            }
        }
        self
    }
}

/// Unit system for growth measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    /// Vendor unit labels for (weight, height, head)
    pub fn unit_labels(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            UnitSystem::Metric => ("kg", "cm", "hcm"),
            UnitSystem::Imperial => ("lbs", "in", "hin"),
        }
    }
}

/// A growth measurement to log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<f64>,

    #[serde(default)]
    pub units: UnitSystem,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diaper_entry_from_service_data() {
        let entry: DiaperEntry = serde_json::from_value(json!({
            "mode": "both",
            "pee_amount": "little",
            "poo_amount": "big",
            "color": "yellow",
            "consistency": "runny",
            "notes": "after nap"
        }))
        .unwrap();

        assert_eq!(entry.mode, DiaperMode::Both);
        assert_eq!(entry.pee_amount, Some(DiaperAmount::Little));
        assert_eq!(entry.color, Some(DiaperColor::Yellow));
        assert_eq!(entry.consistency, Some(DiaperConsistency::Runny));
        assert!(!entry.diaper_rash);
    }

    #[test]
    fn test_rejects_unknown_color() {
        let result: Result<DiaperEntry, _> =
            serde_json::from_value(json!({"mode": "poo", "color": "purple"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_normalized_drops_fields_outside_mode() {
        let mut entry = DiaperEntry::new(DiaperMode::Pee);
        entry.pee_amount = Some(DiaperAmount::Medium);
        entry.poo_amount = Some(DiaperAmount::Big);
        entry.color = Some(DiaperColor::Green);

        let entry = entry.normalized();
        assert_eq!(entry.pee_amount, Some(DiaperAmount::Medium));
        assert_eq!(entry.poo_amount, None);
        assert_eq!(entry.color, None);
    }

    #[test]
    fn test_growth_entry_defaults_to_metric() {
        let entry: GrowthEntry = serde_json::from_value(json!({"weight": 10.5})).unwrap();
        assert_eq!(entry.units, UnitSystem::Metric);
        assert_eq!(entry.height, None);
        assert_eq!(UnitSystem::Imperial.unit_labels(), ("lbs", "in", "hin"));
    }
}
