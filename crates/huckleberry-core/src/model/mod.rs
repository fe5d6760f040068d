//! Data model shared by the coordinator, actions and projector
//!
//! - [`ChildProfile`]: static per-child identity fetched once at setup
//! - [`StreamKind`]: the four independent realtime streams per child
//! - [`GrowthData`]: the growth slice extracted from health documents
//! - [`params`]: typed parameters for diaper and growth actions

pub mod growth;
pub mod params;

pub use growth::GrowthData;
pub use params::{
    DiaperAmount, DiaperColor, DiaperConsistency, DiaperEntry, DiaperMode, GrowthEntry,
    UnitSystem,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static identity and tracking preferences of one child
///
/// Immutable after fetch. Adding or removing children requires a full
/// reconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProfile {
    /// Unique child id
    pub uid: String,

    /// Display name
    pub name: String,

    #[serde(default, alias = "birthDate", skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,

    #[serde(default, alias = "profilePictureUrl", skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Creation timestamp (seconds since epoch)
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    /// Hour at which the night starts
    #[serde(default, alias = "nightStart", skip_serializing_if = "Option::is_none")]
    pub night_start: Option<String>,

    #[serde(default, alias = "morningCutoff", skip_serializing_if = "Option::is_none")]
    pub morning_cutoff: Option<String>,

    #[serde(default, alias = "expectedNaps", skip_serializing_if = "Option::is_none")]
    pub expected_naps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

impl ChildProfile {
    /// Create a profile with only the required fields set
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            birthday: None,
            picture: None,
            gender: None,
            color: None,
            created_at: None,
            night_start: None,
            morning_cutoff: None,
            expected_naps: None,
            categories: None,
        }
    }
}

/// One of the four independent realtime streams tracked per child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Sleep,
    Feed,
    Health,
    Diaper,
}

impl StreamKind {
    /// All stream kinds, in registration order
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Sleep,
        StreamKind::Feed,
        StreamKind::Health,
        StreamKind::Diaper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Sleep => "sleep",
            StreamKind::Feed => "feed",
            StreamKind::Health => "health",
            StreamKind::Diaper => "diaper",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breast side for feeding timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedingSide {
    #[default]
    Left,
    Right,
}

impl FeedingSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedingSide::Left => "left",
            FeedingSide::Right => "right",
        }
    }

    /// The opposite side
    pub fn other(&self) -> Self {
        match self {
            FeedingSide::Left => FeedingSide::Right,
            FeedingSide::Right => FeedingSide::Left,
        }
    }

    /// Parse a side from a vendor document value ("left" / "right")
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(FeedingSide::Left),
            "right" => Some(FeedingSide::Right),
            _ => None,
        }
    }
}

impl fmt::Display for FeedingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
