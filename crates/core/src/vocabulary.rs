//! Closed vocabularies the model is asked to answer in.
//!
//! The provider returns these as free strings. Anything outside the
//! vocabulary collapses to the professional/low defaults so downstream
//! consumers (avatar, HTTP clients) only ever see known values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Avatar gesture suggested for a whole reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Gesture {
    Welcome,
    Examine,
    Prescribe,
    Reassure,
    CheckPulse,
    Listen,
    Think,
    Nod,
    Wave,
    Point,
    Explain,
    Empathy,
    #[default]
    Professional,
}

impl Gesture {
    pub const ALL: [Gesture; 13] = [
        Gesture::Welcome,
        Gesture::Examine,
        Gesture::Prescribe,
        Gesture::Reassure,
        Gesture::CheckPulse,
        Gesture::Listen,
        Gesture::Think,
        Gesture::Nod,
        Gesture::Wave,
        Gesture::Point,
        Gesture::Explain,
        Gesture::Empathy,
        Gesture::Professional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Welcome => "welcome",
            Gesture::Examine => "examine",
            Gesture::Prescribe => "prescribe",
            Gesture::Reassure => "reassure",
            Gesture::CheckPulse => "checkPulse",
            Gesture::Listen => "listen",
            Gesture::Think => "think",
            Gesture::Nod => "nod",
            Gesture::Wave => "wave",
            Gesture::Point => "point",
            Gesture::Explain => "explain",
            Gesture::Empathy => "empathy",
            Gesture::Professional => "professional",
        }
    }

    /// Maps a provider string onto the vocabulary, defaulting to `Professional`.
    pub fn from_lenient(value: &str) -> Self {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == value)
            .unwrap_or_default()
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emotional register of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Professional,
    Concerned,
    Reassuring,
    Focused,
}

impl Mood {
    pub const ALL: [Mood; 4] = [
        Mood::Professional,
        Mood::Concerned,
        Mood::Reassuring,
        Mood::Focused,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Professional => "professional",
            Mood::Concerned => "concerned",
            Mood::Reassuring => "reassuring",
            Mood::Focused => "focused",
        }
    }

    pub fn from_lenient(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == value)
            .unwrap_or_default()
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How soon the patient should seek care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }

    pub fn from_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "medium" => Urgency::Medium,
            "high" => Urgency::High,
            _ => Urgency::Low,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
