//! Gesture/Animation Mapper
//!
//! Turns finalized response text into a timed list of avatar gesture cues and
//! resolves gesture names to skeletal animation descriptors.

use crate::fallback::words;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Approximate speaking time allotted to each sentence.
pub const SECONDS_PER_SENTENCE: f64 = 3.0;

/// Names of the cues a response timeline can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Wave,
    Nod,
    Explain,
    Empathy,
    Concern,
}

impl Cue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Wave => "wave",
            Cue::Nod => "nod",
            Cue::Explain => "explain",
            Cue::Empathy => "empathy",
            Cue::Concern => "concern",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a gesture timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureCue {
    pub name: Cue,
    /// Seconds from the start of playback.
    pub timing_offset: f64,
    pub duration: f64,
}

struct CueRule {
    cue: Cue,
    triggers: &'static [&'static str],
    duration: f64,
}

const GREETING: CueRule = CueRule {
    cue: Cue::Wave,
    triggers: &["hello", "hi", "welcome"],
    duration: 2.0,
};

const AFFIRMATION: CueRule = CueRule {
    cue: Cue::Nod,
    triggers: &["yes", "correct", "exactly"],
    duration: 1.5,
};

const AFFIRMATION_OFFSET: f64 = 0.5;

const SENTENCE_RULES: &[CueRule] = &[
    CueRule {
        cue: Cue::Explain,
        triggers: &["explain", "because"],
        duration: 2.5,
    },
    CueRule {
        cue: Cue::Empathy,
        triggers: &["sorry", "understand your concern"],
        duration: 2.0,
    },
    CueRule {
        cue: Cue::Concern,
        triggers: &["worried", "serious", "urgent"],
        duration: 2.0,
    },
];

impl CueRule {
    // Single words must match a whole word; phrases match as substrings of the
    // lower-cased text.
    fn matches(&self, lowered: &str, words: &[String]) -> bool {
        self.triggers.iter().any(|trigger| {
            if trigger.contains(' ') {
                lowered.contains(trigger)
            } else {
                words.iter().any(|w| w == trigger)
            }
        })
    }
}

/// Builds the gesture timeline for `text`, ordered by ascending offset.
///
/// Greeting and affirmation cues are tested once against the whole text.
/// Explanation, empathy and urgency cues are tested per sentence, each
/// sentence starting [`SECONDS_PER_SENTENCE`] after the previous one.
pub fn gestures_for(text: &str) -> Vec<GestureCue> {
    let mut cues = Vec::new();
    let lowered = text.to_lowercase();
    let all_words: Vec<String> = words(text).collect();

    if GREETING.matches(&lowered, &all_words) {
        cues.push(GestureCue {
            name: GREETING.cue,
            timing_offset: 0.0,
            duration: GREETING.duration,
        });
    }
    if AFFIRMATION.matches(&lowered, &all_words) {
        cues.push(GestureCue {
            name: AFFIRMATION.cue,
            timing_offset: AFFIRMATION_OFFSET,
            duration: AFFIRMATION.duration,
        });
    }

    let sentences = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty());
    for (index, sentence) in sentences.enumerate() {
        let timing_offset = index as f64 * SECONDS_PER_SENTENCE;
        let lowered = sentence.to_lowercase();
        let sentence_words: Vec<String> = words(sentence).collect();
        for rule in SENTENCE_RULES {
            if rule.matches(&lowered, &sentence_words) {
                cues.push(GestureCue {
                    name: rule.cue,
                    timing_offset,
                    duration: rule.duration,
                });
            }
        }
    }

    cues.sort_by(|a, b| a.timing_offset.total_cmp(&b.timing_offset));
    cues
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureCategory {
    Immediate,
    Contextual,
    Emotional,
    Professional,
}

impl FromStr for GestureCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "contextual" => Ok(Self::Contextual),
            "emotional" => Ok(Self::Emotional),
            "professional" => Ok(Self::Professional),
            other => anyhow::bail!("unknown gesture category '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneRotation {
    pub bone: String,
    /// Euler angles in degrees.
    pub rotation: [f64; 3],
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationData {
    pub bone_rotations: Vec<BoneRotation>,
}

/// A persisted gesture library entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureDescriptor {
    pub name: String,
    pub category: GestureCategory,
    pub duration: f64,
    pub trigger_keywords: Vec<String>,
    pub animation: AnimationData,
}

/// Lookup of active gesture library entries by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GestureLibrary: Send + Sync {
    async fn find_gesture(&self, name: &str) -> Result<Option<GestureDescriptor>>;
}

fn rotations(entries: &[(&str, [f64; 3], f64)]) -> AnimationData {
    AnimationData {
        bone_rotations: entries
            .iter()
            .map(|(bone, rotation, duration)| BoneRotation {
                bone: bone.to_string(),
                rotation: *rotation,
                duration: *duration,
            })
            .collect(),
    }
}

/// Built-in animations used when the library has no entry for a name.
pub fn default_animation(name: &str) -> Option<AnimationData> {
    let data = match name {
        "wave" => rotations(&[
            ("rightUpperArm", [0.0, 0.0, -45.0], 0.5),
            ("rightLowerArm", [0.0, 0.0, -90.0], 0.5),
            ("rightHand", [0.0, 45.0, 0.0], 1.0),
        ]),
        "nod" => rotations(&[
            ("head", [15.0, 0.0, 0.0], 0.3),
            ("head", [-15.0, 0.0, 0.0], 0.3),
            ("head", [0.0, 0.0, 0.0], 0.3),
        ]),
        "think" => rotations(&[
            ("rightUpperArm", [0.0, 0.0, -30.0], 1.0),
            ("rightLowerArm", [0.0, 0.0, -120.0], 1.0),
            ("rightHand", [0.0, 0.0, 0.0], 1.0),
        ]),
        "explain" => rotations(&[
            ("rightUpperArm", [0.0, 0.0, -60.0], 1.0),
            ("leftUpperArm", [0.0, 0.0, 60.0], 1.0),
        ]),
        _ => return None,
    };
    Some(data)
}

/// Resolves `name` to an animation: library entry, else built-in default,
/// else an empty instruction list. Library errors count as a miss.
pub async fn animation_for_name(library: &dyn GestureLibrary, name: &str) -> AnimationData {
    match library.find_gesture(name).await {
        Ok(Some(descriptor)) => return descriptor.animation,
        Ok(None) => {}
        Err(e) => warn!(gesture = name, error = %e, "Gesture library lookup failed"),
    }
    default_animation(name).unwrap_or_default()
}
