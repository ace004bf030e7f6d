//! Coarse lip-sync frames from text and a target audio duration.
//!
//! Each word gets an equal share of the duration and at most one mouth shape,
//! picked by letter patterns rather than real phoneme alignment.

use serde::{Deserialize, Serialize};

const INTENSITY: f64 = 0.8;

// Checked in order; the first class with a matching pattern wins.
const PHONEME_CLASSES: &[(&str, &[&str])] = &[
    ("A", &["a", "ah", "ay"]),
    ("E", &["e", "eh", "ee"]),
    ("I", &["i", "ih", "eye"]),
    ("O", &["o", "oh", "oo"]),
    ("U", &["u", "uh", "you"]),
    ("M", &["m", "p", "b"]),
    ("L", &["l", "th"]),
    ("S", &["s", "sh", "ch"]),
    ("T", &["t", "d", "k", "g"]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LipSyncFrame {
    /// Seconds from the start of the audio.
    pub time: f64,
    pub phoneme: String,
    pub intensity: f64,
}

pub fn lip_sync_frames(text: &str, audio_duration: f64) -> Vec<LipSyncFrame> {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return Vec::new();
    }
    let time_per_word = audio_duration.max(0.0) / words.len() as f64;

    words
        .iter()
        .enumerate()
        .filter_map(|(index, word)| {
            PHONEME_CLASSES
                .iter()
                .find(|(_, patterns)| patterns.iter().any(|p| word.contains(p)))
                .map(|(phoneme, _)| LipSyncFrame {
                    time: index as f64 * time_per_word,
                    phoneme: phoneme.to_string(),
                    intensity: INTENSITY,
                })
        })
        .collect()
}
