//! Deterministic canned replies used whenever the provider cannot answer.

use crate::completion::MedicalReply;
use crate::vocabulary::{Gesture, Mood, Urgency};

struct CannedReply {
    keywords: &'static [&'static str],
    text: &'static str,
    gesture: Gesture,
    mood: Mood,
}

// Checked in order; symptom-specific entries precede the greeting so that
// "hi, I have a headache" is answered as a headache.
const CANNED: &[CannedReply] = &[
    CannedReply {
        keywords: &["headache", "migraine"],
        text: "For headaches, try rest, hydration, and over-the-counter pain relief if appropriate. \
               Seek medical care for severe or persistent headaches.",
        gesture: Gesture::Reassure,
        mood: Mood::Reassuring,
    },
    CannedReply {
        keywords: &["pain", "hurt", "ache"],
        text: "I understand you're experiencing pain. Can you describe the location and severity? \
               For immediate severe pain, please seek medical attention.",
        gesture: Gesture::Examine,
        mood: Mood::Concerned,
    },
    CannedReply {
        keywords: &["fever", "feverish", "temperature", "hot"],
        text: "Fever can indicate various conditions. Have you taken your temperature? \
               Please monitor your symptoms and consult a healthcare provider if it persists.",
        gesture: Gesture::CheckPulse,
        mood: Mood::Professional,
    },
    CannedReply {
        keywords: &["hello", "hi", "hey"],
        text: "Hello! I'm Dr. AI. How can I help you with your health concerns today?",
        gesture: Gesture::Welcome,
        mood: Mood::Professional,
    },
];

const GENERIC: &str = "I'm here to help with your health questions. Please describe your symptoms \
                       or concerns, and I'll provide general medical information. Always consult \
                       healthcare professionals for specific medical advice.";

/// Lower-cased alphanumeric words of `text`.
pub(crate) fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Picks the canned reply for `user_text`.
///
/// Keywords match whole words or word prefixes ("fevers", "hurting"), never
/// the middle of another word, so "this" does not read as a greeting.
pub fn fallback_reply(user_text: &str) -> MedicalReply {
    let words: Vec<String> = words(user_text).collect();
    let matched = CANNED.iter().find(|canned| {
        canned.keywords.iter().any(|kw| {
            words.iter().any(|w| {
                if kw.len() <= 3 {
                    w == kw
                } else {
                    w.starts_with(kw) || (*kw == "ache" && w.ends_with(kw))
                }
            })
        })
    });

    match matched {
        Some(canned) => MedicalReply {
            text: canned.text.to_string(),
            gesture: canned.gesture,
            mood: canned.mood,
            urgency: Urgency::Low,
            fallback: true,
        },
        None => MedicalReply {
            text: GENERIC.to_string(),
            gesture: Gesture::Listen,
            mood: Mood::Professional,
            urgency: Urgency::Low,
            fallback: true,
        },
    }
}
