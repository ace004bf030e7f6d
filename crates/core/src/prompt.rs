//! System prompt construction for the medical assistant.

use serde::{Deserialize, Serialize};

/// Patient attributes supplied out-of-band for a session.
///
/// Every field is optional free text; empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub age: Option<i32>,
    pub symptoms: Option<String>,
    pub medical_history: Option<String>,
    pub medications: Option<String>,
    pub allergies: Option<String>,
}

impl PatientContext {
    /// Renders the `Patient: ...` line, or `None` when nothing is known.
    pub fn summary(&self) -> Option<String> {
        let mut items = Vec::new();
        if let Some(age) = self.age {
            items.push(format!("Age: {}", age));
        }
        let text_fields = [
            ("Symptoms", &self.symptoms),
            ("History", &self.medical_history),
            ("Medications", &self.medications),
            ("Allergies", &self.allergies),
        ];
        for (label, value) in text_fields {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                items.push(format!("{}: {}", label, value));
            }
        }
        if items.is_empty() {
            None
        } else {
            Some(format!("Patient: {}", items.join("; ")))
        }
    }
}

const GUIDELINES: &str = "\
MEDICAL GUIDELINES:
- Ask clarifying questions when needed
- Provide actionable health advice
- Always emphasize consulting healthcare professionals for serious concerns
- Be reassuring but honest about health risks
- Use medical terminology appropriately but explain complex terms";

const GESTURES: &str = "\
GESTURE MAPPING (choose based on interaction):
- \"welcome\": Greeting new patients, introductions
- \"examine\": Discussing symptoms, asking about physical findings
- \"reassure\": Providing comfort, explaining low-risk conditions
- \"think\": Analyzing symptoms, considering differential diagnosis
- \"listen\": When patient describes concerns, active listening
- \"explain\": Educating about conditions, treatment options
- \"checkPulse\": Discussing vital signs, cardiovascular concerns
- \"prescribe\": Recommending medications or treatments (general advice only)
- \"nod\": Acknowledging patient concerns, showing understanding
- \"empathy\": Responding to emotional distress, serious diagnoses";

const MOODS: &str = "\
MOOD MAPPING:
- \"professional\": Standard medical consultation
- \"concerned\": Potentially serious symptoms requiring immediate care
- \"reassuring\": Mild conditions, providing comfort
- \"focused\": Complex medical discussions, detailed explanations";

const URGENCY: &str = "\
URGENCY LEVELS:
- \"low\": Routine questions, general health advice
- \"medium\": Symptoms requiring medical attention within days
- \"high\": Serious symptoms requiring immediate medical care";

const RESPONSE_FORMAT: &str = r#"Respond in JSON:
{
    "response": "Professional medical response with empathy and clear guidance",
    "gesture": "appropriate gesture from list above",
    "mood": "professional/concerned/reassuring/focused",
    "urgency": "low/medium/high"
}"#;

/// Shape the model is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// A single JSON object carrying response, gesture, mood and urgency.
    Structured,
    /// Plain prose, used when tokens are relayed to the client as they arrive.
    Prose,
}

/// Builds the system prompt, embedding the patient summary when one exists.
pub fn build_system_prompt(patient: Option<&PatientContext>, format: ReplyFormat) -> String {
    let mut prompt = String::from(
        "You are Dr. AI, a professional virtual doctor with empathy and expertise. \
         Provide accurate medical guidance while maintaining a caring bedside manner.\n\n",
    );
    if let Some(summary) = patient.and_then(PatientContext::summary) {
        prompt.push_str(&summary);
        prompt.push('\n');
    }
    let sections: &[&str] = match format {
        ReplyFormat::Structured => &[GUIDELINES, GESTURES, MOODS, URGENCY, RESPONSE_FORMAT],
        ReplyFormat::Prose => &[GUIDELINES],
    };
    for section in sections {
        prompt.push_str(section);
        prompt.push_str("\n\n");
    }
    match format {
        ReplyFormat::Structured => {
            prompt.push_str("Be thorough but concise. Show genuine care for patient wellbeing.")
        }
        ReplyFormat::Prose => prompt.push_str(
            "Respond in plain text, in a warm, professional manner as a caring doctor would. \
             Structure your responses with clear points when giving health advice.",
        ),
    }
    prompt
}
