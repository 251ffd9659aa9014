//! Fixed user-facing strings: refusal messages, the not-found answer,
//! and the disclaimer attached to every assembled answer.

/// Refusal for an empty or whitespace-only query.
pub const REFUSAL_EMPTY: &str = "The query is empty. Please ask a question about a medicine that \
     can be answered using official Consumer Medicine Information or Product Information documents.";

/// Generic fail-closed refusal when moderation could not run.
pub const REFUSAL_ERROR: &str =
    "There was an error processing your request. Please try again later.";

/// Refusal for queries outside the PI/CMI intent.
pub const REFUSAL_UNSUPPORTED: &str = "I can only provide general information that appears in \
     official Consumer Medicine Information or Product Information documents.";

/// Refusal for emergency queries.
pub const REFUSAL_EMERGENCY: &str = "I cannot help with emergencies. If you or someone else is \
     at risk, contact local emergency services immediately.";

/// Refusal for self-harm related queries.
pub const REFUSAL_SELF_HARM: &str = "I am sorry you are feeling distressed. I cannot help with \
     self-harm or suicide related requests. Please reach out to emergency services or a trusted \
     professional right away.";

/// Refusal for personalised medical advice or dosing questions.
pub const REFUSAL_MEDICAL_ADVICE: &str = "I cannot give personalised medical advice or dosing \
     guidance. Please speak with your pharmacist or doctor.";

/// Acknowledgement attached to an allowed decision.
pub const SAFE_ACK: &str = "The query appears safe and appropriate.";

/// Summary used when no passages were retrieved.
pub const NOT_FOUND_SUMMARY: &str = "I could not find that in the indexed CMI/PI documents. \
     Please check the official product materials or speak with a pharmacist.";

/// Disclaimer attached to every answer.
pub const DISCLAIMER: &str = "General information only, not medical advice.";
