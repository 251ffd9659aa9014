//! Safety/intent moderation gate.
//!
//! Classifies a query via the external classification capability and
//! produces the allow/deny decision with its user-facing message.
//! Classification failures are the engine's to handle fail-closed; this
//! module only reports them.

use tracing::{debug, instrument};

use mediq_capabilities::Classify;
use mediq_shared::{
    CapabilityResult, IntentLabel, SafetyIntentDecision, SafetyLabel, messages,
};

/// Moderation stage: one decision per query, never mutated afterwards.
pub struct SafetyIntentGate<C> {
    classifier: C,
}

impl<C: Classify> SafetyIntentGate<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// Classify the query. Empty/whitespace queries decide locally
    /// without a capability call; a capability failure propagates so
    /// the engine can apply its fail-closed policy.
    #[instrument(skip_all)]
    pub async fn decide(&self, query: &str) -> CapabilityResult<SafetyIntentDecision> {
        if query.trim().is_empty() {
            return Ok(SafetyIntentDecision::empty());
        }

        let raw = self.classifier.classify(query).await?;
        let safety_label = SafetyLabel::from_raw(&raw.safety_label);
        let intent_label = IntentLabel::from_raw(&raw.intent_label);

        let safety_allow = safety_label == SafetyLabel::Safe;
        let intent_allow = intent_label == IntentLabel::PiCmi;

        debug!(
            safety = safety_label.as_str(),
            intent = intent_label.as_str(),
            "query classified"
        );

        Ok(SafetyIntentDecision {
            safety_label,
            safety_allow,
            intent_label,
            intent_allow,
            message: Some(message_for(safety_label, intent_label)),
        })
    }
}

/// Message selection priority: emergency > self_harm > medical_advice >
/// unsupported intent > "appears safe" acknowledgement.
fn message_for(safety: SafetyLabel, intent: IntentLabel) -> String {
    match safety {
        SafetyLabel::Emergency => messages::REFUSAL_EMERGENCY.to_string(),
        SafetyLabel::SelfHarm => messages::REFUSAL_SELF_HARM.to_string(),
        SafetyLabel::MedicalAdvice => messages::REFUSAL_MEDICAL_ADVICE.to_string(),
        _ => {
            if intent != IntentLabel::PiCmi {
                messages::REFUSAL_UNSUPPORTED.to_string()
            } else {
                messages::SAFE_ACK.to_string()
            }
        }
    }
}
