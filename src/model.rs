//! Request and result types for the four generation modes.

use serde::{Deserialize, Serialize};

use crate::consts::SENTINEL;

/// A caller-selectable generation intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    DirectAnswer,
    ConversationAnalysis,
    StructuredExtraction,
    ActionItemExtraction,
}

impl Mode {
    /// Each mode yields exactly one result kind.
    pub fn result_kind(&self) -> ResultKind {
        match self {
            Mode::DirectAnswer => ResultKind::DirectAnswer,
            Mode::ConversationAnalysis => ResultKind::ConversationAnalysis,
            Mode::StructuredExtraction => ResultKind::StructuredExtraction,
            Mode::ActionItemExtraction => ResultKind::ActionItemExtraction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::DirectAnswer => "direct_answer",
            Mode::ConversationAnalysis => "conversation_analysis",
            Mode::StructuredExtraction => "structured_extraction",
            Mode::ActionItemExtraction => "action_item_extraction",
        }
    }
}

/// What happens when a field is absent from the backend reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Absence is an error.
    Strict,
    /// Absence is replaced by [`SENTINEL`].
    DefaultFill,
}

/// The shape contract a reply is normalized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    DirectAnswer,
    ConversationAnalysis,
    StructuredExtraction,
    ActionItemExtraction,
}

impl ResultKind {
    pub fn policy(&self) -> FieldPolicy {
        match self {
            ResultKind::DirectAnswer | ResultKind::ConversationAnalysis => FieldPolicy::Strict,
            ResultKind::StructuredExtraction | ResultKind::ActionItemExtraction => {
                FieldPolicy::DefaultFill
            }
        }
    }

    /// Whether a reply with no JSON object at all may be taken as plain prose.
    pub fn accepts_prose(&self) -> bool {
        matches!(self, ResultKind::DirectAnswer)
    }
}

/// Prior DISCO state supplied by the caller. Each value is free text or a
/// list of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoState {
    #[serde(rename = "Decision_Criteria", default)]
    pub decision_criteria: Option<FieldValue>,
    #[serde(rename = "Impact", default)]
    pub impact: Option<FieldValue>,
    #[serde(rename = "Situation", default)]
    pub situation: Option<FieldValue>,
    #[serde(rename = "Challenges", default)]
    pub challenges: Option<FieldValue>,
    #[serde(rename = "Objectives", default)]
    pub objectives: Option<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

fn render_prior(value: &Option<FieldValue>) -> String {
    match value.as_ref().map(FieldValue::render) {
        Some(text) if !text.is_empty() => text,
        _ => SENTINEL.to_string(),
    }
}

impl DiscoState {
    /// Render every field as one line of text, for embedding in a prompt.
    pub fn formatted(&self) -> DiscoSummary {
        DiscoSummary {
            decision_criteria: render_prior(&self.decision_criteria),
            impact: render_prior(&self.impact),
            situation: render_prior(&self.situation),
            challenges: render_prior(&self.challenges),
            objectives: render_prior(&self.objectives),
        }
    }
}

/// One generation call. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    DirectAnswer { query: String },
    ConversationAnalysis { transcript: String },
    StructuredExtraction { transcript: String, prior: DiscoState },
    ActionItemExtraction { transcript: String },
}

impl GenerationRequest {
    pub fn mode(&self) -> Mode {
        match self {
            GenerationRequest::DirectAnswer { .. } => Mode::DirectAnswer,
            GenerationRequest::ConversationAnalysis { .. } => Mode::ConversationAnalysis,
            GenerationRequest::StructuredExtraction { .. } => Mode::StructuredExtraction,
            GenerationRequest::ActionItemExtraction { .. } => Mode::ActionItemExtraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectAnswer {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub analysis: String,
}

/// Five-field DISCO qualification summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoSummary {
    #[serde(rename = "Decision_Criteria")]
    pub decision_criteria: String,
    #[serde(rename = "Impact")]
    pub impact: String,
    #[serde(rename = "Situation")]
    pub situation: String,
    #[serde(rename = "Challenges")]
    pub challenges: String,
    #[serde(rename = "Objectives")]
    pub objectives: String,
}

impl DiscoSummary {
    pub const FIELDS: [&'static str; 5] = [
        "Decision_Criteria",
        "Impact",
        "Situation",
        "Challenges",
        "Objectives",
    ];
}

/// Six-category post-call action plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub follow_up_actions: String,
    pub information_gathering: String,
    pub stakeholder_engagement: String,
    pub proposal_preparation: String,
    pub internal_coordination: String,
    pub timeline_management: String,
}

impl ActionPlan {
    pub const FIELDS: [&'static str; 6] = [
        "followUpActions",
        "informationGathering",
        "stakeholderEngagement",
        "proposalPreparation",
        "internalCoordination",
        "timelineManagement",
    ];
}

/// A reply normalized to its kind's shape. Serializes as the bare object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StructuredResult {
    DirectAnswer(DirectAnswer),
    ConversationAnalysis(ConversationAnalysis),
    StructuredExtraction(DiscoSummary),
    ActionItemExtraction(ActionPlan),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_per_kind() {
        assert_eq!(ResultKind::DirectAnswer.policy(), FieldPolicy::Strict);
        assert_eq!(ResultKind::ConversationAnalysis.policy(), FieldPolicy::Strict);
        assert_eq!(ResultKind::StructuredExtraction.policy(), FieldPolicy::DefaultFill);
        assert_eq!(ResultKind::ActionItemExtraction.policy(), FieldPolicy::DefaultFill);
    }

    #[test]
    fn disco_state_joins_lists_and_fills_gaps() {
        let state: DiscoState = serde_json::from_str(
            r#"{"Impact": ["churn", "revenue loss"], "Challenges": "price objection", "Situation": ""}"#,
        )
        .unwrap();
        let formatted = state.formatted();
        assert_eq!(formatted.impact, "churn, revenue loss");
        assert_eq!(formatted.challenges, "price objection");
        assert_eq!(formatted.situation, SENTINEL);
        assert_eq!(formatted.decision_criteria, SENTINEL);
        assert_eq!(formatted.objectives, SENTINEL);
    }

    #[test]
    fn empty_list_renders_as_sentinel() {
        let state = DiscoState {
            objectives: Some(FieldValue::List(vec![])),
            ..DiscoState::default()
        };
        assert_eq!(state.formatted().objectives, SENTINEL);
    }

    #[test]
    fn action_plan_serializes_camel_case() {
        let plan = ActionPlan {
            follow_up_actions: "a".to_string(),
            information_gathering: "b".to_string(),
            stakeholder_engagement: "c".to_string(),
            proposal_preparation: "d".to_string(),
            internal_coordination: "e".to_string(),
            timeline_management: "f".to_string(),
        };
        let value = serde_json::to_value(StructuredResult::ActionItemExtraction(plan)).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        for field in ActionPlan::FIELDS {
            assert!(keys.contains(&field.to_string()), "missing {field}");
        }
    }

    #[test]
    fn result_kind_matches_request_mode() {
        let request = GenerationRequest::ConversationAnalysis {
            transcript: "hi".to_string(),
        };
        assert_eq!(request.mode().result_kind(), ResultKind::ConversationAnalysis);
        assert!(!ResultKind::ConversationAnalysis.accepts_prose());
        assert!(ResultKind::DirectAnswer.accepts_prose());
    }
}
