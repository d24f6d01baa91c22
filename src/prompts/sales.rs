//! Prompts for the single-shot modes. Only the structure is load-bearing:
//! which inputs are embedded and which JSON keys the reply must carry.

use crate::model::{ActionPlan, DiscoState, DiscoSummary};

/// System + user message pair for one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const ANALYSIS_SYSTEM: &str = "You are an AI solutions consultant embedded in an enterprise sales team. \
Analyze enterprise conversations about AI adoption and give succinct, tactical guidance on what the seller should say, ask, or clarify next.";

const ANALYSIS_RULES: &[&str] = &[
    "Use markdown bullets (\"- point\").",
    "At most 5 bullets, each 15 words or fewer.",
    "Focus on missed discovery, alignment gaps and buyer objections.",
    "Never restate what was already discussed.",
];

const DISCO_SYSTEM: &str = "You are an expert sales conversation analyst trained on the DISCO framework. \
Provide only valid JSON responses.";

const DISCO_BUCKETS: &[(&str, &str)] = &[
    ("Decision_Criteria", "how they evaluate vendors, must-have features"),
    ("Impact", "targeted outcomes, cost of inaction, success metrics"),
    ("Situation", "current tools, workflow, vendors, existing models or data"),
    ("Challenges", "blockers, pain points, past failures"),
    ("Objectives", "goals and milestones for the next 3 to 12 months"),
];

const POST_CALL_SYSTEM: &str = "You are a sales operations assistant. \
Turn a finished sales call into a concrete post-call action plan. Provide only valid JSON responses.";

const POST_CALL_CATEGORIES: &[(&str, &str)] = &[
    ("followUpActions", "emails, calls and materials promised to the customer"),
    ("informationGathering", "open questions and data still to collect"),
    ("stakeholderEngagement", "people to involve on either side"),
    ("proposalPreparation", "pricing, scoping and proposal work"),
    ("internalCoordination", "hand-offs to internal teams"),
    ("timelineManagement", "dates, deadlines and next meetings"),
];

/// JSON skeleton with one bullet-list placeholder per key.
fn json_shape(keys: &[&str]) -> String {
    let body = keys
        .iter()
        .map(|key| format!("  \"{key}\": \"• Point 1\\n• Point 2\""))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{{\n{body}\n}}")
}

pub fn conversation_analysis(transcript: &str) -> Prompt {
    let rules = ANALYSIS_RULES
        .iter()
        .map(|rule| format!("- {rule}"))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: ANALYSIS_SYSTEM.to_string(),
        user: format!(
            "FULL CONVERSATION HISTORY:\n{transcript}\n\n\
             Respond in this exact JSON format, with no commentary:\n\
             {{\n  \"analysis\": \"- Point 1\\n- Point 2\\n- Point 3\"\n}}\n\n\
             Guidelines:\n{rules}\n"
        ),
    }
}

pub fn structured_extraction(transcript: &str, prior: &DiscoState) -> Prompt {
    let current = prior.formatted();
    let buckets = DISCO_BUCKETS
        .iter()
        .map(|(key, about)| format!("- {key}: {about}"))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: DISCO_SYSTEM.to_string(),
        user: format!(
            "Break the conversation into five insight buckets:\n{buckets}\n\n\
             CONVERSATION:\n{transcript}\n\n\
             CURRENT DISCO DATA:\n{current}\n\n\
             Update the current data with new insights from the conversation and \
             respond with JSON in exactly this structure:\n{shape}\n",
            current = render_current(&current),
            shape = json_shape(&DiscoSummary::FIELDS),
        ),
    }
}

pub fn action_items(transcript: &str) -> Prompt {
    let categories = POST_CALL_CATEGORIES
        .iter()
        .map(|(key, about)| format!("- {key}: {about}"))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: POST_CALL_SYSTEM.to_string(),
        user: format!(
            "Group the next steps from this call into six categories:\n{categories}\n\n\
             CONVERSATION:\n{transcript}\n\n\
             Respond with JSON in exactly this structure:\n{shape}\n",
            shape = json_shape(&ActionPlan::FIELDS),
        ),
    }
}

fn render_current(current: &DiscoSummary) -> String {
    [
        ("Decision Criteria", &current.decision_criteria),
        ("Impact", &current.impact),
        ("Situation", &current.situation),
        ("Challenges", &current.challenges),
        ("Objectives", &current.objectives),
    ]
    .iter()
    .map(|(label, value)| format!("- {label}: {value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    #[test]
    fn analysis_embeds_transcript_and_key() {
        let prompt = conversation_analysis("customer: we run on-prem GPUs");
        assert!(prompt.user.contains("customer: we run on-prem GPUs"));
        assert!(prompt.user.contains("\"analysis\""));
        for rule in ANALYSIS_RULES {
            assert!(prompt.user.contains(rule));
        }
    }

    #[test]
    fn disco_embeds_prior_state() {
        let prior = DiscoState {
            challenges: Some(FieldValue::List(vec![
                "price objection".to_string(),
                "legacy CRM".to_string(),
            ])),
            ..DiscoState::default()
        };
        let prompt = structured_extraction("customer: price is too high", &prior);
        assert!(prompt.user.contains("customer: price is too high"));
        assert!(prompt.user.contains("- Challenges: price objection, legacy CRM"));
        assert!(prompt.user.contains("- Impact: None yet"));
    }

    #[test]
    fn disco_demands_all_five_keys() {
        let prompt = structured_extraction("t", &DiscoState::default());
        for key in DiscoSummary::FIELDS {
            assert!(prompt.user.contains(&format!("\"{key}\"")), "missing {key}");
        }
        assert!(prompt.system.contains("JSON"));
    }

    #[test]
    fn action_items_demand_all_six_keys() {
        let prompt = action_items("t");
        for key in ActionPlan::FIELDS {
            assert!(prompt.user.contains(&format!("\"{key}\"")), "missing {key}");
        }
    }

    #[test]
    fn bucket_tables_match_result_fields() {
        let disco: Vec<_> = DISCO_BUCKETS.iter().map(|(k, _)| *k).collect();
        assert_eq!(disco, DiscoSummary::FIELDS);
        let post_call: Vec<_> = POST_CALL_CATEGORIES.iter().map(|(k, _)| *k).collect();
        assert_eq!(post_call, ActionPlan::FIELDS);
    }

    #[test]
    fn prompts_have_no_markdown_fences() {
        assert!(!conversation_analysis("t").user.contains("```"));
        assert!(!structured_extraction("t", &DiscoState::default()).user.contains("```"));
        assert!(!action_items("t").user.contains("```"));
    }

    #[test]
    fn json_shape_is_valid_json() {
        let shape = json_shape(&ActionPlan::FIELDS);
        let value: serde_json::Value = serde_json::from_str(&shape).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 6);
    }
}
