//! Turns raw backend text into a [`StructuredResult`].
//!
//! Two passes: citation sanitation (job replies only), then extraction of
//! the outermost `{ ... }` span and per-field resolution against the
//! kind's [`FieldPolicy`].

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::consts::SENTINEL;
use crate::error::ClassifiedError;
use crate::model::{
    ActionPlan, ConversationAnalysis, DirectAnswer, DiscoSummary, FieldPolicy, ResultKind,
    StructuredResult,
};

/// Where a reply came from. Job replies carry document-citation markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    SingleShot,
    Job,
}

static LENTICULAR_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【[^】]*】").expect("static regex"));
static SQUARE_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strip `【...】` and `[...]` spans, collapse whitespace runs, trim.
pub fn sanitize(text: &str) -> String {
    let text = LENTICULAR_CITATION.replace_all(text, "");
    let text = SQUARE_CITATION.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Greedy span from the first `{` to the last `}`. Nesting is not tracked.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Normalize `raw` into the shape of `kind`.
pub fn normalize(
    kind: ResultKind,
    raw: &str,
    source: ReplySource,
) -> Result<StructuredResult, ClassifiedError> {
    let text: Cow<'_, str> = match source {
        ReplySource::Job => Cow::Owned(sanitize(raw)),
        ReplySource::SingleShot => Cow::Borrowed(raw),
    };

    let Some(json) = extract_json(&text) else {
        if kind.accepts_prose() {
            let prose = text.trim();
            if prose.is_empty() {
                return Err(ClassifiedError::output_missing("backend reply is empty"));
            }
            return Ok(StructuredResult::DirectAnswer(DirectAnswer {
                response: prose.to_string(),
            }));
        }
        return Err(ClassifiedError::output_malformed(
            "no JSON object found in backend reply",
        ));
    };

    let object: Map<String, Value> = serde_json::from_str(json)
        .map_err(|e| ClassifiedError::output_malformed(format!("failed to parse JSON: {e}")))?;

    let policy = kind.policy();
    let take = |name: &str| -> Result<String, ClassifiedError> {
        match (field_text(object.get(name)), policy) {
            (Some(text), _) => Ok(text),
            (None, FieldPolicy::DefaultFill) => Ok(SENTINEL.to_string()),
            (None, FieldPolicy::Strict) => Err(ClassifiedError::output_missing(format!(
                "missing field `{name}` in backend reply"
            ))),
        }
    };

    let result = match kind {
        ResultKind::DirectAnswer => StructuredResult::DirectAnswer(DirectAnswer {
            response: take("response")?,
        }),
        ResultKind::ConversationAnalysis => {
            StructuredResult::ConversationAnalysis(ConversationAnalysis {
                analysis: take("analysis")?,
            })
        }
        ResultKind::StructuredExtraction => StructuredResult::StructuredExtraction(DiscoSummary {
            decision_criteria: take("Decision_Criteria")?,
            impact: take("Impact")?,
            situation: take("Situation")?,
            challenges: take("Challenges")?,
            objectives: take("Objectives")?,
        }),
        ResultKind::ActionItemExtraction => StructuredResult::ActionItemExtraction(ActionPlan {
            follow_up_actions: take("followUpActions")?,
            information_gathering: take("informationGathering")?,
            stakeholder_engagement: take("stakeholderEngagement")?,
            proposal_preparation: take("proposalPreparation")?,
            internal_coordination: take("internalCoordination")?,
            timeline_management: take("timelineManagement")?,
        }),
    };
    Ok(result)
}

/// Text of a field, or `None` when it is absent or falsy
/// (`null`, `false`, `0`, `""`, or a list with no text in it).
fn field_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null | Value::Bool(false) => return None,
        Value::Bool(true) => "true".to_string(),
        Value::Number(n) if n.as_f64() == Some(0.0) => return None,
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Bullet lists sometimes come back as arrays instead of one string.
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => value?.to_string(),
    };
    (!text.is_empty()).then_some(text)
}
