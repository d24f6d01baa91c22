use callpilot::consts::SENTINEL;
use callpilot::error::ErrorKind;
use callpilot::model::{ResultKind, StructuredResult};
use callpilot::normalize::{ReplySource, normalize, sanitize};

fn disco(raw: &str) -> callpilot::model::DiscoSummary {
    match normalize(ResultKind::StructuredExtraction, raw, ReplySource::SingleShot).unwrap() {
        StructuredResult::StructuredExtraction(summary) => summary,
        other => panic!("expected DISCO summary, got {other:?}"),
    }
}

// ── Sanitation ────────────────────────────────────────────────────

#[test]
fn sanitize_removes_every_citation() {
    let inputs = [
        "Lead with ROI【4:0†SALLY Demo - Google Docs1.pdf】.",
        "Ask [1] about [2:3†pricing.docx] budget [x].",
        "【a】【b】[c][d] done",
        "nested 【outer [inner] still】 end",
        "[a 【b] c】 tail",
    ];
    for input in inputs {
        let out = sanitize(input);
        let has_lenticular = out
            .find('【')
            .is_some_and(|open| out[open..].contains('】'));
        let has_square = out.find('[').is_some_and(|open| out[open..].contains(']'));
        assert!(!has_lenticular, "lenticular pair left in {out:?}");
        assert!(!has_square, "square pair left in {out:?}");
    }
}

#[test]
fn sanitize_output_has_single_spaces() {
    let out = sanitize("Qualify  【1†a】  the\n\n buyer [2]\t now ");
    assert_eq!(out, "Qualify the buyer now");
}

// ── Default-fill kinds ────────────────────────────────────────────

#[test]
fn missing_impact_is_sentinel_and_others_verbatim() {
    let summary = disco(
        r#"{"Decision_Criteria": "• latency\n• on-prem", "Situation": "• Salesforce",
            "Challenges": "• data silos", "Objectives": "• pilot in Q3"}"#,
    );
    assert_eq!(summary.impact, SENTINEL);
    assert_eq!(summary.decision_criteria, "• latency\n• on-prem");
    assert_eq!(summary.situation, "• Salesforce");
    assert_eq!(summary.challenges, "• data silos");
    assert_eq!(summary.objectives, "• pilot in Q3");
}

#[test]
fn empty_and_null_fields_are_filled() {
    let summary = disco(r#"{"Impact": "", "Situation": null, "Objectives": false}"#);
    assert_eq!(summary.impact, SENTINEL);
    assert_eq!(summary.situation, SENTINEL);
    assert_eq!(summary.objectives, SENTINEL);
}

#[test]
fn unknown_fields_are_discarded() {
    let result = normalize(
        ResultKind::StructuredExtraction,
        r#"{"Impact": "churn", "Budget": "50k"}"#,
        ReplySource::SingleShot,
    )
    .unwrap();
    let value = serde_json::to_value(&result).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 5);
    assert!(!object.contains_key("Budget"));
}

#[test]
fn action_plan_fills_all_six_categories() {
    let result = normalize(
        ResultKind::ActionItemExtraction,
        r#"Here you go: {"followUpActions": "• send deck", "timelineManagement": "• demo Friday"}"#,
        ReplySource::SingleShot,
    )
    .unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["followUpActions"], "• send deck");
    assert_eq!(value["timelineManagement"], "• demo Friday");
    for key in [
        "informationGathering",
        "stakeholderEngagement",
        "proposalPreparation",
        "internalCoordination",
    ] {
        assert_eq!(value[key], SENTINEL, "{key}");
    }
}

#[test]
fn default_fill_kind_without_json_is_malformed() {
    let err = normalize(
        ResultKind::ActionItemExtraction,
        "I could not find any action items.",
        ReplySource::SingleShot,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutputMalformed);
}

// ── Strict kinds ──────────────────────────────────────────────────

#[test]
fn direct_answer_prose_falls_back_to_full_text() {
    let result = normalize(
        ResultKind::DirectAnswer,
        "Acknowledge the concern,【3:1†playbook.pdf】 then  reframe around ROI.",
        ReplySource::Job,
    )
    .unwrap();
    assert_eq!(
        result,
        StructuredResult::DirectAnswer(callpilot::model::DirectAnswer {
            response: "Acknowledge the concern, then reframe around ROI.".to_string()
        })
    );
}

#[test]
fn direct_answer_json_is_parsed_after_sanitation() {
    let result = normalize(
        ResultKind::DirectAnswer,
        r#"{"response": "Ask who signs off [1†notes]."}"#,
        ReplySource::Job,
    )
    .unwrap();
    match result {
        StructuredResult::DirectAnswer(answer) => {
            assert_eq!(answer.response, "Ask who signs off .")
        }
        other => panic!("expected answer, got {other:?}"),
    }
}

#[test]
fn direct_answer_json_without_response_is_missing() {
    let err = normalize(
        ResultKind::DirectAnswer,
        r#"{"answer": "wrong key"}"#,
        ReplySource::Job,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutputMissing);
    assert!(err.message.contains("response"));
}

#[test]
fn analysis_without_field_is_missing() {
    let err = normalize(
        ResultKind::ConversationAnalysis,
        r#"{"insights": "- ask about GPUs"}"#,
        ReplySource::SingleShot,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutputMissing);
    assert!(err.message.contains("analysis"));
}

#[test]
fn analysis_with_empty_field_is_missing() {
    let err = normalize(
        ResultKind::ConversationAnalysis,
        r#"{"analysis": ""}"#,
        ReplySource::SingleShot,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutputMissing);
}

#[test]
fn analysis_inside_fenced_block() {
    let raw = "```json\n{\"analysis\": \"- Clarify workload sizing\\n- Ask about GDPR\"}\n```";
    let result = normalize(ResultKind::ConversationAnalysis, raw, ReplySource::SingleShot).unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["analysis"], "- Clarify workload sizing\n- Ask about GDPR");
}

#[test]
fn two_objects_in_one_reply_are_malformed() {
    let err = normalize(
        ResultKind::ConversationAnalysis,
        r#"{"analysis": "- a"} and also {"analysis": "- b"}"#,
        ReplySource::SingleShot,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutputMalformed);
}
