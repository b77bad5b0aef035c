use std::sync::Arc;

use hearth_agent::collaborators::{
    GeneratedReply, InMemoryCrm, InMemoryMatcher, Notification, RecordingBus, ScriptedGenerator,
};
use hearth_agent::engine::{ProcessRequest, QualificationEngine};
use hearth_agent::escalation::InMemoryComplianceLog;
use hearth_core::config::EngineConfig;
use hearth_core::conversation::{Message, NextAction, PropertyCandidate, QualificationStep};

struct Harness {
    engine: QualificationEngine,
    generator: Arc<ScriptedGenerator>,
    matcher: Arc<InMemoryMatcher>,
    crm: Arc<InMemoryCrm>,
    bus: Arc<RecordingBus>,
    compliance_log: Arc<InMemoryComplianceLog>,
}

fn listing(id: &str, price: i64) -> PropertyCandidate {
    PropertyCandidate {
        listing_id: id.to_string(),
        address: format!("{id} Maple St"),
        price,
        bedrooms: 4,
        features: vec!["yard".to_string()],
    }
}

fn harness() -> Harness {
    let mut config = EngineConfig::default();
    // Keep backoff out of test wall clock time.
    config.retry.initial_backoff_ms = 1;
    config.retry.max_retries = 2;

    let generator = Arc::new(ScriptedGenerator::default());
    let matcher = Arc::new(InMemoryMatcher::with_inventory(vec![
        listing("101", 430_000),
        listing("102", 585_000),
        listing("103", 610_000),
    ]));
    let crm = Arc::new(InMemoryCrm::default());
    let bus = Arc::new(RecordingBus::default());
    let compliance_log = Arc::new(InMemoryComplianceLog::default());

    let engine = QualificationEngine::new(
        config,
        generator.clone(),
        matcher.clone(),
        crm.clone(),
        bus.clone(),
    )
    .with_compliance_log(compliance_log.clone());

    Harness { engine, generator, matcher, crm, bus, compliance_log }
}

fn request(conversation_id: &str, message: &str) -> ProcessRequest {
    ProcessRequest {
        conversation_id: conversation_id.to_string(),
        message: message.to_string(),
        buyer_name: Some("Jordan".to_string()),
        ..ProcessRequest::default()
    }
}

#[tokio::test]
async fn pre_approved_buyer_with_budget_is_qualified_without_error() {
    let harness = harness();
    let result = harness
        .engine
        .process(request(
            "conv-e2e-1",
            "I'm pre-approved for $625k and ready to tour homes this weekend",
        ))
        .await;

    assert!(result.is_qualified);
    assert!(result.financial_readiness_score >= 80.0);
    assert!(result.error.is_none());
    assert!(matches!(
        result.next_action,
        NextAction::SchedulePropertyTour | NextAction::Respond
    ));
    assert!(!result.response_text.is_empty());
    assert!(!result.response_text.contains('-'));
    assert!(result.response_text.chars().count() <= 320);
    // Pre approval at 85 clears the hot threshold, so scheduling wins.
    assert_eq!(result.next_action, NextAction::SchedulePropertyTour);
    let lowered = result.response_text.to_lowercase();
    assert!(lowered.contains("tour") || lowered.contains("appointment"), "{lowered}");
    assert_eq!(result.state.step, QualificationStep::Appointment);
    assert_eq!(result.state.budget.expect("budget").max, 625_000);
}

#[tokio::test]
async fn opt_out_short_circuits_every_downstream_stage() {
    let harness = harness();
    for (index, message) in ["stop", "Unsubscribe", "not interested, thanks"].iter().enumerate() {
        let conversation_id = format!("conv-optout-{index}");
        let result = harness.engine.process(request(&conversation_id, message)).await;

        assert!(result.opt_out_detected, "expected opt out for {message:?}");
        assert!(result.response_text.contains("unsubscribed"));
        assert!(result.response_text.len() <= 160);
        assert!(result.state.opted_out);
        assert_eq!(harness.crm.tags_for(&conversation_id), vec!["opted_out".to_string()]);
    }
    // No scoring, no matching, no generation ever ran.
    assert_eq!(harness.generator.calls(), 0);
    assert_eq!(harness.matcher.calls(), 0);
    assert!(harness.bus.published().is_empty());
}

#[tokio::test]
async fn budget_and_matches_flow_through_to_the_reply() {
    let harness = harness();
    harness
        .generator
        .push(Ok(GeneratedReply::Text("Found some great homes in your range!".to_string())));

    let result = harness
        .engine
        .process(request("conv-match", "We are looking around $600k, paying cash"))
        .await;

    assert!(result.is_qualified);
    assert!(!result.matched_candidates.is_empty());
    assert!(result.matched_candidates.iter().all(|candidate| candidate.price <= 600_000));
    // A match update notification was observed on the bus.
    assert!(harness
        .bus
        .published()
        .iter()
        .any(|notification| matches!(notification, Notification::MatchUpdate { .. })));
}

#[tokio::test]
async fn missing_budget_routes_to_qualify_more() {
    let harness = harness();
    let result = harness
        .engine
        .process(request("conv-nobudget", "hi, we want to buy a house with a nice yard"))
        .await;

    assert!(!result.is_qualified);
    assert!(result.matched_candidates.is_empty());
    assert_eq!(harness.matcher.calls(), 0);
    assert_eq!(result.state.step, QualificationStep::Budget);
    assert!(!result.response_text.is_empty());
}

#[tokio::test]
async fn generator_failure_still_yields_a_reply() {
    let harness = harness();
    // Exhaust the retry budget (max_retries = 2 means three attempts).
    for _ in 0..3 {
        harness
            .generator
            .push(Err(hearth_core::errors::EngineError::upstream("llm", "500")));
    }

    let result = harness
        .engine
        .process(request("conv-llmdown", "we want a 3 bedroom around 450k"))
        .await;

    assert!(result.error.is_none(), "generator failure is absorbed by fallback replies");
    assert!(!result.response_text.is_empty());
    assert!(!result.response_text.contains('-'));
    assert_eq!(harness.generator.calls(), 3);
}

#[tokio::test]
async fn matcher_outage_escalates_to_a_human_with_an_apology() {
    let harness = harness();
    // More failures than the retry budget can absorb.
    harness.matcher.fail_next(10);

    let result = harness
        .engine
        .process(request("conv-matcherdown", "cash offer, budget $600k"))
        .await;

    assert!(result.error.is_some());
    assert!(!result.response_text.is_empty());
    assert!(!result.response_text.to_lowercase().contains("upstream"), "no raw technical text");
    assert_eq!(result.state.step, QualificationStep::Error);
    assert_eq!(
        result.handoff_signals.get("escalation_status").map(String::as_str),
        Some("escalated")
    );
    assert!(harness.crm.tags_for("conv-matcherdown").contains(&"needs_human".to_string()));
}

#[tokio::test]
async fn price_objection_is_recorded_and_shapes_the_turn() {
    let harness = harness();
    let mut req = request("conv-objection", "honestly these homes are way too much for us");
    req.history = vec![
        Message::buyer("we are pre-approved for $500k"),
        Message::agent("Great, want to see a few?"),
    ];

    let result = harness.engine.process(req).await;

    assert_eq!(result.state.objection.history.len(), 1);
    assert_eq!(
        result.state.objection.history[0].category,
        hearth_core::conversation::ObjectionCategory::PriceShock
    );
    assert!(!result.response_text.is_empty());
}

#[tokio::test]
async fn fair_housing_message_pauses_the_conversation_until_cleared() {
    let harness = harness();
    let result = harness
        .engine
        .process(request("conv-compliance", "please make sure it's adults only, no kids around"))
        .await;

    assert_eq!(
        result.handoff_signals.get("compliance_violation").map(String::as_str),
        Some("fair_housing")
    );
    assert_eq!(result.handoff_signals.get("bot_paused").map(String::as_str), Some("true"));
    assert_eq!(harness.compliance_log.events().len(), 1);
    assert!(harness.crm.tags_for("conv-compliance").contains(&"compliance_hold".to_string()));

    // The next turn is held while the pause is active.
    let held = harness.engine.process(request("conv-compliance", "hello?")).await;
    assert!(held.response_text.is_empty());
    assert_eq!(
        held.handoff_signals.get("compliance_hold").map(String::as_str),
        Some("active")
    );

    // A human clears the hold and the pipeline resumes.
    harness.engine.clear_pause("conv-compliance");
    let resumed = harness.engine.process(request("conv-compliance", "sorry about that")).await;
    assert!(!resumed.response_text.is_empty());
}

#[tokio::test]
async fn validation_failure_returns_an_error_with_a_safe_reply() {
    let harness = harness();
    let result = harness.engine.process(request("", "hello")).await;

    assert!(result.error.is_some());
    assert!(!result.response_text.is_empty());
    assert!(!result.response_text.contains('-'));
    assert_eq!(result.state.step, QualificationStep::Error);
}

#[tokio::test]
async fn turn_result_serializes_with_optional_fields_elided() {
    let harness = harness();
    let result = harness
        .engine
        .process(request("conv-serde", "we are pre-approved for $625k and ready this weekend"))
        .await;

    let value = serde_json::to_value(&result).expect("serialize");
    assert_eq!(value["conversation_id"], "conv-serde");
    assert!(value.get("error").is_none(), "error field elided on success");
    assert_eq!(value["state"]["conversation_id"], "conv-serde");
}
