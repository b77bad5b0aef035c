use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hearth_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoOpAuditSink};
use hearth_core::compliance;
use hearth_core::config::EngineConfig;
use hearth_core::conversation::{
    ConversationState, HandoffContext, JourneyStage, Message, NextAction, PropertyCandidate,
    QualificationStep, StageUpdate, UrgencyLevel,
};
use hearth_core::errors::{EngineError, ViolationCategory};
use hearth_core::financial::{estimate_affordability, AssessmentOutcome, FinancialAssessor};
use hearth_core::intent::IntentScorer;
use hearth_core::objections;
use hearth_core::optout;
use hearth_core::workflow::{transition, FlowAction, FlowEvent};

use crate::collaborators::{CrmClient, EventBus, Notification, PropertyMatcher, TextGenerator};
use crate::escalation::{escalate_compliance, escalate_to_human, ComplianceLog, InMemoryComplianceLog};
use crate::fallback;
use crate::matching::match_properties;
use crate::response::{self, MarketIntelligence};
use crate::retry::RetryPolicy;

/// One inbound turn. History is caller supplied and append only; the final
/// state comes back in the result for the caller to persist.
#[derive(Clone, Debug, Default)]
pub struct ProcessRequest {
    pub conversation_id: String,
    pub message: String,
    pub buyer_name: Option<String>,
    pub history: Vec<Message>,
    pub handoff: Option<HandoffContext>,
    pub intelligence: Option<MarketIntelligence>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnResult {
    pub conversation_id: String,
    pub response_text: String,
    pub is_qualified: bool,
    pub financial_readiness_score: f64,
    pub motivation_score: f64,
    pub matched_candidates: Vec<PropertyCandidate>,
    pub next_action: NextAction,
    pub opt_out_detected: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub handoff_signals: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ConversationState,
}

const SCHEDULING_MESSAGE: &str =
    "You sound ready! Let's set up a property tour. Would a weekday evening or a weekend morning work better for an appointment?";

/// The qualification workflow engine.
///
/// Stages run strictly in order within a turn; conversations are fully
/// independent, so one engine value is shared across tasks and only the
/// collaborators and the pause set are shared state.
pub struct QualificationEngine {
    config: EngineConfig,
    scorer: IntentScorer,
    assessor: FinancialAssessor,
    generator: Arc<dyn TextGenerator>,
    matcher: Arc<dyn PropertyMatcher>,
    crm: Arc<dyn CrmClient>,
    bus: Arc<dyn EventBus>,
    compliance_log: Arc<dyn ComplianceLog>,
    audit: Arc<dyn AuditSink>,
    paused: Mutex<BTreeSet<String>>,
}

impl QualificationEngine {
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn TextGenerator>,
        matcher: Arc<dyn PropertyMatcher>,
        crm: Arc<dyn CrmClient>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let assessor = FinancialAssessor::new(config.qualification.clone());
        Self {
            config,
            scorer: IntentScorer::default(),
            assessor,
            generator,
            matcher,
            crm,
            bus,
            compliance_log: Arc::new(InMemoryComplianceLog::default()),
            audit: Arc::new(NoOpAuditSink),
            paused: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_compliance_log(mut self, log: Arc<dyn ComplianceLog>) -> Self {
        self.compliance_log = log;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn is_paused(&self, conversation_id: &str) -> bool {
        match self.paused.lock() {
            Ok(paused) => paused.contains(conversation_id),
            Err(poisoned) => poisoned.into_inner().contains(conversation_id),
        }
    }

    /// A human clears the compliance hold; automated replies resume.
    pub fn clear_pause(&self, conversation_id: &str) {
        match self.paused.lock() {
            Ok(mut paused) => {
                paused.remove(conversation_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(conversation_id);
            }
        }
    }

    fn pause(&self, conversation_id: &str) {
        match self.paused.lock() {
            Ok(mut paused) => {
                paused.insert(conversation_id.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(conversation_id.to_string());
            }
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    /// Single entry point: run one conversation turn through the pipeline.
    pub async fn process(&self, request: ProcessRequest) -> TurnResult {
        let correlation_id = Uuid::new_v4().simple().to_string();

        if request.conversation_id.trim().is_empty() {
            let error = EngineError::Validation("conversation_id must not be empty".to_owned());
            return self.failure_result(request, error, correlation_id);
        }

        // The opt out gate is absolute: it runs before any state mutation,
        // any scoring, and any model call.
        if optout::check(&request.message) {
            return self.opt_out_result(request, correlation_id).await;
        }

        if self.is_paused(&request.conversation_id) {
            debug!(conversation_id = %request.conversation_id, "conversation paused for compliance hold");
            let mut state =
                ConversationState::new(request.conversation_id.clone(), request.buyer_name.clone());
            state.history = request.history.clone();
            state.journey_stage = JourneyStage::Paused;
            let mut handoff_signals = BTreeMap::new();
            handoff_signals.insert("compliance_hold".to_string(), "active".to_string());
            return TurnResult {
                conversation_id: request.conversation_id,
                response_text: String::new(),
                is_qualified: false,
                financial_readiness_score: 0.0,
                motivation_score: 0.0,
                matched_candidates: Vec::new(),
                next_action: NextAction::QualifyMore,
                opt_out_detected: false,
                handoff_signals,
                error: None,
                state,
            };
        }

        if let Some(category) = compliance::scan(&request.message) {
            return self.compliance_result(request, category, correlation_id).await;
        }

        self.emit_audit(
            Some(&request.conversation_id),
            &correlation_id,
            "turn.received",
            AuditCategory::Ingress,
            AuditOutcome::Success,
            &[("message_chars", request.message.chars().count().to_string())],
        );

        let mut state =
            ConversationState::new(request.conversation_id.clone(), request.buyer_name.clone());
        state.history = request.history.clone();
        state.handoff = request.handoff.clone();
        state.history.push(Message::buyer(request.message.clone()));
        state.journey_stage = JourneyStage::Qualifying;

        let mut handoff_signals: BTreeMap<String, String> = BTreeMap::new();
        let mut turn_error: Option<EngineError> = None;

        // Intent scoring: pure and synchronous.
        let profile = self.scorer.score(&state.buyer_text());
        let motivation = profile.urgency_composite;
        let urgency = urgency_level(profile.urgency_composite);
        self.emit_audit(
            Some(&state.conversation_id),
            &correlation_id,
            "intent.scored",
            AuditCategory::Intent,
            AuditOutcome::Success,
            &[
                ("overall", format!("{:.1}", profile.overall)),
                ("temperature", profile.temperature.as_str().to_string()),
            ],
        );
        self.publish_best_effort(Notification::IntentAnalyzed {
            conversation_id: state.conversation_id.clone(),
            overall: profile.overall,
            temperature: profile.temperature.as_str().to_string(),
        })
        .await;
        state.apply(StageUpdate {
            intent: Some(profile),
            motivation_score: Some(motivation),
            urgency: Some(urgency),
            ..StageUpdate::default()
        });

        // Financial assessment; failure falls through the tiered safety net
        // instead of aborting the turn.
        let assessment = match self.assessor.try_assess(&state) {
            Ok(outcome) => outcome,
            Err(assessment_error) => {
                warn!(conversation_id = %state.conversation_id, %assessment_error, "assessment failed, applying fallback tiers");
                self.emit_audit(
                    Some(&state.conversation_id),
                    &correlation_id,
                    "assessment.fallback_applied",
                    AuditCategory::Resilience,
                    AuditOutcome::Failed,
                    &[("error_class", assessment_error.error_class().to_string())],
                );
                let recovered =
                    fallback::assess_from_text(&state.buyer_text(), &self.config.qualification);
                if recovered.requires_manual_review {
                    handoff_signals.insert("manual_review".to_string(), "true".to_string());
                }
                state.apply(StageUpdate {
                    requires_manual_review: Some(recovered.requires_manual_review),
                    ..StageUpdate::default()
                });
                AssessmentOutcome {
                    budget: recovered.budget,
                    financing_status: recovered.financing_status,
                    financial_readiness_score: recovered.financial_readiness_score,
                    step: QualificationStep::Budget,
                }
            }
        };
        state.apply(StageUpdate {
            budget: assessment.budget,
            financing_status: Some(assessment.financing_status),
            financial_readiness_score: Some(assessment.financial_readiness_score),
            step: Some(assessment.step),
            ..StageUpdate::default()
        });

        // Route the turn. A freshly raised objection preempts everything.
        let objection = objections::detect(&request.message);
        let mut strategy = None;
        if let Some(category) = objection {
            if let Ok(outcome) = transition(state.step, &FlowEvent::ObjectionRaised) {
                state.apply(StageUpdate {
                    step: Some(outcome.to),
                    objection_raised: Some(category),
                    ..StageUpdate::default()
                });
            }
            let affordability =
                state.budget.map(|budget| estimate_affordability(budget.max, &self.config.finance));
            let handled = objections::handle(&state, affordability.as_ref());
            strategy = handled.strategy;
            state.apply(StageUpdate {
                objection_record: handled.record,
                ..StageUpdate::default()
            });
            self.emit_audit(
                Some(&state.conversation_id),
                &correlation_id,
                "objection.handled",
                AuditCategory::Objection,
                AuditOutcome::Success,
                &[("category", category.as_str().to_string())],
            );
        } else {
            let event = FlowEvent::AssessmentCompleted { budget_known: state.budget.is_some() };
            let run_search = match transition(state.step, &event) {
                Ok(outcome) => {
                    let run = outcome.actions.contains(&FlowAction::RunPropertySearch);
                    state.apply(StageUpdate { step: Some(outcome.to), ..StageUpdate::default() });
                    run
                }
                Err(transition_error) => {
                    warn!(conversation_id = %state.conversation_id, %transition_error, "flow rejected assessment event");
                    false
                }
            };

            if run_search {
                match match_properties(
                    self.matcher.as_ref(),
                    self.bus.as_ref(),
                    &state,
                    &self.retry_policy(),
                    Duration::from_secs(self.config.matcher.timeout_secs),
                    self.config.matcher.result_limit,
                )
                .await
                {
                    Ok(outcome) => {
                        let count = outcome.candidates.len();
                        self.emit_audit(
                            Some(&state.conversation_id),
                            &correlation_id,
                            "matching.completed",
                            AuditCategory::Matching,
                            AuditOutcome::Success,
                            &[("matches", count.to_string())],
                        );
                        state.apply(StageUpdate {
                            matched_candidates: Some(outcome.candidates),
                            next_action: Some(outcome.next_action),
                            journey_stage: (count > 0).then_some(JourneyStage::Matched),
                            ..StageUpdate::default()
                        });
                        let match_event = if count > 0 {
                            FlowEvent::MatchesFound { count }
                        } else {
                            FlowEvent::NoMatches
                        };
                        if let Ok(outcome) = transition(state.step, &match_event) {
                            state.apply(StageUpdate {
                                step: Some(outcome.to),
                                ..StageUpdate::default()
                            });
                        }
                    }
                    Err(matcher_error) => {
                        // Retries are exhausted; hand the case to a human
                        // and keep a user visible reply.
                        turn_error = Some(matcher_error.clone());
                        let ticket = escalate_to_human(
                            self.crm.as_ref(),
                            self.bus.as_ref(),
                            &state.conversation_id,
                            &matcher_error.to_string(),
                        )
                        .await;
                        self.emit_audit(
                            Some(&state.conversation_id),
                            &correlation_id,
                            "matching.escalated",
                            AuditCategory::Resilience,
                            AuditOutcome::Failed,
                            &[
                                ("ticket", ticket.id.clone()),
                                ("status", ticket.status.as_str().to_string()),
                            ],
                        );
                        handoff_signals
                            .insert("escalation_ticket".to_string(), ticket.id.clone());
                        handoff_signals.insert(
                            "escalation_status".to_string(),
                            ticket.status.as_str().to_string(),
                        );
                        state.apply(StageUpdate {
                            step: Some(QualificationStep::Error),
                            response_text: Some(matcher_error.user_message().to_string()),
                            next_action: Some(NextAction::Respond),
                            ..StageUpdate::default()
                        });
                    }
                }
            }
        }

        // Hot path: a high enough readiness score jumps straight to
        // scheduling, but never clobbers a reply another stage produced and
        // never outranks a pending objection.
        let hot = objection.is_none()
            && state.financial_readiness_score >= self.config.qualification.hot_threshold
            && state.step != QualificationStep::Error;
        if hot {
            if let Ok(outcome) = transition(state.step, &FlowEvent::HotLeadDetected) {
                state.apply(StageUpdate {
                    step: Some(outcome.to),
                    next_action: Some(NextAction::SchedulePropertyTour),
                    response_text: Some(SCHEDULING_MESSAGE.to_string()),
                    journey_stage: Some(JourneyStage::TourScheduled),
                    ..StageUpdate::default()
                });
                handoff_signals.insert("hot_lead".to_string(), "true".to_string());
                self.publish_best_effort(Notification::FollowUpScheduled {
                    conversation_id: state.conversation_id.clone(),
                    reason: "hot lead tour scheduling".to_string(),
                })
                .await;
                self.publish_best_effort(Notification::QualificationCompleted {
                    conversation_id: state.conversation_id.clone(),
                    financial_readiness_score: state.financial_readiness_score,
                })
                .await;
            }
        }

        // Response generation never fails; at worst it rotates through the
        // canned fallbacks.
        if state.response_text.is_none() {
            let reply = response::generate(
                self.generator.as_ref(),
                &self.retry_policy(),
                Duration::from_secs(self.config.llm.timeout_secs),
                &state,
                strategy.as_ref(),
                request.intelligence.as_ref(),
                &self.config.qualification,
            )
            .await;
            self.emit_audit(
                Some(&state.conversation_id),
                &correlation_id,
                "response.generated",
                AuditCategory::Response,
                if reply.used_fallback { AuditOutcome::Failed } else { AuditOutcome::Success },
                &[("fallback", reply.used_fallback.to_string())],
            );
            let next_action = state.next_action.unwrap_or(reply.next_action);
            state.apply(StageUpdate {
                response_text: Some(reply.text),
                next_action: Some(next_action),
                ..StageUpdate::default()
            });
        }

        let is_qualified = state.is_qualified(self.config.qualification.qualify_threshold);
        if is_qualified && !hot {
            self.publish_best_effort(Notification::QualificationCompleted {
                conversation_id: state.conversation_id.clone(),
                financial_readiness_score: state.financial_readiness_score,
            })
            .await;
        }

        let response_text = response::sanitize(
            state.response_text.as_deref().unwrap_or(""),
            self.config.qualification.reply_hard_limit,
        );
        let next_action = state.next_action.unwrap_or(NextAction::Respond);

        info!(
            conversation_id = %state.conversation_id,
            step = state.step.as_str(),
            next_action = next_action.as_str(),
            is_qualified,
            "turn completed"
        );

        TurnResult {
            conversation_id: state.conversation_id.clone(),
            response_text,
            is_qualified,
            financial_readiness_score: state.financial_readiness_score,
            motivation_score: state.motivation_score,
            matched_candidates: state.matched_candidates.clone(),
            next_action,
            opt_out_detected: false,
            handoff_signals,
            error: turn_error.map(|error| error.to_string()),
            state,
        }
    }

    async fn opt_out_result(&self, request: ProcessRequest, correlation_id: String) -> TurnResult {
        info!(conversation_id = %request.conversation_id, "opt out detected, short circuiting");
        if self.config.crm.enabled {
            if let Err(crm_error) = self
                .crm
                .add_tags(&request.conversation_id, &[optout::OPT_OUT_TAG.to_string()])
                .await
            {
                warn!(conversation_id = %request.conversation_id, %crm_error, "opt out tag write failed");
            }
        }
        self.emit_audit(
            Some(&request.conversation_id),
            &correlation_id,
            "optout.detected",
            AuditCategory::Ingress,
            AuditOutcome::Success,
            &[],
        );

        let mut state =
            ConversationState::new(request.conversation_id.clone(), request.buyer_name);
        state.history = request.history;
        state.opted_out = true;
        state.response_text = Some(optout::OPT_OUT_CONFIRMATION.to_string());

        TurnResult {
            conversation_id: request.conversation_id,
            response_text: optout::OPT_OUT_CONFIRMATION.to_string(),
            is_qualified: false,
            financial_readiness_score: 0.0,
            motivation_score: 0.0,
            matched_candidates: Vec::new(),
            next_action: NextAction::Respond,
            opt_out_detected: true,
            handoff_signals: BTreeMap::new(),
            error: None,
            state,
        }
    }

    async fn compliance_result(
        &self,
        request: ProcessRequest,
        category: ViolationCategory,
        correlation_id: String,
    ) -> TurnResult {
        let outcome = escalate_compliance(
            self.compliance_log.as_ref(),
            self.crm.as_ref(),
            self.bus.as_ref(),
            &request.conversation_id,
            category,
            "detected in inbound message",
        )
        .await;
        if outcome.bot_paused {
            self.pause(&request.conversation_id);
        }
        self.emit_audit(
            Some(&request.conversation_id),
            &correlation_id,
            "compliance.escalated",
            AuditCategory::Compliance,
            AuditOutcome::Rejected,
            &[
                ("category", category.as_str().to_string()),
                ("status", outcome.ticket.status.as_str().to_string()),
            ],
        );

        let mut handoff_signals = BTreeMap::new();
        handoff_signals.insert("compliance_violation".to_string(), category.as_str().to_string());
        handoff_signals
            .insert("escalation_status".to_string(), outcome.ticket.status.as_str().to_string());
        handoff_signals.insert("escalation_ticket".to_string(), outcome.ticket.id.clone());
        if outcome.bot_paused {
            handoff_signals.insert("bot_paused".to_string(), "true".to_string());
        }

        let mut state =
            ConversationState::new(request.conversation_id.clone(), request.buyer_name);
        state.history = request.history;
        state.journey_stage =
            if outcome.bot_paused { JourneyStage::Paused } else { JourneyStage::Qualifying };
        let reply = EngineError::PolicyViolation(category).user_message().to_string();
        state.response_text = Some(reply.clone());

        TurnResult {
            conversation_id: request.conversation_id,
            response_text: reply,
            is_qualified: false,
            financial_readiness_score: 0.0,
            motivation_score: 0.0,
            matched_candidates: Vec::new(),
            next_action: NextAction::Respond,
            opt_out_detected: false,
            handoff_signals,
            error: None,
            state,
        }
    }

    fn failure_result(
        &self,
        request: ProcessRequest,
        error: EngineError,
        correlation_id: String,
    ) -> TurnResult {
        self.emit_audit(
            None,
            &correlation_id,
            "turn.rejected",
            AuditCategory::Ingress,
            AuditOutcome::Rejected,
            &[("error_class", error.error_class().to_string())],
        );
        let mut state =
            ConversationState::new(request.conversation_id.clone(), request.buyer_name);
        state.history = request.history;
        state.step = QualificationStep::Error;

        TurnResult {
            conversation_id: request.conversation_id,
            response_text: error.user_message().to_string(),
            is_qualified: false,
            financial_readiness_score: 0.0,
            motivation_score: 0.0,
            matched_candidates: Vec::new(),
            next_action: NextAction::Respond,
            opt_out_detected: false,
            handoff_signals: BTreeMap::new(),
            error: Some(error.to_string()),
            state,
        }
    }

    async fn publish_best_effort(&self, notification: Notification) {
        if let Err(publish_error) = self.bus.publish(notification).await {
            warn!(%publish_error, "event bus publish lost");
        }
    }

    fn emit_audit(
        &self,
        conversation_id: Option<&str>,
        correlation_id: &str,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: &[(&str, String)],
    ) {
        let mut event = AuditEvent::new(
            conversation_id.map(str::to_string),
            correlation_id,
            event_type,
            category,
            "qualification_engine",
            outcome,
        );
        for (key, value) in metadata {
            event = event.with_metadata(*key, value.clone());
        }
        self.audit.emit(event);
    }
}

/// Map the urgency composite onto the coarse urgency ladder.
fn urgency_level(urgency_composite: f64) -> UrgencyLevel {
    if urgency_composite >= 75.0 {
        UrgencyLevel::Immediate
    } else if urgency_composite >= 55.0 {
        UrgencyLevel::ThreeMonths
    } else if urgency_composite >= 40.0 {
        UrgencyLevel::SixMonths
    } else {
        UrgencyLevel::Browsing
    }
}

#[cfg(test)]
mod tests {
    use super::urgency_level;
    use hearth_core::conversation::UrgencyLevel;

    #[test]
    fn urgency_ladder_boundaries() {
        assert_eq!(urgency_level(10.0), UrgencyLevel::Browsing);
        assert_eq!(urgency_level(40.0), UrgencyLevel::SixMonths);
        assert_eq!(urgency_level(55.0), UrgencyLevel::ThreeMonths);
        assert_eq!(urgency_level(75.0), UrgencyLevel::Immediate);
    }
}
