use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::IntentProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Agent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn buyer(text: impl Into<String>) -> Self {
        Self { role: Role::Buyer, text: text.into() }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self { role: Role::Agent, text: text.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingStatus {
    #[default]
    Unknown,
    NeedsApproval,
    PreApproved,
    Cash,
    AssessmentError,
    AssessmentPending,
}

impl FinancingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NeedsApproval => "needs_approval",
            Self::PreApproved => "pre_approved",
            Self::Cash => "cash",
            Self::AssessmentError => "assessment_error",
            Self::AssessmentPending => "assessment_pending",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    #[default]
    Browsing,
    ThreeMonths,
    SixMonths,
    Immediate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStep {
    #[default]
    Budget,
    Timeline,
    Preferences,
    DecisionMakers,
    PropertySearch,
    ObjectionHandling,
    Appointment,
    Error,
}

impl QualificationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Timeline => "timeline",
            Self::Preferences => "preferences",
            Self::DecisionMakers => "decision_makers",
            Self::PropertySearch => "property_search",
            Self::ObjectionHandling => "objection_handling",
            Self::Appointment => "appointment",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStage {
    #[default]
    Inquiry,
    Qualifying,
    Matched,
    TourScheduled,
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Respond,
    QualifyMore,
    EducateMarket,
    SchedulePropertyTour,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::QualifyMore => "qualify_more",
            Self::EducateMarket => "educate_market",
            Self::SchedulePropertyTour => "schedule_property_tour",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectionCategory {
    PriceShock,
    AnalysisParalysis,
    SharedDecision,
    Timing,
    LowCommitment,
    Other,
}

impl ObjectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceShock => "price_shock",
            Self::AnalysisParalysis => "analysis_paralysis",
            Self::SharedDecision => "shared_decision",
            Self::Timing => "timing",
            Self::LowCommitment => "low_commitment",
            Self::Other => "other",
        }
    }

    pub fn is_price_related(&self) -> bool {
        matches!(self, Self::PriceShock)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionRecord {
    pub category: ObjectionCategory,
    pub raised_at: DateTime<Utc>,
}

/// Current objection plus the full append only history of prior ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionState {
    pub current: Option<ObjectionCategory>,
    pub history: Vec<ObjectionRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCandidate {
    pub listing_id: String,
    pub address: String,
    pub price: i64,
    pub bedrooms: u8,
    pub features: Vec<String>,
}

/// Trusted context handed over from another bot or a human agent. When
/// present, financial assessment echoes these values back instead of
/// recomputing them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffContext {
    pub source: String,
    pub financing_status: FinancingStatus,
    pub financial_readiness_score: f64,
    pub budget: Option<BudgetRange>,
}

/// Per conversation state record threaded through the pipeline.
///
/// Owned by the orchestrator for the duration of one `process` call; stages
/// return `StageUpdate` values which the orchestrator merges back, so no
/// stage ever holds a reference past its own return. Serializes as a flat
/// record keyed by `conversation_id` for caller side persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub buyer_name: Option<String>,
    pub history: Vec<Message>,
    pub intent: Option<IntentProfile>,
    pub budget: Option<BudgetRange>,
    pub financing_status: FinancingStatus,
    pub urgency: UrgencyLevel,
    pub preferences: BTreeMap<String, String>,
    pub step: QualificationStep,
    pub objection: ObjectionState,
    pub matched_candidates: Vec<PropertyCandidate>,
    pub financial_readiness_score: f64,
    pub motivation_score: f64,
    pub next_action: Option<NextAction>,
    pub response_text: Option<String>,
    pub journey_stage: JourneyStage,
    pub opted_out: bool,
    pub requires_manual_review: bool,
    pub handoff: Option<HandoffContext>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, buyer_name: Option<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            buyer_name,
            history: Vec::new(),
            intent: None,
            budget: None,
            financing_status: FinancingStatus::Unknown,
            urgency: UrgencyLevel::Browsing,
            preferences: BTreeMap::new(),
            step: QualificationStep::Budget,
            objection: ObjectionState::default(),
            matched_candidates: Vec::new(),
            financial_readiness_score: 0.0,
            motivation_score: 0.0,
            next_action: None,
            response_text: None,
            journey_stage: JourneyStage::Inquiry,
            opted_out: false,
            requires_manual_review: false,
            handoff: None,
        }
    }

    /// Lower cased concatenation of all buyer authored turns; the input the
    /// scorer and the budget extractor operate on.
    pub fn buyer_text(&self) -> String {
        let mut joined = String::new();
        for message in self.history.iter().filter(|m| m.role == Role::Buyer) {
            if !joined.is_empty() {
                joined.push(' ');
            }
            joined.push_str(&message.text);
        }
        joined.to_lowercase()
    }

    /// Qualification is always derived, never stored.
    pub fn is_qualified(&self, qualify_threshold: f64) -> bool {
        self.financial_readiness_score >= qualify_threshold
    }

    pub fn apply(&mut self, update: StageUpdate) {
        if let Some(intent) = update.intent {
            self.intent = Some(intent);
        }
        if let Some(budget) = update.budget {
            self.budget = Some(budget);
        }
        if let Some(status) = update.financing_status {
            self.financing_status = status;
        }
        if let Some(urgency) = update.urgency {
            self.urgency = urgency;
        }
        if let Some(step) = update.step {
            self.step = step;
        }
        if let Some(category) = update.objection_raised {
            self.objection.current = Some(category);
        }
        if let Some(record) = update.objection_record {
            self.objection.history.push(record);
        }
        if update.clear_objection {
            self.objection.current = None;
        }
        if let Some(candidates) = update.matched_candidates {
            self.matched_candidates = candidates;
        }
        if let Some(score) = update.financial_readiness_score {
            self.financial_readiness_score = score;
        }
        if let Some(score) = update.motivation_score {
            self.motivation_score = score;
        }
        if let Some(action) = update.next_action {
            self.next_action = Some(action);
        }
        // A reply, once produced, is never overwritten by a later stage.
        if let Some(text) = update.response_text {
            if self.response_text.is_none() {
                self.response_text = Some(text);
            }
        }
        if let Some(stage) = update.journey_stage {
            self.journey_stage = stage;
        }
        if let Some(flag) = update.requires_manual_review {
            self.requires_manual_review = flag;
        }
    }
}

/// Partial update returned by a pipeline stage. Only populated fields are
/// merged into the state.
#[derive(Clone, Debug, Default)]
pub struct StageUpdate {
    pub intent: Option<IntentProfile>,
    pub budget: Option<BudgetRange>,
    pub financing_status: Option<FinancingStatus>,
    pub urgency: Option<UrgencyLevel>,
    pub step: Option<QualificationStep>,
    pub objection_raised: Option<ObjectionCategory>,
    pub objection_record: Option<ObjectionRecord>,
    pub clear_objection: bool,
    pub matched_candidates: Option<Vec<PropertyCandidate>>,
    pub financial_readiness_score: Option<f64>,
    pub motivation_score: Option<f64>,
    pub next_action: Option<NextAction>,
    pub response_text: Option<String>,
    pub journey_stage: Option<JourneyStage>,
    pub requires_manual_review: Option<bool>,
}
