//! Qualification agent runtime - pipeline orchestration and resilience
//!
//! This crate drives one conversation turn end to end:
//! 1. **Opt out gate** (`hearth_core::optout`) - absolute short circuit
//! 2. **Intent scoring** (`hearth_core::intent`) - pure keyword scoring
//! 3. **Financial assessment** (`hearth_core::financial`) - with tiered
//!    fallback when assessment fails (`fallback`)
//! 4. **Property matching** (`matching`) - external matcher behind retry
//! 5. **Objection handling** (`hearth_core::objections`)
//! 6. **Response generation** (`response`) - LLM call with canned fallbacks
//!
//! Every external call goes through the resilience layer (`retry`), and
//! unrecoverable failures route through `escalation` so the buyer always
//! gets a reply and a human always gets the case.
//!
//! # Safety Principle
//!
//! The LLM only words replies. It never decides qualification, scores,
//! budgets, or scheduling; those are deterministic decisions made in
//! `hearth-core`.

pub mod collaborators;
pub mod engine;
pub mod escalation;
pub mod fallback;
pub mod matching;
pub mod response;
pub mod retry;

pub use collaborators::{
    CrmClient, EventBus, GeneratedReply, InMemoryCrm, InMemoryMatcher, Notification,
    PropertyMatcher, PropertyQuery, RecordingBus, ScriptedGenerator, TextGenerator,
};
pub use engine::{ProcessRequest, QualificationEngine, TurnResult};
pub use escalation::{
    escalate_compliance, escalate_to_human, ComplianceLog, ComplianceOutcome, EscalationStatus,
    EscalationTicket, InMemoryComplianceLog,
};
pub use fallback::{assess_from_text, FallbackAssessment, FallbackTier};
pub use matching::{match_properties, MatchOutcome};
pub use response::{MarketIntelligence, ReplyOutcome, Tone};
pub use retry::{with_retry, with_timeout, RetryPolicy};
