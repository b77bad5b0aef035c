pub mod audit;
pub mod compliance;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod financial;
pub mod intent;
pub mod objections;
pub mod optout;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{
    ConfigError, ConfigOverrides, EngineConfig, FinanceConfig, LoadOptions, LogFormat,
    LoggingConfig, QualificationConfig, RetryConfig,
};
pub use conversation::{
    BudgetRange, ConversationState, FinancingStatus, HandoffContext, JourneyStage, Message,
    NextAction, ObjectionCategory, ObjectionRecord, ObjectionState, PropertyCandidate,
    QualificationStep, Role, StageUpdate, UrgencyLevel,
};
pub use errors::{EngineError, Severity, ViolationCategory};
pub use financial::{
    estimate_affordability, extract_budget, Affordability, AssessmentOutcome, FinancialAssessor,
};
pub use intent::{IntentKeywords, IntentProfile, IntentScorer, Temperature};
pub use objections::{ObjectionOutcome, ObjectionStrategy};
pub use workflow::{transition, FlowAction, FlowEvent, TransitionError, TransitionOutcome};
