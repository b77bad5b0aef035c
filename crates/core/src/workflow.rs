use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::QualificationStep;

/// Events fed to the qualification state machine after each stage runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    /// An objection was detected in the latest message. Routed before
    /// anything else, from any non terminal step.
    ObjectionRaised,
    AssessmentCompleted { budget_known: bool },
    AssessmentFailed,
    MatchesFound { count: usize },
    NoMatches,
    HotLeadDetected,
}

/// Side effects the dispatcher must perform after a transition. The
/// transition function itself stays pure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RunPropertySearch,
    GenerateResponse,
    RequestMoreInfo,
    ShareMarketContext,
    RecordObjection,
    InjectSchedulingMessage,
    NotifyQualificationComplete,
    EscalateToHuman,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: QualificationStep,
    pub to: QualificationStep,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {step:?} on event {event:?}")]
    InvalidTransition { step: QualificationStep, event: FlowEvent },
}

/// Pure transition function for one conversation turn.
///
/// The qualification ladder is budget -> timeline -> preferences ->
/// decision_makers -> property_search; a pending objection preempts every
/// other route, and a hot lead short circuits straight to the appointment
/// step.
pub fn transition(
    current: QualificationStep,
    event: &FlowEvent,
) -> Result<TransitionOutcome, TransitionError> {
    use FlowAction::{
        EscalateToHuman, GenerateResponse, InjectSchedulingMessage, NotifyQualificationComplete,
        RecordObjection, RequestMoreInfo, RunPropertySearch, ShareMarketContext,
    };
    use QualificationStep::{
        Appointment, Budget, DecisionMakers, Error, ObjectionHandling, Preferences,
        PropertySearch, Timeline,
    };

    let invalid = || TransitionError::InvalidTransition { step: current, event: event.clone() };

    if current.is_terminal() {
        return Err(invalid());
    }

    let (to, actions) = match (current, event) {
        // Objections preempt everything else, whatever step we were on.
        (_, FlowEvent::ObjectionRaised) => {
            (ObjectionHandling, vec![RecordObjection, GenerateResponse])
        }

        (
            Budget | Timeline | Preferences | DecisionMakers | ObjectionHandling,
            FlowEvent::AssessmentCompleted { budget_known: true },
        ) => (PropertySearch, vec![RunPropertySearch]),
        (
            Budget | Timeline | Preferences | DecisionMakers | ObjectionHandling,
            FlowEvent::AssessmentCompleted { budget_known: false },
        ) => (Budget, vec![RequestMoreInfo, GenerateResponse]),

        (PropertySearch, FlowEvent::MatchesFound { count }) if *count > 0 => {
            (PropertySearch, vec![GenerateResponse])
        }
        (PropertySearch, FlowEvent::MatchesFound { .. }) | (PropertySearch, FlowEvent::NoMatches) => {
            (PropertySearch, vec![ShareMarketContext, GenerateResponse])
        }

        (_, FlowEvent::HotLeadDetected) => {
            (Appointment, vec![InjectSchedulingMessage, NotifyQualificationComplete])
        }

        (_, FlowEvent::AssessmentFailed) => (Error, vec![EscalateToHuman, GenerateResponse]),

        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone(), actions })
}
