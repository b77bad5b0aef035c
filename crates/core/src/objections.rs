use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::conversation::{
    ConversationState, ObjectionCategory, ObjectionRecord, QualificationStep,
};
use crate::financial::Affordability;

/// Fixed response strategy for one objection category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionStrategy {
    pub category: ObjectionCategory,
    pub approach: String,
    pub talking_points: Vec<String>,
}

/// Partial result of objection handling; empty when nothing was flagged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectionOutcome {
    pub strategy: Option<ObjectionStrategy>,
    pub record: Option<ObjectionRecord>,
    pub step: Option<QualificationStep>,
}

/// Detect an objection in a single inbound message. First matching category
/// wins; price concerns are checked first since they are the most common.
pub fn detect(message: &str) -> Option<ObjectionCategory> {
    const PRICE: &[&str] = &[
        "too expensive",
        "overpriced",
        "price is too",
        "prices are crazy",
        "out of our price",
        "way too much",
        "can't justify",
    ];
    const PARALYSIS: &[&str] = &[
        "need to think",
        "so many options",
        "overwhelmed",
        "not sure which",
        "too many choices",
    ];
    const SHARED: &[&str] = &[
        "ask my",
        "talk to my",
        "check with my",
        "my spouse",
        "my wife first",
        "my husband first",
        "convince my",
    ];
    const TIMING: &[&str] =
        &["not the right time", "wait until", "maybe later", "after the holidays", "next spring"];
    const LOW_COMMITMENT: &[&str] =
        &["just looking", "just browsing", "not serious", "window shopping"];

    let text = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| text.contains(marker));

    if contains_any(PRICE) {
        Some(ObjectionCategory::PriceShock)
    } else if contains_any(PARALYSIS) {
        Some(ObjectionCategory::AnalysisParalysis)
    } else if contains_any(SHARED) {
        Some(ObjectionCategory::SharedDecision)
    } else if contains_any(TIMING) {
        Some(ObjectionCategory::Timing)
    } else if contains_any(LOW_COMMITMENT) {
        Some(ObjectionCategory::LowCommitment)
    } else {
        None
    }
}

/// Handle the currently flagged objection. No op when none is flagged.
/// Every invocation with a flagged objection appends to the history; the
/// history is never truncated here.
pub fn handle(state: &ConversationState, affordability: Option<&Affordability>) -> ObjectionOutcome {
    let Some(category) = state.objection.current else {
        return ObjectionOutcome::default();
    };

    let mut strategy = strategy_for(category);
    if category.is_price_related() {
        if let Some(affordability) = affordability {
            strategy.talking_points.push(format!(
                "At the top of their range the estimated monthly payment is about ${} including taxes and insurance.",
                affordability.total_monthly.round()
            ));
        }
    }

    ObjectionOutcome {
        strategy: Some(strategy),
        record: Some(ObjectionRecord { category, raised_at: Utc::now() }),
        step: Some(QualificationStep::ObjectionHandling),
    }
}

pub fn strategy_for(category: ObjectionCategory) -> ObjectionStrategy {
    let (approach, talking_points): (&str, &[&str]) = match category {
        ObjectionCategory::PriceShock => (
            "Acknowledge sticker shock, then reframe around monthly cost and equity.",
            &[
                "Validate that prices feel high and that the reaction is normal.",
                "Shift the conversation from list price to monthly payment.",
                "Mention that rent also rises while a fixed payment does not.",
            ],
        ),
        ObjectionCategory::AnalysisParalysis => (
            "Reduce the option space and propose one concrete next step.",
            &[
                "Narrow to the two or three listings that best fit their stated needs.",
                "Offer a short tour of a single home as a low pressure first step.",
            ],
        ),
        ObjectionCategory::SharedDecision => (
            "Respect the other decision maker and make it easy to include them.",
            &[
                "Offer to send a summary they can share with their partner.",
                "Suggest a tour time that works for everyone involved.",
            ],
        ),
        ObjectionCategory::Timing => (
            "Agree timing matters and quantify the cost of waiting.",
            &[
                "Ask what would need to be true for the timing to feel right.",
                "Share how inventory and rates have moved over the last quarter.",
            ],
        ),
        ObjectionCategory::LowCommitment => (
            "Stay useful without pressure and keep the door open.",
            &[
                "Offer a no commitment market snapshot for their area.",
                "Invite them to save searches and reach out when ready.",
            ],
        ),
        ObjectionCategory::Other => (
            "Listen, acknowledge the concern, and ask one clarifying question.",
            &[
                "Restate their concern in their own words.",
                "Ask what would make this feel like a safe next step.",
            ],
        ),
    };

    ObjectionStrategy {
        category,
        approach: approach.to_string(),
        talking_points: talking_points.iter().map(|point| (*point).to_string()).collect(),
    }
}
