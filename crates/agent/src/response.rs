use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use hearth_core::config::QualificationConfig;
use hearth_core::conversation::{ConversationState, NextAction, Role};
use hearth_core::intent::Temperature;
use hearth_core::objections::ObjectionStrategy;

use crate::collaborators::{GeneratedReply, TextGenerator};
use crate::retry::{with_retry, with_timeout, RetryPolicy};

/// Optional market enrichment supplied by the caller. Its absence never
/// degrades the core path; the prompt simply omits the section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIntelligence {
    pub summary: String,
    pub inventory_level: Option<String>,
    pub median_price: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Professional,
    Warm,
    Urgent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyOutcome {
    pub text: String,
    pub tone: Tone,
    pub next_action: NextAction,
    pub used_fallback: bool,
}

/// Canned safe replies rotated when generation fails. The pipeline must
/// always produce some outbound text.
const FALLBACK_REPLIES: &[&str] = &[
    "Thanks for the note! Let me pull a few homes together for you. What matters most in your next place?",
    "Great to hear from you. While I line things up, is your ideal move sooner or later this year?",
    "Appreciate the details! Quick question so I can narrow things down: what price range feels comfortable?",
    "Got it, thanks! Would you rather start with a short list of homes or a quick chat about the market?",
];

const CANNED_REPLY: &str =
    "Happy to keep helping here. What would be most useful next, a few matching homes or current market numbers?";

/// How deep into the reply we look for a markdown sub heading before
/// treating the whole thing as structured output.
const STRUCTURED_SCAN_WINDOW: usize = 120;

/// Generate the outbound reply for this turn. Never fails: generator
/// errors, after retries, rotate through the fallback replies.
pub async fn generate(
    generator: &dyn TextGenerator,
    policy: &RetryPolicy,
    call_timeout: Duration,
    state: &ConversationState,
    strategy: Option<&ObjectionStrategy>,
    intelligence: Option<&MarketIntelligence>,
    config: &QualificationConfig,
) -> ReplyOutcome {
    let prompt = build_prompt(state, strategy, intelligence);
    let tone = tone_for(state);

    let generated = with_retry(policy, "text_generation", || {
        with_timeout(call_timeout, "text_generation", generator.generate(&prompt))
    })
    .await;

    match generated {
        Ok(reply) => {
            let text = normalize_reply(reply)
                .map(|text| coerce_plain_text(&text))
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| CANNED_REPLY.to_string());
            ReplyOutcome {
                text: sanitize(&text, config.reply_soft_limit),
                tone,
                next_action: NextAction::Respond,
                used_fallback: false,
            }
        }
        Err(error) => {
            warn!(conversation_id = %state.conversation_id, %error, "generation failed, using fallback reply");
            ReplyOutcome {
                text: sanitize(fallback_reply(&state.conversation_id), config.reply_soft_limit),
                tone,
                next_action: NextAction::Respond,
                used_fallback: true,
            }
        }
    }
}

pub fn build_prompt(
    state: &ConversationState,
    strategy: Option<&ObjectionStrategy>,
    intelligence: Option<&MarketIntelligence>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a friendly real estate assistant texting a prospective buyer.\n");
    prompt.push_str("Reply with one short plain text message, no markdown, no lists.\n\n");

    prompt.push_str("Context:\n");
    if let Some(name) = &state.buyer_name {
        prompt.push_str(&format!("buyer name: {name}\n"));
    }
    prompt.push_str(&format!("qualification step: {}\n", state.step.as_str()));
    prompt.push_str(&format!(
        "financial readiness: {:.0}, motivation: {:.0}\n",
        state.financial_readiness_score, state.motivation_score
    ));
    if let Some(budget) = state.budget {
        prompt.push_str(&format!("budget range: ${} to ${}\n", budget.min, budget.max));
    }
    if !state.matched_candidates.is_empty() {
        prompt.push_str(&format!("matched listings: {}\n", state.matched_candidates.len()));
    }

    if let Some(strategy) = strategy {
        prompt.push_str(&format!(
            "\nThe buyer raised a {} objection. Approach: {}\n",
            strategy.category.as_str(),
            strategy.approach
        ));
        for point in &strategy.talking_points {
            prompt.push_str(&format!("point: {point}\n"));
        }
    }

    if let Some(intelligence) = intelligence {
        prompt.push_str(&format!("\nMarket context: {}\n", intelligence.summary));
        if let Some(level) = &intelligence.inventory_level {
            prompt.push_str(&format!("inventory: {level}\n"));
        }
        if let Some(median) = intelligence.median_price {
            prompt.push_str(&format!("median price: ${median}\n"));
        }
    }

    prompt.push_str("\nRecent conversation:\n");
    let recent = state.history.len().saturating_sub(6);
    for message in &state.history[recent..] {
        let speaker = match message.role {
            Role::Buyer => "buyer",
            Role::Agent => "agent",
        };
        prompt.push_str(&format!("{speaker}: {}\n", message.text));
    }

    prompt
}

/// Flatten the service's possible reply shapes into plain text.
pub fn normalize_reply(reply: GeneratedReply) -> Option<String> {
    match reply {
        GeneratedReply::Text(text) => Some(text),
        GeneratedReply::Structured(value) => extract_text_field(&value),
    }
}

fn extract_text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("content")
            .or_else(|| map.get("text"))
            .and_then(extract_text_field),
        _ => None,
    }
}

/// If the reply still looks like structured or markdown output, strip the
/// decoration and keep the first substantive line.
pub fn coerce_plain_text(text: &str) -> String {
    let trimmed = text.trim();
    if !looks_structured(trimmed) {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .map(|line| line.trim().trim_start_matches(['#', '*', '-', '>']).trim())
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
        .unwrap_or_default()
}

fn looks_structured(text: &str) -> bool {
    if text.starts_with('#') {
        return true;
    }
    let window: String = text.chars().take(STRUCTURED_SCAN_WINDOW).collect();
    window.contains("\n#")
}

/// Channel post processing: hyphens are removed outright and the text is
/// clipped to the soft budget on a character boundary.
pub fn sanitize(text: &str, soft_limit: usize) -> String {
    let without_hyphens = text.replace('-', " ");
    let collapsed = without_hyphens.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, soft_limit)
}

/// Hard wrapper level cap applied to whatever leaves the engine.
pub fn enforce_hard_cap(text: &str, hard_limit: usize) -> String {
    truncate_chars(text.trim(), hard_limit)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect::<String>().trim_end().to_string()
}

pub fn fallback_reply(conversation_id: &str) -> &'static str {
    let mut hasher = DefaultHasher::new();
    conversation_id.hash(&mut hasher);
    FALLBACK_REPLIES[(hasher.finish() as usize) % FALLBACK_REPLIES.len()]
}

fn tone_for(state: &ConversationState) -> Tone {
    match state.intent.as_ref().map(|profile| profile.temperature) {
        Some(Temperature::Hot) => Tone::Urgent,
        Some(Temperature::Warm) | Some(Temperature::Lukewarm) => Tone::Warm,
        _ => Tone::Professional,
    }
}
