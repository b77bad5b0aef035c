use std::sync::Arc;

use hearth_agent::collaborators::{InMemoryCrm, InMemoryMatcher, RecordingBus, ScriptedGenerator};
use hearth_agent::engine::{ProcessRequest, QualificationEngine};
use hearth_core::config::{EngineConfig, LoadOptions};
use hearth_core::conversation::{Message, PropertyCandidate};

use super::CommandResult;

/// Fixed demo inventory so simulation output is reproducible.
fn demo_inventory() -> Vec<PropertyCandidate> {
    vec![
        PropertyCandidate {
            listing_id: "HW-101".to_string(),
            address: "101 Maple St".to_string(),
            price: 415_000,
            bedrooms: 3,
            features: vec!["garage".to_string(), "yard".to_string()],
        },
        PropertyCandidate {
            listing_id: "HW-102".to_string(),
            address: "8 Birchwood Ln".to_string(),
            price: 529_000,
            bedrooms: 4,
            features: vec!["yard".to_string(), "home office".to_string()],
        },
        PropertyCandidate {
            listing_id: "HW-103".to_string(),
            address: "42 Founders Ct".to_string(),
            price: 610_000,
            bedrooms: 4,
            features: vec!["pool".to_string()],
        },
    ]
}

fn parse_history(entries: &[String]) -> Result<Vec<Message>, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once(':') {
            Some(("buyer", text)) => Ok(Message::buyer(text.trim())),
            Some(("agent", text)) => Ok(Message::agent(text.trim())),
            _ => Err(format!("history entry `{entry}` must start with `buyer:` or `agent:`")),
        })
        .collect()
}

pub async fn run(
    conversation_id: &str,
    message: &str,
    name: Option<String>,
    history: &[String],
) -> CommandResult {
    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("simulate", "config", error.to_string(), 2),
    };

    let history = match parse_history(history) {
        Ok(history) => history,
        Err(message) => return CommandResult::failure("simulate", "bad_history", message, 2),
    };

    let engine = QualificationEngine::new(
        config,
        Arc::new(ScriptedGenerator::default()),
        Arc::new(InMemoryMatcher::with_inventory(demo_inventory())),
        Arc::new(InMemoryCrm::default()),
        Arc::new(RecordingBus::default()),
    );

    let result = engine
        .process(ProcessRequest {
            conversation_id: conversation_id.to_string(),
            message: message.to_string(),
            buyer_name: name,
            history,
            handoff: None,
            intelligence: None,
        })
        .await;

    CommandResult::output(result, "simulate")
}
