use hearth_core::intent::IntentScorer;

use super::CommandResult;

pub fn run(text: &str) -> CommandResult {
    let profile = IntentScorer::default().score(text);
    CommandResult::output(profile, "score")
}
