//! TCPA opt out gate. Runs before any other stage and before any state
//! mutation; a match is absolute, so no retries, no scoring, no text
//! generation happen afterwards.

/// Single word triggers match whole tokens only, so "stopped by the open
/// house" does not unsubscribe anyone.
const SINGLE_WORD_TRIGGERS: &[&str] = &["stop", "unsubscribe", "quit", "cancel"];

const PHRASE_TRIGGERS: &[&str] = &[
    "not interested",
    "opt out",
    "remove me",
    "take me off",
    "do not contact",
    "don't contact",
    "stop texting",
    "stop messaging",
    "no more messages",
];

/// Fixed confirmation reply. Stays under 160 characters and carries the
/// word "unsubscribed" for downstream delivery checks.
pub const OPT_OUT_CONFIRMATION: &str =
    "You have been unsubscribed and will not receive further messages from us. Reply START at any time if you change your mind.";

/// CRM tag applied to an opted out party.
pub const OPT_OUT_TAG: &str = "opted_out";

pub fn check(message: &str) -> bool {
    let normalized = message.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }

    if PHRASE_TRIGGERS.iter().any(|phrase| normalized.contains(phrase)) {
        return true;
    }

    normalized
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| SINGLE_WORD_TRIGGERS.contains(&token))
}

#[cfg(test)]
mod tests {
    use super::{check, OPT_OUT_CONFIRMATION};

    #[test]
    fn canonical_triggers_match_case_insensitively() {
        for message in ["stop", "STOP", "Stop.", "unsubscribe", "Not Interested", "opt out please"]
        {
            assert!(check(message), "expected opt out for {message:?}");
        }
    }

    #[test]
    fn embedded_single_words_still_match_as_tokens() {
        assert!(check("please stop"));
        assert!(check("ok stop texting me"));
    }

    #[test]
    fn ordinary_messages_pass_through() {
        for message in [
            "we stopped by the open house yesterday",
            "what a showstopper of a kitchen",
            "",
            "interested in a tour",
        ] {
            assert!(!check(message), "false positive for {message:?}");
        }
    }

    #[test]
    fn confirmation_fits_the_sms_budget_and_mentions_unsubscribed() {
        assert!(OPT_OUT_CONFIRMATION.len() <= 160);
        assert!(OPT_OUT_CONFIRMATION.contains("unsubscribed"));
        assert!(!OPT_OUT_CONFIRMATION.contains('-'));
    }
}
