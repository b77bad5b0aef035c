use std::time::Duration;

use tracing::{debug, warn};

use hearth_core::conversation::{ConversationState, NextAction, PropertyCandidate};
use hearth_core::errors::EngineError;

use crate::collaborators::{EventBus, Notification, PropertyMatcher, PropertyQuery};
use crate::retry::{with_retry, with_timeout, RetryPolicy};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchOutcome {
    pub candidates: Vec<PropertyCandidate>,
    pub next_action: NextAction,
}

/// Translate conversation state into a matcher query and normalize the
/// result into a routing decision.
///
/// A missing budget ceiling is not an error: the buyer simply is not far
/// enough along, so the turn routes back to qualification. The match update
/// notification is an observable side effect; losing it is logged, never
/// fatal.
pub async fn match_properties(
    matcher: &dyn PropertyMatcher,
    bus: &dyn EventBus,
    state: &ConversationState,
    policy: &RetryPolicy,
    call_timeout: Duration,
    result_limit: usize,
) -> Result<MatchOutcome, EngineError> {
    let Some(budget) = state.budget else {
        debug!(conversation_id = %state.conversation_id, "no budget ceiling, skipping matcher");
        return Ok(MatchOutcome { candidates: Vec::new(), next_action: NextAction::QualifyMore });
    };

    let query = PropertyQuery {
        budget_ceiling: budget.max,
        preferences: state.preferences.clone(),
        limit: result_limit,
    };

    let candidates = with_retry(policy, "property_search", || {
        with_timeout(call_timeout, "property_search", matcher.find(&query))
    })
    .await?;

    let criteria = format!(
        "ceiling=${} preferences={}",
        budget.max,
        if state.preferences.is_empty() { "none".to_string() } else { state.preferences.len().to_string() }
    );
    if let Err(publish_error) = bus
        .publish(Notification::MatchUpdate {
            conversation_id: state.conversation_id.clone(),
            match_count: candidates.len(),
            criteria,
        })
        .await
    {
        warn!(conversation_id = %state.conversation_id, %publish_error, "match update notification lost");
    }

    let next_action =
        if candidates.is_empty() { NextAction::EducateMarket } else { NextAction::Respond };
    Ok(MatchOutcome { candidates, next_action })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::match_properties;
    use crate::collaborators::{InMemoryMatcher, Notification, RecordingBus};
    use crate::retry::RetryPolicy;
    use hearth_core::conversation::{BudgetRange, ConversationState, NextAction, PropertyCandidate};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            jitter_factor: 0.0,
        }
    }

    fn listing(id: &str, price: i64) -> PropertyCandidate {
        PropertyCandidate {
            listing_id: id.to_string(),
            address: format!("{id} Maple St"),
            price,
            bedrooms: 3,
            features: Vec::new(),
        }
    }

    #[tokio::test]
    async fn missing_budget_routes_to_qualify_more_without_calling_the_matcher() {
        let matcher = InMemoryMatcher::default();
        let bus = RecordingBus::default();
        let state = ConversationState::new("conv-1", None);

        let outcome =
            match_properties(&matcher, &bus, &state, &policy(), Duration::from_secs(1), 5)
                .await
                .expect("outcome");

        assert_eq!(outcome.next_action, NextAction::QualifyMore);
        assert!(outcome.candidates.is_empty());
        assert_eq!(matcher.calls(), 0);
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn matches_route_to_respond_and_notify() {
        let matcher = InMemoryMatcher::with_inventory(vec![listing("100", 420_000)]);
        let bus = RecordingBus::default();
        let mut state = ConversationState::new("conv-2", None);
        state.budget = Some(BudgetRange { min: 360_000, max: 450_000 });

        let outcome =
            match_properties(&matcher, &bus, &state, &policy(), Duration::from_secs(1), 5)
                .await
                .expect("outcome");

        assert_eq!(outcome.next_action, NextAction::Respond);
        assert_eq!(outcome.candidates.len(), 1);
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert!(matches!(
            &published[0],
            Notification::MatchUpdate { match_count: 1, .. }
        ));
    }

    #[tokio::test]
    async fn zero_results_route_to_educate_market() {
        let matcher = InMemoryMatcher::with_inventory(vec![listing("900", 900_000)]);
        let bus = RecordingBus::default();
        let mut state = ConversationState::new("conv-3", None);
        state.budget = Some(BudgetRange { min: 250_000, max: 300_000 });

        let outcome =
            match_properties(&matcher, &bus, &state, &policy(), Duration::from_secs(1), 5)
                .await
                .expect("outcome");

        assert_eq!(outcome.next_action, NextAction::EducateMarket);
        assert!(outcome.candidates.is_empty());
    }

    #[tokio::test]
    async fn transient_matcher_failures_are_retried_away() {
        let matcher = InMemoryMatcher::with_inventory(vec![listing("100", 420_000)]);
        matcher.fail_next(1);
        let bus = RecordingBus::default();
        let mut state = ConversationState::new("conv-4", None);
        state.budget = Some(BudgetRange { min: 360_000, max: 450_000 });

        let outcome =
            match_properties(&matcher, &bus, &state, &policy(), Duration::from_secs(1), 5)
                .await
                .expect("outcome");

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(matcher.calls(), 2);
    }

    #[tokio::test]
    async fn a_lost_notification_does_not_fail_the_stage() {
        let matcher = InMemoryMatcher::with_inventory(vec![listing("100", 420_000)]);
        let bus = RecordingBus::default();
        bus.set_failing(true);
        let mut state = ConversationState::new("conv-5", None);
        state.budget = Some(BudgetRange { min: 360_000, max: 450_000 });

        let outcome =
            match_properties(&matcher, &bus, &state, &policy(), Duration::from_secs(1), 5)
                .await
                .expect("outcome");
        assert_eq!(outcome.next_action, NextAction::Respond);
    }
}
