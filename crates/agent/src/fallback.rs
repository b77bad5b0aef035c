use serde::{Deserialize, Serialize};
use tracing::info;

use hearth_core::config::QualificationConfig;
use hearth_core::conversation::{BudgetRange, FinancingStatus};
use hearth_core::financial::extract_budget;

/// Which safety net produced the answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    Heuristic,
    Conservative,
}

/// Result of the financial fallback ladder. Construction never fails; this
/// is the terminal safety net once normal assessment is off the table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallbackAssessment {
    pub financing_status: FinancingStatus,
    pub financial_readiness_score: f64,
    pub budget: Option<BudgetRange>,
    pub requires_manual_review: bool,
    pub tier: FallbackTier,
}

/// Tier 1 reads cheap heuristics off the conversation text that already
/// exists; it never re calls the failed dependency. Tier 2 is the fixed
/// conservative default that marks the record for manual review.
pub fn assess_from_text(text: &str, config: &QualificationConfig) -> FallbackAssessment {
    let normalized = text.to_lowercase();
    let budget = extract_budget(&normalized, config);

    let heuristic_status = if normalized.contains("cash") {
        Some((FinancingStatus::Cash, 80.0))
    } else if normalized.contains("pre-approved")
        || normalized.contains("pre approved")
        || normalized.contains("preapproved")
    {
        Some((FinancingStatus::PreApproved, 75.0))
    } else if normalized.contains("lender") || normalized.contains("mortgage") {
        Some((FinancingStatus::NeedsApproval, 50.0))
    } else {
        None
    };

    match (heuristic_status, budget) {
        (Some((financing_status, score)), budget) => {
            info!(tier = "heuristic", status = financing_status.as_str(), "fallback assessment");
            FallbackAssessment {
                financing_status,
                financial_readiness_score: score,
                budget,
                requires_manual_review: false,
                tier: FallbackTier::Heuristic,
            }
        }
        (None, Some(budget)) => {
            // A budget alone is a weak but usable signal.
            info!(tier = "heuristic", status = "budget_only", "fallback assessment");
            FallbackAssessment {
                financing_status: FinancingStatus::Unknown,
                financial_readiness_score: 50.0,
                budget: Some(budget),
                requires_manual_review: false,
                tier: FallbackTier::Heuristic,
            }
        }
        (None, None) => {
            info!(tier = "conservative", "fallback assessment found no signals");
            FallbackAssessment {
                financing_status: FinancingStatus::AssessmentPending,
                financial_readiness_score: 25.0,
                budget: None,
                requires_manual_review: true,
                tier: FallbackTier::Conservative,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{assess_from_text, FallbackTier};
    use hearth_core::config::QualificationConfig;
    use hearth_core::conversation::FinancingStatus;

    fn config() -> QualificationConfig {
        QualificationConfig::default()
    }

    #[test]
    fn pre_approved_text_yields_a_tier_one_result() {
        let result = assess_from_text("we are pre-approved for $400k", &config());
        assert_eq!(result.tier, FallbackTier::Heuristic);
        assert_eq!(result.financing_status, FinancingStatus::PreApproved);
        assert!(result.financial_readiness_score >= 70.0);
        assert!(!result.requires_manual_review);
        assert_eq!(result.budget.expect("budget").max, 400_000);
    }

    #[test]
    fn cash_beats_weaker_heuristics() {
        let result = assess_from_text("cash purchase, already pre approved too", &config());
        assert_eq!(result.financing_status, FinancingStatus::Cash);
        assert_eq!(result.financial_readiness_score, 80.0);
    }

    #[test]
    fn budget_alone_still_counts_as_a_heuristic() {
        let result = assess_from_text("looking around 350k", &config());
        assert_eq!(result.tier, FallbackTier::Heuristic);
        assert_eq!(result.financing_status, FinancingStatus::Unknown);
        assert!(result.budget.is_some());
    }

    #[test]
    fn no_signal_falls_through_to_the_conservative_default() {
        let result = assess_from_text("hello, is this still available?", &config());
        assert_eq!(result.tier, FallbackTier::Conservative);
        assert_eq!(result.financing_status, FinancingStatus::AssessmentPending);
        assert_eq!(result.financial_readiness_score, 25.0);
        assert!(result.requires_manual_review);
        assert!(result.budget.is_none());
    }
}
