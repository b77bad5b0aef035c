use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use crate::config::{FinanceConfig, QualificationConfig};
use crate::conversation::{BudgetRange, ConversationState, FinancingStatus, QualificationStep};
use crate::errors::EngineError;

/// Result of one financial assessment pass. Plain data; the orchestrator
/// merges it into the conversation state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOutcome {
    pub budget: Option<BudgetRange>,
    pub financing_status: FinancingStatus,
    pub financial_readiness_score: f64,
    pub step: QualificationStep,
}

#[derive(Clone, Debug, Default)]
pub struct FinancialAssessor {
    config: QualificationConfig,
}

impl FinancialAssessor {
    pub fn new(config: QualificationConfig) -> Self {
        Self { config }
    }

    /// Never aborts the pipeline: any internal failure collapses to a fixed
    /// low confidence outcome with `assessment_error` status.
    pub fn assess(&self, state: &ConversationState) -> AssessmentOutcome {
        match self.try_assess(state) {
            Ok(outcome) => outcome,
            Err(_) => AssessmentOutcome {
                budget: state.budget,
                financing_status: FinancingStatus::AssessmentError,
                financial_readiness_score: 25.0,
                step: state.step,
            },
        }
    }

    pub fn try_assess(&self, state: &ConversationState) -> Result<AssessmentOutcome, EngineError> {
        // Trusted hand off context short circuits; prior values are echoed
        // back unchanged so repeated assessment is idempotent.
        if let Some(handoff) = &state.handoff {
            return Ok(AssessmentOutcome {
                budget: handoff.budget,
                financing_status: handoff.financing_status,
                financial_readiness_score: handoff.financial_readiness_score,
                step: state.step,
            });
        }

        if state.conversation_id.trim().is_empty() {
            return Err(EngineError::Assessment("conversation has no id".to_owned()));
        }

        let text = state.buyer_text();
        let budget = extract_budget(&text, &self.config).or(state.budget);

        let mut financing_status = classify_financing(&text);
        if financing_status == FinancingStatus::Unknown {
            financing_status = state.financing_status;
        }

        let urgency_score =
            state.intent.as_ref().map(|profile| profile.urgency_composite).unwrap_or(25.0);
        let financial_readiness_score =
            readiness_for_status(financing_status, urgency_score, budget.is_some());

        let step = if budget.is_none() {
            QualificationStep::Budget
        } else {
            match state.intent.as_ref().map(|profile| profile.recommended_step) {
                Some(QualificationStep::Budget) | None => QualificationStep::Timeline,
                Some(step) => step,
            }
        };

        Ok(AssessmentOutcome { budget, financing_status, financial_readiness_score, step })
    }
}

/// Readiness lookup keyed by financing status; `Unknown` falls back to the
/// urgency derived formula.
pub fn readiness_for_status(
    status: FinancingStatus,
    urgency_score: f64,
    budget_known: bool,
) -> f64 {
    match status {
        FinancingStatus::Cash => 95.0,
        FinancingStatus::PreApproved => 85.0,
        FinancingStatus::NeedsApproval => 45.0,
        FinancingStatus::AssessmentPending => 30.0,
        FinancingStatus::AssessmentError => 25.0,
        FinancingStatus::Unknown => {
            (urgency_score + if budget_known { 50.0 } else { 0.0 }).min(100.0)
        }
    }
}

pub fn classify_financing(text: &str) -> FinancingStatus {
    const CASH_MARKERS: &[&str] =
        &["cash buyer", "paying cash", "all cash", "cash offer", "pay cash"];
    const PRE_APPROVED_MARKERS: &[&str] = &["pre-approved", "pre approved", "preapproved"];
    const NEEDS_APPROVAL_MARKERS: &[&str] = &[
        "need financing",
        "need a loan",
        "need a mortgage",
        "need to get approved",
        "not approved yet",
        "need approval",
        "talk to a lender",
        "find a lender",
    ];

    let text = text.to_lowercase();
    if CASH_MARKERS.iter().any(|marker| text.contains(marker)) {
        FinancingStatus::Cash
    } else if PRE_APPROVED_MARKERS.iter().any(|marker| text.contains(marker)) {
        FinancingStatus::PreApproved
    } else if NEEDS_APPROVAL_MARKERS.iter().any(|marker| text.contains(marker)) {
        FinancingStatus::NeedsApproval
    } else {
        FinancingStatus::Unknown
    }
}

/// Scan text for a budget range. `$` prefixed amounts win; plain numeric
/// tokens are the fallback. Tokens inside the K shorthand window are read as
/// thousands and anything below it is discarded as a likely room count.
pub fn extract_budget(text: &str, config: &QualificationConfig) -> Option<BudgetRange> {
    let tokens = tokenize(text);

    let mut amounts: Vec<i64> = tokens
        .iter()
        .filter(|token| token.starts_with('$'))
        .filter_map(|token| parse_amount(token, config))
        .collect();

    if amounts.is_empty() {
        amounts = tokens
            .iter()
            .filter(|token| !token.starts_with('$'))
            .filter_map(|token| parse_amount(token, config))
            .collect();
    }

    match amounts.len() {
        0 => None,
        1 => {
            let max = amounts[0];
            let min = (max as f64 * config.single_amount_min_fraction).round() as i64;
            Some(BudgetRange { min, max })
        }
        _ => {
            let min = *amounts.iter().min().unwrap_or(&0);
            let max = *amounts.iter().max().unwrap_or(&0);
            Some(BudgetRange { min, max })
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character == ',' {
            // Thousands separators vanish so "$1,250,000" stays one token.
            continue;
        }
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.') {
            sanitized.push(character.to_ascii_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// Parse one token as a dollar amount. Returns `None` for non numeric tokens
/// and for values below the K shorthand minimum.
fn parse_amount(token: &str, config: &QualificationConfig) -> Option<i64> {
    let trimmed = token.trim_start_matches('$').trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = trimmed.strip_suffix('k') {
        (prefix, Some(1_000.0))
    } else if let Some(prefix) = trimmed.strip_suffix('m') {
        (prefix, Some(1_000_000.0))
    } else {
        (trimmed, None)
    };

    let value = number_part.parse::<f64>().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let dollars = match multiplier {
        Some(multiplier) => value * multiplier,
        None => {
            if value < config.k_shorthand_min as f64 {
                // Small integers are bedroom or bathroom counts, not prices.
                return None;
            } else if value < config.k_shorthand_max as f64 {
                value * 1_000.0
            } else {
                value
            }
        }
    };

    let rounded = dollars.round();
    if rounded < config.k_shorthand_min as f64 {
        return None;
    }
    Some(rounded as i64)
}

/// Deterministic monthly affordability estimate for a purchase price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affordability {
    pub price: Decimal,
    pub down_payment: Decimal,
    pub loan_amount: Decimal,
    pub monthly_principal_interest: Decimal,
    pub monthly_taxes: Decimal,
    pub monthly_insurance: Decimal,
    pub total_monthly: Decimal,
}

pub fn estimate_affordability(price_dollars: i64, finance: &FinanceConfig) -> Affordability {
    let twelve = Decimal::from(12u32);
    let price = Decimal::from(price_dollars);
    let down_payment = (price * finance.down_payment_rate).round_dp(2);
    let loan_amount = price - down_payment;

    let payments = Decimal::from(finance.term_years.max(1) * 12);
    let monthly_rate = finance.annual_interest_rate / twelve;
    let monthly_principal_interest = if monthly_rate.is_zero() {
        (loan_amount / payments).round_dp(2)
    } else {
        let factor = (Decimal::ONE + monthly_rate).powi(i64::from(finance.term_years.max(1) * 12));
        (loan_amount * monthly_rate * factor / (factor - Decimal::ONE)).round_dp(2)
    };

    let monthly_taxes = (price * finance.annual_property_tax_rate / twelve).round_dp(2);
    let monthly_insurance = (finance.annual_insurance / twelve).round_dp(2);
    let total_monthly = monthly_principal_interest + monthly_taxes + monthly_insurance;

    Affordability {
        price,
        down_payment,
        loan_amount,
        monthly_principal_interest,
        monthly_taxes,
        monthly_insurance,
        total_monthly,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        classify_financing, estimate_affordability, extract_budget, readiness_for_status,
        AssessmentOutcome, FinancialAssessor,
    };
    use crate::config::{EngineConfig, QualificationConfig};
    use crate::conversation::{
        ConversationState, FinancingStatus, HandoffContext, Message, QualificationStep,
    };

    fn config() -> QualificationConfig {
        QualificationConfig::default()
    }

    #[test]
    fn bedroom_counts_never_seed_a_budget() {
        let budget =
            extract_budget("3-bedroom house around 450k", &config()).expect("budget expected");
        assert_eq!(budget.max, 450_000);
        // The synthesized minimum sits far above any bedroom count magnitude.
        assert_eq!(budget.min, 360_000);
        assert!(budget.min > 100_000);
    }

    #[test]
    fn dollar_range_yields_min_and_max() {
        let budget = extract_budget("$450k to $550k", &config()).expect("budget expected");
        assert_eq!(budget.min, 450_000);
        assert_eq!(budget.max, 550_000);
    }

    #[test]
    fn single_amount_becomes_the_maximum_with_synthesized_minimum() {
        let budget = extract_budget("thinking $500k", &config()).expect("budget expected");
        assert_eq!(budget.max, 500_000);
        assert!(budget.min < budget.max);
        assert_eq!(budget.min, 400_000);
    }

    #[test]
    fn no_amounts_means_no_budget() {
        assert!(extract_budget("we have two kids and a dog", &config()).is_none());
        assert!(extract_budget("", &config()).is_none());
    }

    #[test]
    fn comma_separated_amounts_stay_intact() {
        let budget = extract_budget("up to $1,250,000 for the right place", &config())
            .expect("budget expected");
        assert_eq!(budget.max, 1_250_000);
    }

    #[test]
    fn dollar_amounts_win_over_plain_tokens() {
        let budget =
            extract_budget("we saw 20 listings but our cap is $300k", &config()).expect("budget");
        assert_eq!(budget.max, 300_000);
    }

    #[test]
    fn plain_tokens_in_shorthand_window_scale_to_thousands() {
        let budget = extract_budget("somewhere between 400 and 475", &config()).expect("budget");
        assert_eq!(budget.min, 400_000);
        assert_eq!(budget.max, 475_000);
    }

    #[test]
    fn financing_classification_prefers_cash_over_weaker_signals() {
        assert_eq!(classify_financing("we are paying cash"), FinancingStatus::Cash);
        assert_eq!(classify_financing("I got pre-approved monday"), FinancingStatus::PreApproved);
        assert_eq!(classify_financing("we still need a loan"), FinancingStatus::NeedsApproval);
        assert_eq!(classify_financing("hello there"), FinancingStatus::Unknown);
        assert_eq!(
            classify_financing("pre approved but would rather make a cash offer"),
            FinancingStatus::Cash
        );
    }

    #[test]
    fn readiness_lookup_and_unknown_fallback() {
        assert_eq!(readiness_for_status(FinancingStatus::Cash, 0.0, false), 95.0);
        assert_eq!(readiness_for_status(FinancingStatus::PreApproved, 0.0, false), 85.0);
        assert_eq!(readiness_for_status(FinancingStatus::NeedsApproval, 0.0, false), 45.0);
        // Unknown: urgency plus a 50 point budget bonus, capped at 100.
        assert_eq!(readiness_for_status(FinancingStatus::Unknown, 30.0, true), 80.0);
        assert_eq!(readiness_for_status(FinancingStatus::Unknown, 30.0, false), 30.0);
        assert_eq!(readiness_for_status(FinancingStatus::Unknown, 80.0, true), 100.0);
    }

    #[test]
    fn handoff_context_short_circuits_assessment() {
        let mut state = ConversationState::new("conv-handoff", None);
        state.history.push(Message::buyer("we need a loan and our budget is $200k"));
        state.handoff = Some(HandoffContext {
            source: "seller_bot".to_string(),
            financing_status: FinancingStatus::PreApproved,
            financial_readiness_score: 88.0,
            budget: None,
        });

        let assessor = FinancialAssessor::default();
        let outcome = assessor.assess(&state);
        // Echoed back, not recomputed from the conversation text.
        assert_eq!(
            outcome,
            AssessmentOutcome {
                budget: None,
                financing_status: FinancingStatus::PreApproved,
                financial_readiness_score: 88.0,
                step: state.step,
            }
        );
        // Idempotent on repeat.
        assert_eq!(assessor.assess(&state), outcome);
    }

    #[test]
    fn internal_failure_collapses_to_the_error_outcome() {
        let state = ConversationState::new("", None);
        let assessor = FinancialAssessor::default();
        let outcome = assessor.assess(&state);
        assert_eq!(outcome.financing_status, FinancingStatus::AssessmentError);
        assert_eq!(outcome.financial_readiness_score, 25.0);
    }

    #[test]
    fn missing_budget_routes_back_to_the_budget_step() {
        let mut state = ConversationState::new("conv-nobudget", None);
        state.history.push(Message::buyer("hello, we are pre-approved"));
        let outcome = FinancialAssessor::default().assess(&state);
        assert_eq!(outcome.financing_status, FinancingStatus::PreApproved);
        assert_eq!(outcome.step, QualificationStep::Budget);
    }

    #[test]
    fn affordability_math_matches_the_amortization_formula() {
        let finance = EngineConfig::default().finance;
        let affordability = estimate_affordability(500_000, &finance);

        assert_eq!(affordability.down_payment, Decimal::from(100_000));
        assert_eq!(affordability.loan_amount, Decimal::from(400_000));
        // 6.75% over 30 years on a 400k loan lands near $2,594/month.
        assert!(affordability.monthly_principal_interest > Decimal::from(2_500));
        assert!(affordability.monthly_principal_interest < Decimal::from(2_700));
        // 1.1% yearly taxes on 500k, flat 1800 yearly insurance.
        assert_eq!(affordability.monthly_taxes, Decimal::new(45_833, 2));
        assert_eq!(affordability.monthly_insurance, Decimal::from(150));
        assert_eq!(
            affordability.total_monthly,
            affordability.monthly_principal_interest
                + affordability.monthly_taxes
                + affordability.monthly_insurance
        );
    }

    #[test]
    fn zero_interest_falls_back_to_linear_amortization() {
        let mut finance = EngineConfig::default().finance;
        finance.annual_interest_rate = Decimal::ZERO;
        let affordability = estimate_affordability(360_000, &finance);
        // 288k loan over 360 payments.
        assert_eq!(affordability.monthly_principal_interest, Decimal::from(800));
    }
}
