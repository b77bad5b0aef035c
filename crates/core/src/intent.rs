use serde::{Deserialize, Serialize};

use crate::conversation::QualificationStep;

/// Buyer temperature bands over the overall intent composite.
/// Thresholds are fixed classification boundaries, not tunables.
const TEMP_HOT: f64 = 75.0;
const TEMP_WARM: f64 = 50.0;
const TEMP_LUKEWARM: f64 = 35.0;
const TEMP_COLD: f64 = 20.0;

/// A grouped composite below this gate selects that group's qualification
/// step; the chain is evaluated in fixed order, earliest unmet gate wins.
const NEXT_STEP_GATE: f64 = 50.0;

const WEIGHT_FINANCIAL: f64 = 0.40;
const WEIGHT_URGENCY: f64 = 0.35;
const WEIGHT_PREFERENCE: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperature {
    IceCold,
    Cold,
    Lukewarm,
    Warm,
    Hot,
}

impl Temperature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IceCold => "ice_cold",
            Self::Cold => "cold",
            Self::Lukewarm => "lukewarm",
            Self::Warm => "warm",
            Self::Hot => "hot",
        }
    }

    pub fn classify(overall: f64) -> Self {
        if overall >= TEMP_HOT {
            Self::Hot
        } else if overall >= TEMP_WARM {
            Self::Warm
        } else if overall >= TEMP_LUKEWARM {
            Self::Lukewarm
        } else if overall >= TEMP_COLD {
            Self::Cold
        } else {
            Self::IceCold
        }
    }
}

/// Immutable multi factor profile produced once per scoring call. A new
/// profile replaces the previous one on every turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentProfile {
    pub financial_readiness: f64,
    pub budget_clarity: f64,
    pub financing_progress: f64,
    pub urgency: f64,
    pub timeline_clarity: f64,
    pub consequence_pressure: f64,
    pub preference_clarity: f64,
    pub market_realism: f64,
    pub decision_authority: f64,
    pub financial_composite: f64,
    pub urgency_composite: f64,
    pub preference_composite: f64,
    pub overall: f64,
    pub temperature: Temperature,
    pub confidence: f64,
    pub recommended_step: QualificationStep,
}

impl IntentProfile {
    /// Documented default returned when scoring has nothing to work with.
    pub fn unscored() -> Self {
        Self {
            financial_readiness: 25.0,
            budget_clarity: 25.0,
            financing_progress: 25.0,
            urgency: 25.0,
            timeline_clarity: 25.0,
            consequence_pressure: 25.0,
            preference_clarity: 25.0,
            market_realism: 25.0,
            decision_authority: 25.0,
            financial_composite: 25.0,
            urgency_composite: 25.0,
            preference_composite: 25.0,
            overall: 25.0,
            temperature: Temperature::Cold,
            confidence: 10.0,
            recommended_step: QualificationStep::Budget,
        }
    }

    pub fn component_scores(&self) -> [f64; 9] {
        [
            self.financial_readiness,
            self.budget_clarity,
            self.financing_progress,
            self.urgency,
            self.timeline_clarity,
            self.consequence_pressure,
            self.preference_clarity,
            self.market_realism,
            self.decision_authority,
        ]
    }
}

/// Keyword vocabulary consulted by the scorer. Phrase lists are substring
/// matched against the lower cased buyer text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentKeywords {
    pub high_readiness: Vec<String>,
    pub low_readiness: Vec<String>,
    pub budget_context: Vec<String>,
    pub financing_progress: Vec<String>,
    pub urgency_high: Vec<String>,
    pub urgency_low: Vec<String>,
    pub timeline_markers: Vec<String>,
    pub consequence_markers: Vec<String>,
    pub preference_markers: Vec<String>,
    pub realism_positive: Vec<String>,
    pub realism_negative: Vec<String>,
    pub authority_positive: Vec<String>,
    pub authority_negative: Vec<String>,
}

impl Default for IntentKeywords {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|item| (*item).to_string()).collect()
        }

        Self {
            high_readiness: owned(&[
                "pre-approved",
                "pre approved",
                "preapproved",
                "cash buyer",
                "paying cash",
                "all cash",
                "proof of funds",
                "approved for",
                "down payment saved",
            ]),
            low_readiness: owned(&[
                "can't afford",
                "cannot afford",
                "no savings",
                "bad credit",
                "just curious",
                "not sure we can afford",
            ]),
            budget_context: owned(&["budget", "price range", "spend", "afford up to", "max price"]),
            financing_progress: owned(&[
                "lender",
                "mortgage",
                "loan officer",
                "rate quote",
                "down payment",
                "underwriting",
                "approved",
            ]),
            urgency_high: owned(&[
                "asap",
                "immediately",
                "right away",
                "as soon as possible",
                "this week",
                "this weekend",
                "ready to",
                "need to move",
            ]),
            urgency_low: owned(&["just browsing", "no rush", "someday", "eventually", "next year"]),
            timeline_markers: owned(&[
                "this month",
                "next month",
                "30 days",
                "60 days",
                "90 days",
                "this weekend",
                "lease ends",
                "lease is up",
                "by the end of",
                "closing date",
            ]),
            consequence_markers: owned(&[
                "relocating",
                "new job",
                "job starts",
                "baby on the way",
                "growing family",
                "sold our house",
                "sold my house",
                "lease expires",
            ]),
            preference_markers: owned(&[
                "bedroom",
                "bath",
                "garage",
                "yard",
                "school district",
                "neighborhood",
                "condo",
                "townhouse",
                "single family",
                "pool",
                "basement",
                "home office",
            ]),
            realism_positive: owned(&["flexible", "open to", "compromise", "realistic"]),
            realism_negative: owned(&[
                "must have everything",
                "perfect home",
                "way below market",
                "steal",
                "lowball",
            ]),
            authority_positive: owned(&[
                "my wife and i",
                "my husband and i",
                "my partner and i",
                "we both",
                "just me",
                "sole decision",
                "i decide",
            ]),
            authority_negative: owned(&[
                "ask my",
                "talk to my",
                "check with",
                "my parents",
                "convince",
            ]),
        }
    }
}

/// Pure, deterministic scorer. No I/O, never panics; degenerate input yields
/// `IntentProfile::unscored`.
#[derive(Clone, Debug, Default)]
pub struct IntentScorer {
    keywords: IntentKeywords,
}

impl IntentScorer {
    pub fn new(keywords: IntentKeywords) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &IntentKeywords {
        &self.keywords
    }

    pub fn score(&self, conversation_text: &str) -> IntentProfile {
        let text = conversation_text.to_lowercase();
        if text.trim().is_empty() {
            return IntentProfile::unscored();
        }
        let k = &self.keywords;

        let mut matched_categories = 0usize;
        let mut tally = |phrases: &[String]| -> usize {
            let count = phrases.iter().filter(|phrase| text.contains(phrase.as_str())).count();
            if count > 0 {
                matched_categories += 1;
            }
            count
        };

        let high_readiness = tally(&k.high_readiness);
        let low_readiness = tally(&k.low_readiness);
        let budget_context = tally(&k.budget_context);
        let financing = tally(&k.financing_progress);
        let urgency_high = tally(&k.urgency_high);
        let urgency_low = tally(&k.urgency_low);
        let timeline = tally(&k.timeline_markers);
        let consequence = tally(&k.consequence_markers);
        let preference = tally(&k.preference_markers);
        let realism_positive = tally(&k.realism_positive);
        let realism_negative = tally(&k.realism_negative);
        let authority_positive = tally(&k.authority_positive);
        let authority_negative = tally(&k.authority_negative);

        let has_dollar_amount = has_dollar_amount(&text);
        if has_dollar_amount {
            matched_categories += 1;
        }

        let financial_readiness =
            clamp(25.0 + bonus(high_readiness, 30.0, 60.0) - bonus(low_readiness, 10.0, 20.0));
        let budget_clarity = clamp(
            20.0 + if has_dollar_amount { 30.0 } else { 0.0 } + bonus(budget_context, 15.0, 30.0),
        );
        let financing_progress = clamp(20.0 + bonus(financing, 15.0, 45.0));
        let urgency =
            clamp(30.0 + bonus(urgency_high, 20.0, 60.0) - bonus(urgency_low, 10.0, 20.0));
        let timeline_clarity = clamp(25.0 + bonus(timeline, 20.0, 40.0));
        let consequence_pressure = clamp(20.0 + bonus(consequence, 20.0, 40.0));
        let preference_clarity = clamp(30.0 + bonus(preference, 10.0, 50.0));
        let market_realism = clamp(
            50.0 + bonus(realism_positive, 10.0, 20.0) - bonus(realism_negative, 15.0, 30.0),
        );
        let decision_authority = clamp(
            50.0 + bonus(authority_positive, 15.0, 30.0) - bonus(authority_negative, 15.0, 30.0),
        );

        let financial_composite = mean3(financial_readiness, budget_clarity, financing_progress);
        let urgency_composite = mean3(urgency, timeline_clarity, consequence_pressure);
        let preference_composite = mean3(preference_clarity, market_realism, decision_authority);
        let overall = clamp(
            financial_composite * WEIGHT_FINANCIAL
                + urgency_composite * WEIGHT_URGENCY
                + preference_composite * WEIGHT_PREFERENCE,
        );

        let recommended_step = recommend_step(
            financial_composite,
            urgency_composite,
            preference_clarity,
            decision_authority,
        );

        IntentProfile {
            financial_readiness,
            budget_clarity,
            financing_progress,
            urgency,
            timeline_clarity,
            consequence_pressure,
            preference_clarity,
            market_realism,
            decision_authority,
            financial_composite,
            urgency_composite,
            preference_composite,
            overall,
            temperature: Temperature::classify(overall),
            confidence: (10.0 + 10.0 * matched_categories as f64).min(95.0),
            recommended_step,
        }
    }
}

/// Earliest unmet gate wins; this ordering is load bearing for downstream
/// routing and must not be reordered.
fn recommend_step(
    financial: f64,
    urgency: f64,
    preference: f64,
    authority: f64,
) -> QualificationStep {
    if financial < NEXT_STEP_GATE {
        QualificationStep::Budget
    } else if urgency < NEXT_STEP_GATE {
        QualificationStep::Timeline
    } else if preference < NEXT_STEP_GATE {
        QualificationStep::Preferences
    } else if authority < NEXT_STEP_GATE {
        QualificationStep::DecisionMakers
    } else {
        QualificationStep::PropertySearch
    }
}

fn bonus(matches: usize, per_match: f64, cap: f64) -> f64 {
    (matches as f64 * per_match).min(cap)
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn mean3(a: f64, b: f64, c: f64) -> f64 {
    (a + b + c) / 3.0
}

fn has_dollar_amount(text: &str) -> bool {
    text.split_whitespace().any(|token| {
        token.starts_with('$')
            && token.chars().nth(1).is_some_and(|second| second.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::{IntentProfile, IntentScorer, Temperature};
    use crate::conversation::QualificationStep;

    #[test]
    fn empty_input_yields_the_documented_default_profile() {
        let scorer = IntentScorer::default();
        let profile = scorer.score("   ");
        assert_eq!(profile, IntentProfile::unscored());
        assert_eq!(profile.temperature, Temperature::Cold);
        assert_eq!(profile.confidence, 10.0);
        assert_eq!(profile.recommended_step, QualificationStep::Budget);
    }

    #[test]
    fn all_component_scores_stay_clamped_at_extreme_keyword_density() {
        let scorer = IntentScorer::default();
        let keywords = scorer.keywords().clone();
        let mut stuffed = String::from("$900k ");
        for list in [
            &keywords.high_readiness,
            &keywords.low_readiness,
            &keywords.budget_context,
            &keywords.financing_progress,
            &keywords.urgency_high,
            &keywords.urgency_low,
            &keywords.timeline_markers,
            &keywords.consequence_markers,
            &keywords.preference_markers,
            &keywords.realism_positive,
            &keywords.realism_negative,
            &keywords.authority_positive,
            &keywords.authority_negative,
        ] {
            for phrase in list {
                stuffed.push_str(phrase);
                stuffed.push(' ');
            }
        }
        // Repeat to push densities well past every cap.
        let stuffed = stuffed.repeat(25);

        let profile = scorer.score(&stuffed);
        for score in profile.component_scores() {
            assert!((0.0..=100.0).contains(&score), "component out of range: {score}");
        }
        assert!((0.0..=100.0).contains(&profile.overall));
    }

    #[test]
    fn temperature_is_monotonic_in_overall_score() {
        let mut previous = Temperature::IceCold;
        for step in 0..=1000 {
            let overall = step as f64 / 10.0;
            let current = Temperature::classify(overall);
            assert!(current >= previous, "temperature regressed at overall={overall}");
            previous = current;
        }
        assert_eq!(Temperature::classify(19.9), Temperature::IceCold);
        assert_eq!(Temperature::classify(20.0), Temperature::Cold);
        assert_eq!(Temperature::classify(35.0), Temperature::Lukewarm);
        assert_eq!(Temperature::classify(50.0), Temperature::Warm);
        assert_eq!(Temperature::classify(75.0), Temperature::Hot);
    }

    #[test]
    fn next_step_chain_takes_the_earliest_unmet_gate() {
        use super::recommend_step;

        assert_eq!(recommend_step(40.0, 90.0, 90.0, 90.0), QualificationStep::Budget);
        assert_eq!(recommend_step(60.0, 40.0, 90.0, 90.0), QualificationStep::Timeline);
        assert_eq!(recommend_step(60.0, 60.0, 40.0, 90.0), QualificationStep::Preferences);
        assert_eq!(recommend_step(60.0, 60.0, 60.0, 40.0), QualificationStep::DecisionMakers);
        assert_eq!(recommend_step(60.0, 60.0, 60.0, 60.0), QualificationStep::PropertySearch);
        // Two unmet gates: the earlier one still wins.
        assert_eq!(recommend_step(40.0, 40.0, 40.0, 40.0), QualificationStep::Budget);
    }

    #[test]
    fn strong_buyer_message_scores_warmer_than_idle_browsing() {
        let scorer = IntentScorer::default();
        let strong = scorer.score(
            "We are pre approved with our lender, budget is $625k, and my wife and I are ready to \
             tour this weekend because of a new job relocation. Looking for a 4 bedroom with a yard.",
        );
        let idle = scorer.score("just browsing for someday, no rush at all");

        assert!(strong.overall > idle.overall);
        assert!(strong.financial_composite > idle.financial_composite);
        assert!(strong.temperature > idle.temperature);
        assert!(idle.urgency < 30.0);
    }

    #[test]
    fn low_readiness_markers_drag_the_financial_component_down() {
        let scorer = IntentScorer::default();
        let profile = scorer.score("we have bad credit and no savings, just curious about homes");
        assert!(profile.financial_readiness < 25.0);
        assert_eq!(profile.recommended_step, QualificationStep::Budget);
    }

    #[test]
    fn dollar_amounts_raise_budget_clarity() {
        let scorer = IntentScorer::default();
        let with_amount = scorer.score("our budget is $450k");
        let without_amount = scorer.score("our budget is still undecided");
        assert!(with_amount.budget_clarity > without_amount.budget_clarity);
    }
}
