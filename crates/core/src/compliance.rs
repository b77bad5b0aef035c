use crate::errors::ViolationCategory;

/// Scan outbound or inbound text for policy violation markers.
///
/// Detection is deliberately blunt: a false positive costs a human review,
/// a false negative costs a regulatory incident. First match wins in
/// severity order.
pub fn scan(text: &str) -> Option<ViolationCategory> {
    const FAIR_HOUSING: &[&str] = &[
        "no section 8",
        "no vouchers",
        "adults only",
        "no kids",
        "no children",
        "perfect for christians",
        "english speakers only",
        "no immigrants",
        "our kind of people",
    ];
    const FINANCIAL_REGULATION: &[&str] = &[
        "guaranteed approval",
        "guaranteed loan",
        "no credit check needed",
        "skip the appraisal",
        "we can hide",
    ];
    const PRIVACY: &[&str] = &[
        "social security number",
        "ssn",
        "share your bank login",
        "send your account number",
    ];
    const LICENSING: &[&str] = &[
        "unlicensed agent",
        "without a license",
        "act as your attorney",
        "legal advice about the contract",
    ];

    let normalized = text.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| normalized.contains(marker));

    if contains_any(FAIR_HOUSING) {
        Some(ViolationCategory::FairHousing)
    } else if contains_any(FINANCIAL_REGULATION) {
        Some(ViolationCategory::FinancialRegulation)
    } else if contains_any(PRIVACY) {
        Some(ViolationCategory::Privacy)
    } else if contains_any(LICENSING) {
        Some(ViolationCategory::Licensing)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::scan;
    use crate::errors::{Severity, ViolationCategory};

    #[test]
    fn fair_housing_language_is_flagged_critical() {
        let category = scan("This building is adults only, no kids").expect("violation");
        assert_eq!(category, ViolationCategory::FairHousing);
        assert_eq!(category.severity(), Severity::Critical);
    }

    #[test]
    fn financial_and_privacy_and_licensing_categories_detect() {
        assert_eq!(
            scan("we offer guaranteed approval for everyone"),
            Some(ViolationCategory::FinancialRegulation)
        );
        assert_eq!(
            scan("just text me your social security number"),
            Some(ViolationCategory::Privacy)
        );
        assert_eq!(
            scan("I can act as your attorney for the closing"),
            Some(ViolationCategory::Licensing)
        );
    }

    #[test]
    fn ordinary_sales_text_is_clean() {
        assert_eq!(scan("Happy to line up a tour this weekend for the Maple St listing"), None);
    }
}
