//! Query intent detection.
//!
//! A small fixed set of question categories is recognized by substring
//! probes against the lowercased query. Each intent carries the serialized
//! field label it maps to (when one exists) and the keyword set used by the
//! containment and fuzzy fallbacks.

/// Recognized question categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    /// Policy number or identifier.
    PolicyNumber,
    /// Total premium amount.
    TotalPremium,
    /// Deductible amounts.
    Deductibles,
    /// Coverage types and limits.
    CoverageLimits,
    /// Policy end date.
    ExpirationDate,
    /// Policy start date.
    EffectiveDate,
    /// Insurance company name.
    InsurerName,
    /// Insured person or entity.
    PolicyholderName,
    /// Insured property address.
    PropertyAddress,
}

impl QueryIntent {
    /// Detect the intent of a free-text query, if any.
    ///
    /// Probes run in a fixed order so queries mentioning several categories
    /// resolve the same way every time.
    pub fn detect(query: &str) -> Option<Self> {
        let query = query.to_lowercase();
        let probes: [(&str, Self); 10] = [
            ("policy number", Self::PolicyNumber),
            ("premium", Self::TotalPremium),
            ("deductible", Self::Deductibles),
            ("coverage", Self::CoverageLimits),
            ("expire", Self::ExpirationDate),
            ("expiration", Self::ExpirationDate),
            ("effective", Self::EffectiveDate),
            ("insurer", Self::InsurerName),
            ("policyholder", Self::PolicyholderName),
            ("address", Self::PropertyAddress),
        ];
        probes
            .iter()
            .find(|(needle, _)| query.contains(needle))
            .map(|(_, intent)| *intent)
    }

    /// The serialized field label this intent extracts, when one exists.
    ///
    /// Coverage and deductible intents have no single scalar field; they are
    /// answered from structured entries or the tabular scan instead.
    pub fn field_label(self) -> Option<&'static str> {
        match self {
            Self::PolicyNumber => Some("policy_number"),
            Self::TotalPremium => Some("total_premium"),
            Self::ExpirationDate => Some("expiration_date"),
            Self::EffectiveDate => Some("effective_date"),
            Self::InsurerName => Some("insurer_name"),
            Self::PolicyholderName => Some("policyholder_name"),
            Self::PropertyAddress => Some("property_address"),
            Self::Deductibles | Self::CoverageLimits => None,
        }
    }

    /// Keywords used for line containment and fuzzy matching.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::PolicyNumber => &["policy number", "policy_number"],
            Self::TotalPremium => &["premium", "total annual premium", "annual premium"],
            Self::Deductibles => &["deductible", "deductibles"],
            Self::CoverageLimits => &[
                "coverage",
                "coverage details",
                "dwelling coverage",
                "personal property",
                "liability",
            ],
            Self::ExpirationDate => &["expiration", "expire", "expiration date"],
            Self::EffectiveDate => &["effective", "effective date"],
            Self::InsurerName => &["insurer", "insurance company"],
            Self::PolicyholderName => &["policyholder", "insured"],
            Self::PropertyAddress => &["address", "property address"],
        }
    }

    /// Short answer prefix used when a field value is extracted.
    pub fn answer_label(self) -> &'static str {
        match self {
            Self::PolicyNumber => "Policy number",
            Self::TotalPremium => "Total premium",
            Self::Deductibles => "Deductible information",
            Self::CoverageLimits => "Coverage information",
            Self::ExpirationDate => "Expiration date",
            Self::EffectiveDate => "Effective date",
            Self::InsurerName => "Insurer",
            Self::PolicyholderName => "Policyholder",
            Self::PropertyAddress => "Property address",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_phrasings() {
        assert_eq!(
            QueryIntent::detect("What is the policy number?"),
            Some(QueryIntent::PolicyNumber)
        );
        assert_eq!(
            QueryIntent::detect("when does my policy EXPIRE"),
            Some(QueryIntent::ExpirationDate)
        );
        assert_eq!(
            QueryIntent::detect("coverage limits"),
            Some(QueryIntent::CoverageLimits)
        );
        assert_eq!(QueryIntent::detect("tell me a story"), None);
    }

    #[test]
    fn detection_order_is_stable_for_mixed_queries() {
        // "premium" wins over "coverage" because its probe runs first.
        assert_eq!(
            QueryIntent::detect("premium for dwelling coverage"),
            Some(QueryIntent::TotalPremium)
        );
    }

    #[test]
    fn structured_intents_have_no_scalar_label() {
        assert_eq!(QueryIntent::CoverageLimits.field_label(), None);
        assert_eq!(QueryIntent::Deductibles.field_label(), None);
        assert_eq!(
            QueryIntent::PolicyNumber.field_label(),
            Some("policy_number")
        );
    }
}
