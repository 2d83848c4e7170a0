//! Standard 54-test registry (§4.6 / §4.8): obligor, industry, geography,
//! rating, collateral-quality, and coverage tests.
//!
//! Grounded on the teacher's `credit::covenants::Covenant` shape
//! (`metric`, `threshold`, `direction`) and `clo_analytics::coverage_tests`
//! OC/IC formulas, generalized from 54 hand-written functions into one
//! data-driven table: a [`super::TestDef`] closes a [`super::TestFormula`]
//! over the pool/deal state rather than hand-coding each check.

use super::{Direction, TestCategory, TestDef, TestFormula, TestId};

/// Individual country sublimits a typical CLO indenture carries alongside
/// the three regional group tests, padding the geography category out to
/// its documented share of the 54-test suite.
const COUNTRY_SUBLIMITS: [&str; 24] = [
    "United Kingdom",
    "Germany",
    "France",
    "Netherlands",
    "Ireland",
    "Luxembourg",
    "Spain",
    "Italy",
    "Sweden",
    "Switzerland",
    "Canada",
    "Australia",
    "Belgium",
    "Denmark",
    "Norway",
    "Finland",
    "Austria",
    "Portugal",
    "Japan",
    "Cayman Islands",
    "Bermuda",
    "Jersey",
    "Guernsey",
    "Isle of Man",
];

/// Standard tranche cohort ranks carrying their own OC/IC coverage tests:
/// the five-class structure (A through E/equity-adjacent) most CLOs use.
/// A deal with fewer classes simply has fewer of these tests applicable.
const COVERAGE_COHORT_RANKS: [u32; 5] = [1, 2, 3, 4, 5];

/// Build the fixed table of all 54 standard compliance tests.
pub fn standard_tests() -> Vec<TestDef> {
    let mut tests = Vec::with_capacity(54);
    let mut next_id = 1u32;
    let mut push = |name: &str, category: TestCategory, formula: TestFormula, direction: Direction| {
        tests.push(TestDef {
            id: TestId(next_id),
            name: name.to_string(),
            category,
            formula,
            direction,
        });
        next_id += 1;
    };

    // --- Obligor concentration (2) ---
    push("Largest Obligor Concentration", TestCategory::ObligorConcentration, TestFormula::LargestObligorShare, Direction::Max);
    push("Top 5 Obligor Concentration", TestCategory::ObligorConcentration, TestFormula::TopNObligorShare { n: 5 }, Direction::Max);

    // --- Industry concentration (3) ---
    push("Largest Industry Concentration", TestCategory::IndustryConcentration, TestFormula::LargestIndustryShare, Direction::Max);
    push("Top 3 Industry Concentration", TestCategory::IndustryConcentration, TestFormula::TopNIndustryShare { n: 3 }, Direction::Max);
    push("Top 5 Industry Concentration", TestCategory::IndustryConcentration, TestFormula::TopNIndustryShare { n: 5 }, Direction::Max);

    // --- Geography (3 group tests + 24 country sublimits = 27) ---
    push("Group I Country Concentration", TestCategory::Geography, TestFormula::GroupCountryShare { group: 1 }, Direction::Max);
    push("Group II Country Concentration", TestCategory::Geography, TestFormula::GroupCountryShare { group: 2 }, Direction::Max);
    push("Group III Country Concentration", TestCategory::Geography, TestFormula::GroupCountryShare { group: 3 }, Direction::Max);
    for country in COUNTRY_SUBLIMITS {
        push(
            &format!("{country} Concentration"),
            TestCategory::Geography,
            TestFormula::CountryShare { country: country.to_string() },
            Direction::Max,
        );
    }

    // --- Rating-based (6) ---
    push("Maximum CCC/Caa Concentration", TestCategory::RatingBased, TestFormula::CccOrBelowShare, Direction::Max);
    push("Maximum Covenant-Lite Concentration", TestCategory::RatingBased, TestFormula::CovenantLiteShare, Direction::Max);
    push("Maximum Fixed-Rate Concentration", TestCategory::RatingBased, TestFormula::FixedRateShare, Direction::Max);
    push("Maximum Deferrable Security Concentration", TestCategory::RatingBased, TestFormula::DeferrableShare, Direction::Max);
    push("Maximum Long-Dated Concentration", TestCategory::RatingBased, TestFormula::LongDatedShare { years: 8 }, Direction::Max);
    push("Maximum DIP Concentration", TestCategory::RatingBased, TestFormula::DipShare, Direction::Max);

    // --- Collateral quality (6) ---
    push("Maximum Weighted Average Rating Factor", TestCategory::CollateralQuality, TestFormula::Warf, Direction::Max);
    push("Maximum Weighted Average Life", TestCategory::CollateralQuality, TestFormula::Wal, Direction::Max);
    push("Minimum Weighted Average Spread", TestCategory::CollateralQuality, TestFormula::Was, Direction::Min);
    push("Minimum Moody Diversity Score", TestCategory::CollateralQuality, TestFormula::DiversityScore, Direction::Min);
    push("Minimum Weighted Average Recovery Rate", TestCategory::CollateralQuality, TestFormula::WeightedAverageRecovery, Direction::Min);
    push("Minimum JROC", TestCategory::CollateralQuality, TestFormula::Jroc, Direction::Min);

    // --- Coverage (5 cohorts x OC/IC = 10) ---
    for rank in COVERAGE_COHORT_RANKS {
        push(
            &format!("Class (rank {rank}) Overcollateralization Test"),
            TestCategory::Coverage,
            TestFormula::OcRatio { through_rank: rank },
            Direction::Min,
        );
        push(
            &format!("Class (rank {rank}) Interest Coverage Test"),
            TestCategory::Coverage,
            TestFormula::IcRatio { through_rank: rank },
            Direction::Min,
        );
    }

    tests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_has_exactly_54_tests() {
        assert_eq!(standard_tests().len(), 54);
    }

    #[test]
    fn test_all_test_ids_are_unique_and_sequential() {
        let tests = standard_tests();
        for (i, t) in tests.iter().enumerate() {
            assert_eq!(t.id.0, (i + 1) as u32);
        }
    }
}
