//! Reinvestment engine (C7 §4.9): principal redeployment during the
//! reinvestment period.
//!
//! The portfolio-metric half (`metrics`, the par-build test) generalizes
//! the teacher's `clo_analytics::reinvestment` module's WARF/WAL/WAS/
//! diversity-score logic verbatim, now read directly off
//! [`CollateralPool`] (C4) instead of a flat `PoolAsset` DTO. On top of
//! that, `run` adds the budget-constrained synthetic-asset construction
//! and the concentration pre-check against C8: a proposed purchase is
//! priced as a hypothetical addition to the pool, every concentration
//! test is re-evaluated against it, and the purchase is rejected the
//! moment one would breach — at which point the unspent budget diverts
//! to principal rather than sitting idle (§8 Scenario 5).

use std::collections::HashMap;

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetRatings};
use crate::compliance::threshold::ThresholdHistory;
use crate::compliance::{ComplianceContext, CountryGroups, Direction, TestCategory, TestDef, TestId};
use crate::error::EngineError;
use crate::liability::Tranche;
use crate::pool::CollateralPool;
use crate::types::{AmortizationSchedule, CouponType, DayCount, Frequency, Money, Rate, Rating};
use crate::EngineResult;

/// Target profile for synthetic assets purchased during reinvestment
/// (§4.9: "a reinvestment budget, a target asset profile (average
/// spread, rating, recovery)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestmentProfile {
    pub par_per_purchase: Money,
    pub spread: Rate,
    pub rating: Rating,
    pub industry: String,
    pub country: String,
    pub obligor_prefix: String,
    pub maturity_years: u32,
    pub day_count: DayCount,
    pub frequency: Frequency,
}

/// Par-weighted pool metrics plus the par-build test, reused from C4's
/// aggregate metric suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestmentMetrics {
    pub warf: Decimal,
    pub wal: Decimal,
    pub was: Rate,
    pub diversity_score: Decimal,
    pub weighted_average_recovery: Rate,
    pub par_amount: Money,
    pub par_build_needed: bool,
}

/// Portfolio metrics for the pool as it stands, plus whether par build
/// (current par below the deal's target par) is still needed.
pub fn metrics(pool: &CollateralPool, as_of: NaiveDate, target_par: Money) -> ReinvestmentMetrics {
    let m = pool.metrics(as_of);
    ReinvestmentMetrics {
        warf: m.warf,
        wal: m.wal,
        was: m.was,
        diversity_score: m.diversity_score,
        weighted_average_recovery: m.weighted_average_recovery,
        par_amount: m.total_par,
        par_build_needed: m.total_par < target_par,
    }
}

/// One purchase attempt's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub asset_id: Option<String>,
    pub amount_invested: Money,
    pub amount_diverted_to_principal: Money,
    /// The concentration test that would have been breached, if the
    /// purchase was rejected.
    pub rejected_test: Option<TestId>,
}

/// Result of running reinvestment for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestmentResult {
    pub purchases: Vec<PurchaseOutcome>,
    pub total_invested: Money,
    pub total_diverted_to_principal: Money,
}

/// Deploy `budget` into synthetic assets matching `profile`, added
/// directly to `pool`, one `par_per_purchase` increment at a time, until
/// the budget is exhausted or a purchase would breach a concentration
/// test. On rejection, the full remaining budget diverts to principal
/// and reinvestment halts for the period (§4.9).
#[allow(clippy::too_many_arguments)]
pub fn run(
    pool: &mut CollateralPool,
    budget: Money,
    profile: &ReinvestmentProfile,
    as_of: NaiveDate,
    next_asset_seq: &mut u32,
    tranches: &[Tranche],
    cumulative_interest_due: &HashMap<u32, Money>,
    period_interest_available: Money,
    country_groups: &dyn CountryGroups,
    concentration_tests: &[TestDef],
    thresholds: &HashMap<TestId, ThresholdHistory>,
) -> EngineResult<ReinvestmentResult> {
    if budget < Decimal::ZERO {
        return Err(EngineError::BadInput {
            field: "budget".into(),
            reason: "reinvestment budget cannot be negative".into(),
        });
    }

    let mut remaining = budget;
    let mut purchases = Vec::new();
    let mut total_invested = Decimal::ZERO;
    let mut total_diverted = Decimal::ZERO;

    while remaining > Decimal::ZERO {
        let purchase_par = profile.par_per_purchase.min(remaining);
        if purchase_par.is_zero() {
            break;
        }

        let candidate = build_synthetic_asset(profile, as_of, *next_asset_seq, purchase_par);

        let mut hypothetical = pool.clone();
        hypothetical.add(candidate.clone());

        let breach = check_concentration(
            &hypothetical,
            as_of,
            tranches,
            cumulative_interest_due,
            period_interest_available,
            country_groups,
            concentration_tests,
            thresholds,
        )?;

        match breach {
            Some(test_id) => {
                purchases.push(PurchaseOutcome {
                    asset_id: None,
                    amount_invested: Decimal::ZERO,
                    amount_diverted_to_principal: remaining,
                    rejected_test: Some(test_id),
                });
                total_diverted += remaining;
                remaining = Decimal::ZERO;
                break;
            }
            None => {
                *next_asset_seq += 1;
                pool.add(candidate.clone());
                purchases.push(PurchaseOutcome {
                    asset_id: Some(candidate.id.clone()),
                    amount_invested: purchase_par,
                    amount_diverted_to_principal: Decimal::ZERO,
                    rejected_test: None,
                });
                total_invested += purchase_par;
                remaining -= purchase_par;
            }
        }
    }

    Ok(ReinvestmentResult {
        purchases,
        total_invested,
        total_diverted_to_principal: total_diverted,
    })
}

fn build_synthetic_asset(profile: &ReinvestmentProfile, as_of: NaiveDate, seq: u32, par: Money) -> Asset {
    let maturity = as_of
        .checked_add_months(Months::new(profile.maturity_years * 12))
        .unwrap_or(as_of);
    let obligor = format!("{}-{:04}", profile.obligor_prefix, seq);
    Asset {
        id: obligor.clone(),
        initial_par: par,
        current_balance: par,
        coupon: CouponType::Floating { spread: profile.spread },
        frequency: profile.frequency,
        day_count: profile.day_count,
        origination_date: as_of,
        first_payment_date: as_of,
        maturity_date: maturity,
        legal_final_date: maturity,
        amortization: AmortizationSchedule::Bullet,
        seniority: "Senior Secured".into(),
        industry_sp: profile.industry.clone(),
        industry_moody: profile.industry.clone(),
        country: profile.country.clone(),
        obligor_group: obligor,
        ratings: AssetRatings {
            moody: profile.rating,
            moody_on_watch_downgrade: false,
            sp: profile.rating,
            sp_on_watch_downgrade: false,
        },
        covenant_lite: false,
        dip: false,
        current_pay: true,
        defaulted: false,
        recovery_expectation: Decimal::ZERO,
        market_price: dec!(100),
    }
}

/// Re-evaluate every concentration-style test (obligor, industry,
/// geography, rating-based) against `pool` — which already includes the
/// candidate purchase — and return the first test id that would breach
/// its effective threshold, if any.
#[allow(clippy::too_many_arguments)]
fn check_concentration(
    pool: &CollateralPool,
    as_of: NaiveDate,
    tranches: &[Tranche],
    cumulative_interest_due: &HashMap<u32, Money>,
    period_interest_available: Money,
    country_groups: &dyn CountryGroups,
    concentration_tests: &[TestDef],
    thresholds: &HashMap<TestId, ThresholdHistory>,
) -> EngineResult<Option<TestId>> {
    let ctx = ComplianceContext {
        pool,
        as_of,
        tranches,
        cumulative_interest_due,
        period_interest_available,
        defaulted_par: Decimal::ZERO,
        country_groups,
        mag_version: None,
    };

    for def in concentration_tests {
        if !matches!(
            def.category,
            TestCategory::ObligorConcentration
                | TestCategory::IndustryConcentration
                | TestCategory::Geography
                | TestCategory::RatingBased
        ) {
            continue;
        }
        let history = thresholds.get(&def.id).ok_or_else(|| {
            EngineError::InsufficientData(format!(
                "no threshold history for test {} ({})",
                def.id.0, def.name
            ))
        })?;
        let threshold = history.effective_as_of(as_of, None)?;
        let value = ctx.evaluate_formula(&def.formula);
        let breach = match def.direction {
            Direction::Max => value > threshold.value,
            Direction::Min => value < threshold.value,
        };
        if breach {
            return Ok(Some(def.id));
        }
    }
    Ok(None)
}
