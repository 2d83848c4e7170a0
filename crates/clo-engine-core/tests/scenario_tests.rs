//! Deal-level integration tests exercising `run_deal` end to end across
//! a full period loop, rather than the per-module unit tests elsewhere
//! in the crate.

use std::collections::HashMap;

use chrono::NaiveDate;
use clo_engine_core::asset::{Asset, AssetRatings};
use clo_engine_core::compliance::registry::standard_tests;
use clo_engine_core::compliance::threshold::{ThresholdHistory, ThresholdRecord, ThresholdSource};
use clo_engine_core::compliance::{Direction, TestId};
use clo_engine_core::engine::{
    self, CashFlowAssumptions, CountryGroupTable, DealConfig,
};
use clo_engine_core::fees::{DeferralPolicy, Fee, FeeBasis};
use clo_engine_core::liability::Tranche;
use clo_engine_core::pool::CollateralPool;
use clo_engine_core::types::{AmortizationSchedule, CouponType, DayCount, Frequency, Rating};
use clo_engine_core::waterfall::mag::MagFlags;
use clo_engine_core::waterfall::strategies::{TrancheCohort, WaterfallConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn flat_threshold(test_id: TestId, value: Decimal) -> ThresholdHistory {
    let mut history = ThresholdHistory::default();
    history.append(ThresholdRecord {
        test_id,
        value,
        source: ThresholdSource::Default,
        effective_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        expiry_date: None,
        mag_version: None,
    });
    history
}

fn loose_thresholds() -> HashMap<TestId, ThresholdHistory> {
    standard_tests()
        .into_iter()
        .map(|def| {
            let value = match def.direction {
                Direction::Max => dec!(1.00),
                Direction::Min => dec!(0.01),
            };
            (def.id, flat_threshold(def.id, value))
        })
        .collect()
}

fn stressed_asset(id: &str, par: Decimal) -> Asset {
    Asset {
        id: id.into(),
        initial_par: par,
        current_balance: par,
        coupon: CouponType::Fixed { rate: dec!(0.06) },
        frequency: Frequency::Quarterly,
        day_count: DayCount::Act360,
        origination_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        first_payment_date: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
        maturity_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        legal_final_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        amortization: AmortizationSchedule::Bullet,
        seniority: "Senior Secured".into(),
        industry_sp: "Software".into(),
        industry_moody: "Software".into(),
        country: "United States".into(),
        obligor_group: id.into(),
        ratings: AssetRatings {
            moody: Rating::B2,
            moody_on_watch_downgrade: false,
            sp: Rating::B2,
            sp_on_watch_downgrade: false,
        },
        covenant_lite: true,
        dip: false,
        current_pay: true,
        defaulted: false,
        recovery_expectation: Decimal::ZERO,
        market_price: dec!(100),
    }
}

fn tranche(name: &str, balance: Decimal, rate: Decimal, pik_active: bool) -> Tranche {
    Tranche {
        name: name.into(),
        seniority_rank: 1,
        original_balance: balance,
        current_balance: balance,
        coupon: CouponType::Fixed { rate },
        pik_allowed: pik_active,
        pik_active,
        deferred_interest: Decimal::ZERO,
        deferred_interest_penalty_rate: dec!(0.02),
        write_down: Decimal::ZERO,
        history: Vec::new(),
    }
}

/// §8 Scenario 2: on a stressed pool where the Class A coverage test
/// fails throughout, turbo keeps sweeping principal to Class A via its
/// `turbo_active` override while traditional's own coverage gate blocks
/// that cohort's principal step entirely, so turbo must retire at least
/// as much Class A balance as traditional over the same horizon.
fn base_config(strategy_name: &str) -> DealConfig {
    let assets: Vec<Asset> = (0..20)
        .map(|i| stressed_asset(&format!("loan-{i}"), dec!(5_000_000)))
        .collect();

    let waterfall_config = WaterfallConfig {
        cohorts: vec![TrancheCohort {
            tranche_name: "Class A".into(),
            oc_test: TestId(49),
            ic_test: TestId(50),
        }],
        senior_fees: vec!["Trustee Fee".into()],
        subordinate_fees: vec![],
        equity_tranche: "Equity".into(),
    };

    // Class A's own OC test (49) is set to an unreachable threshold so it
    // fails every period; every other test stays loose.
    let mut thresholds = loose_thresholds();
    thresholds.insert(TestId(49), flat_threshold(TestId(49), dec!(10.0)));

    DealConfig {
        deal_id: "stressed-deal".into(),
        pool: CollateralPool::new(assets),
        tranches: vec![tranche("Class A", dec!(80_000_000), dec!(0.03), false)],
        fees: vec![Fee::new("Trustee Fee", dec!(0.001), FeeBasis::CollateralPar, DeferralPolicy::Defer)],
        closing_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        legal_final: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        payment_frequency: Frequency::Quarterly,
        yield_curve: None,
        assumptions: CashFlowAssumptions {
            annual_default_rate: dec!(0.03),
            annual_prepay_rate: Decimal::ZERO,
            recovery_lag_periods: 2,
        },
        waterfall_config,
        strategy_name: strategy_name.into(),
        eod_strategy_name: None,
        event_of_default: None,
        reinvestment: None,
        incentive_fee: None,
        compliance_tests: standard_tests(),
        thresholds,
        mag_version: None,
        mag_flags: MagFlags::default(),
        country_groups: CountryGroupTable::default(),
        non_call_period_end: None,
    }
}

#[test]
fn turbo_pays_down_class_a_at_least_as_fast_as_traditional() {
    let traditional = engine::run_deal(base_config("traditional")).unwrap();
    let turbo = engine::run_deal(base_config("turbo")).unwrap();

    let traditional_balance = traditional
        .tranche_summary
        .iter()
        .find(|t| t.name == "Class A")
        .unwrap()
        .final_balance;
    let turbo_balance = turbo
        .tranche_summary
        .iter()
        .find(|t| t.name == "Class A")
        .unwrap()
        .final_balance;

    // Traditional's per-cohort coverage gate is permanently closed (the
    // test is unreachable), so it never pays Class A principal at all.
    assert_eq!(traditional_balance, dec!(80_000_000));
    // Turbo's `turbo_active` override fires whenever any test fails,
    // which in this deal is every period, so it keeps sweeping.
    assert!(
        turbo_balance < traditional_balance,
        "turbo ({turbo_balance}) should retire more Class A balance than traditional ({traditional_balance})"
    );
}

/// §8 Scenario 3: a junior, PIK-allowed tranche whose interest due
/// exceeds its share of interest collections must have the shortfall
/// capitalized into its balance rather than deferred, growing the
/// tranche's current balance above its original balance over the run.
#[test]
fn pik_allowed_tranche_capitalizes_shortfall_under_cash_shortage() {
    let assets: Vec<Asset> = (0..6)
        .map(|i| stressed_asset(&format!("loan-{i}"), dec!(5_000_000)))
        .collect();

    let waterfall_config = WaterfallConfig {
        cohorts: vec![
            TrancheCohort { tranche_name: "Class A".into(), oc_test: TestId(49), ic_test: TestId(50) },
            TrancheCohort { tranche_name: "Class E".into(), oc_test: TestId(51), ic_test: TestId(52) },
        ],
        senior_fees: vec!["Trustee Fee".into()],
        subordinate_fees: vec![],
        equity_tranche: "Equity".into(),
    };

    let config = DealConfig {
        deal_id: "pik-deal".into(),
        pool: CollateralPool::new(assets),
        // Class E's coupon is set far above what's left over once Class
        // A's senior interest and the trustee fee are paid, guaranteeing
        // a shortfall every period regardless of default timing.
        tranches: vec![
            tranche("Class A", dec!(20_000_000), dec!(0.04), false),
            tranche("Class E", dec!(5_000_000), dec!(0.25), true),
        ],
        fees: vec![Fee::new("Trustee Fee", dec!(0.001), FeeBasis::CollateralPar, DeferralPolicy::Defer)],
        closing_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        legal_final: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        payment_frequency: Frequency::Quarterly,
        yield_curve: None,
        assumptions: CashFlowAssumptions {
            annual_default_rate: Decimal::ZERO,
            annual_prepay_rate: Decimal::ZERO,
            recovery_lag_periods: 2,
        },
        waterfall_config,
        strategy_name: "pik_toggle".into(),
        eod_strategy_name: None,
        event_of_default: None,
        reinvestment: None,
        incentive_fee: None,
        compliance_tests: standard_tests(),
        thresholds: loose_thresholds(),
        mag_version: None,
        mag_flags: MagFlags::default(),
        country_groups: CountryGroupTable::default(),
        non_call_period_end: None,
    };

    let result = engine::run_deal(config).unwrap();
    let class_e = result.tranche_summary.iter().find(|t| t.name == "Class E").unwrap();

    assert!(
        class_e.total_interest_pik > Decimal::ZERO,
        "Class E should have capitalized at least one period's interest shortfall"
    );
    assert!(
        class_e.final_balance > dec!(5_000_000),
        "capitalized shortfall must grow Class E's balance above its original {}, got {}",
        dec!(5_000_000),
        class_e.final_balance
    );
}
