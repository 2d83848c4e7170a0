//! Concrete waterfall strategy builders: the step sequences real CLO
//! indentures describe in prose, expressed as [`super::WaterfallStep`]
//! lists a [`super::Strategy`] hands to [`super::engine::run_step_sequence`].
//!
//! Each builder takes a [`WaterfallConfig`] describing the deal's tranche
//! seniority order and fee schedule and returns a
//! [`super::StepSequenceStrategy`] — there is deliberately no per-strategy
//! execution code here, only step-sequence assembly, so every strategy
//! variant runs through the one shared harness.

use crate::accounts::AccountName;
use crate::compliance::TestId;

use super::formula::{self, Formula};
use super::{StepDestination, StepSequenceStrategy, Trigger, WaterfallStep};

/// One tranche's place in the priority order, plus the compliance tests
/// that gate its principal paydown.
#[derive(Debug, Clone)]
pub struct TrancheCohort {
    pub tranche_name: String,
    pub oc_test: TestId,
    pub ic_test: TestId,
}

/// The deal-specific inputs every strategy builder closes over: tranche
/// seniority order (senior to junior), the recurring fee schedule (also
/// senior to junior), and the equity tranche name.
#[derive(Debug, Clone)]
pub struct WaterfallConfig {
    pub cohorts: Vec<TrancheCohort>,
    pub senior_fees: Vec<String>,
    pub subordinate_fees: Vec<String>,
    pub equity_tranche: String,
}

fn interest_formula() -> Formula {
    formula::parse("tranche_balance * coupon_rate * period_frac + deferred_interest").expect("static formula")
}

fn principal_paydown_formula() -> Formula {
    formula::parse("min(available_cash, tranche_balance)").expect("static formula")
}

fn fee_formula() -> Formula {
    formula::parse("fee_due + deferred_balance").expect("static formula")
}

fn residual_formula() -> Formula {
    formula::parse("available_cash").expect("static formula")
}

/// A cohort's principal paydown fires only when both its coverage tests
/// pass and the deal is not in its reinvestment period — during
/// reinvestment, principal collections divert to new purchases rather
/// than amortizing notes, via the `"reinvestment_period"` flag the deal
/// engine sets each period.
fn cohort_coverage_trigger(cohort: &TrancheCohort) -> Trigger {
    Trigger::And(
        Box::new(Trigger::And(
            Box::new(Trigger::TestPasses(cohort.oc_test)),
            Box::new(Trigger::TestPasses(cohort.ic_test)),
        )),
        Box::new(Trigger::FlagUnset("reinvestment_period".into())),
    )
}

/// The standard sequential priority of payments: senior fees, then
/// tranche interest senior-to-junior, then tranche
/// principal senior-to-junior gated by that tranche's own coverage tests,
/// then subordinate fees, then equity residual.
pub fn traditional(config: &WaterfallConfig) -> StepSequenceStrategy {
    let mut steps = Vec::new();
    let mut priority = 0u32;

    for name in &config.senior_fees {
        priority += 1;
        steps.push(WaterfallStep {
            name: format!("{name} (senior)"),
            priority,
            source: AccountName::InterestCollection,
            destination: StepDestination::Fee(name.clone()),
            trigger: Trigger::Always,
            formula: fee_formula(),
        });
    }

    for cohort in &config.cohorts {
        priority += 1;
        steps.push(WaterfallStep {
            name: format!("{} Interest", cohort.tranche_name),
            priority,
            source: AccountName::InterestCollection,
            destination: StepDestination::TrancheInterest(cohort.tranche_name.clone()),
            trigger: Trigger::Always,
            formula: interest_formula(),
        });
    }

    for cohort in &config.cohorts {
        priority += 1;
        steps.push(WaterfallStep {
            name: format!("{} Principal", cohort.tranche_name),
            priority,
            source: AccountName::PrincipalCollection,
            destination: StepDestination::TranchePrincipal(cohort.tranche_name.clone()),
            trigger: cohort_coverage_trigger(cohort),
            formula: principal_paydown_formula(),
        });
    }

    for name in &config.subordinate_fees {
        priority += 1;
        steps.push(WaterfallStep {
            name: format!("{name} (subordinate)"),
            priority,
            source: AccountName::InterestCollection,
            destination: StepDestination::Fee(name.clone()),
            trigger: Trigger::Always,
            formula: fee_formula(),
        });
    }

    priority += 1;
    steps.push(WaterfallStep {
        name: "Residual to Equity".into(),
        priority,
        source: AccountName::InterestCollection,
        destination: StepDestination::Equity,
        trigger: Trigger::Always,
        formula: residual_formula(),
    });

    StepSequenceStrategy { name: "Traditional".into(), steps }
}

/// Rapid-amortization variant: once triggered, all principal collections
/// (and any interest proceeds left over after interest and fees) sweep to
/// the most senior outstanding tranche regardless of coverage-test
/// outcome, bypassing the per-cohort gating `traditional` applies.
pub fn turbo(config: &WaterfallConfig, turbo_flag: &str) -> StepSequenceStrategy {
    let mut strategy = traditional(config);
    let principal_start = config.senior_fees.len() + config.cohorts.len();

    for (i, cohort) in config.cohorts.iter().enumerate() {
        let step = &mut strategy.steps[principal_start + i];
        step.trigger = Trigger::Or(
            Box::new(cohort_coverage_trigger(cohort)),
            Box::new(Trigger::FlagSet(turbo_flag.into())),
        );
    }

    strategy.name = "Turbo".into();
    strategy
}

/// PIK-toggle variant: identical step sequence to `traditional` — the PIK
/// capitalize-vs-defer decision is made inside
/// [`crate::liability::Tranche::accrue_interest`] based on the tranche's
/// `pik_active` flag, which the deal engine sets per period from the
/// relevant coverage test outcome, not from the step sequence itself.
pub fn pik_toggle(config: &WaterfallConfig) -> StepSequenceStrategy {
    let mut strategy = traditional(config);
    strategy.name = "PIK Toggle".into();
    strategy
}

/// Equity claw-back variant: residual distributions to equity are held in
/// escrow until a performance hurdle is met (e.g. equity IRR above a
/// target), mirroring the GP catch-up gating in a PE carry waterfall —
/// here the "catch-up" is the hurdle-gated release of escrow rather than
/// an accelerated GP share.
pub fn equity_clawback(config: &WaterfallConfig, hurdle_met_flag: &str) -> StepSequenceStrategy {
    let mut strategy = traditional(config);
    if let Some(last) = strategy.steps.last_mut() {
        last.destination = StepDestination::Escrow;
    }
    let release_priority = strategy.steps.last().map(|s| s.priority + 1).unwrap_or(1);
    strategy.steps.push(WaterfallStep {
        name: "Escrow Release to Equity".into(),
        priority: release_priority,
        source: AccountName::Custodial,
        destination: StepDestination::Equity,
        trigger: Trigger::FlagSet(hurdle_met_flag.into()),
        formula: residual_formula(),
    });
    strategy.name = "Equity Claw-back".into();
    strategy
}

/// Call-protected variant: tranche principal paydown is additionally
/// gated on the deal being past its non-call period, even when coverage
/// tests pass. Once past the non-call period (the "step-down" phase),
/// every cohort's principal step shares one priority, so
/// `run_cohort`'s equal-priority pro-rata split pays them all
/// proportionally to their due amount instead of senior-to-junior.
pub fn call_protected(config: &WaterfallConfig, call_protected_flag: &str) -> StepSequenceStrategy {
    let mut strategy = traditional(config);
    let principal_start = config.senior_fees.len() + config.cohorts.len();
    let step_down_priority = strategy.steps[principal_start].priority;

    for (i, cohort) in config.cohorts.iter().enumerate() {
        let step = &mut strategy.steps[principal_start + i];
        step.priority = step_down_priority;
        step.trigger = Trigger::And(
            Box::new(cohort_coverage_trigger(cohort)),
            Box::new(Trigger::FlagUnset(call_protected_flag.into())),
        );
    }

    strategy.name = "Call-Protected".into();
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> WaterfallConfig {
        WaterfallConfig {
            cohorts: vec![
                TrancheCohort { tranche_name: "Class A".into(), oc_test: TestId(1), ic_test: TestId(2) },
                TrancheCohort { tranche_name: "Class B".into(), oc_test: TestId(3), ic_test: TestId(4) },
            ],
            senior_fees: vec!["Trustee Fee".into(), "Senior Management Fee".into()],
            subordinate_fees: vec!["Subordinate Management Fee".into()],
            equity_tranche: "Subordinated Notes".into(),
        }
    }

    #[test]
    fn test_traditional_step_count_and_order() {
        let strategy = traditional(&sample_config());
        // 2 senior fees + 2 interest + 2 principal + 1 subordinate fee + 1 equity
        assert_eq!(strategy.steps.len(), 8);
        assert_eq!(strategy.steps[0].name, "Trustee Fee (senior)");
        assert_eq!(strategy.steps[2].name, "Class A Interest");
        assert_eq!(strategy.steps[4].name, "Class A Principal");
        assert!(matches!(strategy.steps.last().unwrap().destination, StepDestination::Equity));
    }

    #[test]
    fn test_priorities_are_strictly_increasing() {
        let strategy = traditional(&sample_config());
        for pair in strategy.steps.windows(2) {
            assert!(pair[1].priority > pair[0].priority);
        }
    }

    #[test]
    fn test_turbo_principal_steps_bypass_coverage_when_flag_set() {
        let strategy = turbo(&sample_config(), "rapid_amortization");
        let principal_step = strategy
            .steps
            .iter()
            .find(|s| s.name == "Class A Principal")
            .unwrap();
        assert!(matches!(principal_step.trigger, Trigger::Or(_, _)));
    }

    #[test]
    fn test_equity_clawback_adds_escrow_release_step() {
        let strategy = equity_clawback(&sample_config(), "hurdle_met");
        let last_two = &strategy.steps[strategy.steps.len() - 2..];
        assert!(matches!(last_two[0].destination, StepDestination::Escrow));
        assert_eq!(last_two[1].name, "Escrow Release to Equity");
    }

    #[test]
    fn test_call_protected_gates_principal_on_flag_unset() {
        let strategy = call_protected(&sample_config(), "call_protected");
        let principal_step = strategy
            .steps
            .iter()
            .find(|s| s.name == "Class A Principal")
            .unwrap();
        assert!(matches!(principal_step.trigger, Trigger::And(_, _)));
    }

    #[test]
    fn test_call_protected_principal_steps_share_priority_for_prorata_step_down() {
        let strategy = call_protected(&sample_config(), "call_protected");
        let class_a = strategy.steps.iter().find(|s| s.name == "Class A Principal").unwrap();
        let class_b = strategy.steps.iter().find(|s| s.name == "Class B Principal").unwrap();
        assert_eq!(class_a.priority, class_b.priority);
        assert_eq!(class_a.source, class_b.source);
    }
}
