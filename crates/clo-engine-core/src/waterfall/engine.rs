//! Shared step-execution harness and the `EngineView` read-only facade
//! strategies execute against.
//!
//! The engine exclusively owns the pool, tranches, accounts, and fees; a
//! strategy only ever sees them through `EngineView`, and its only
//! mutation path is [`EngineView::transfer`] — this is what breaks the
//! engine/strategy ownership cycle a direct `&mut Engine` borrow would
//! otherwise create.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::accounts::{AccountName, AccountSet};
use crate::compliance::{ComplianceSuiteResult, TestId};
use crate::error::EngineError;
use crate::fees::Fee;
use crate::liability::Tranche;
use crate::pool::CollateralPool;
use crate::types::Money;
use crate::EngineResult;

use super::formula::Vars;
use super::{StepDestination, StepOutcome, Strategy, Trigger, WaterfallStep};

/// Read-only window onto deal state plus the one allowed mutation verb.
pub struct EngineView<'a> {
    pub period: u32,
    pub pool: &'a CollateralPool,
    pub tranches: &'a mut Vec<Tranche>,
    pub fees: &'a mut Vec<Fee>,
    pub accounts: &'a mut AccountSet,
    pub compliance: &'a ComplianceSuiteResult,
    pub flags: &'a HashMap<String, bool>,
    /// Escrow balance for claw-back strategies, owned by the engine and
    /// exposed only through `transfer`.
    pub escrow_balance: &'a mut Money,
    pub reinvestment_budget: &'a mut Money,
    pub equity_distributions: &'a mut Vec<(chrono::NaiveDate, Money)>,
    pub as_of: chrono::NaiveDate,
    pub index_rate: rust_decimal::Decimal,
    pub period_frac: rust_decimal::Decimal,
}

impl EngineView<'_> {
    fn tranche_mut(&mut self, name: &str) -> EngineResult<&mut Tranche> {
        self.tranches
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| EngineError::UndefinedStep { strategy: "waterfall".into(), step: format!("tranche '{name}' not found") })
    }

    fn fee_mut(&mut self, name: &str) -> EngineResult<&mut Fee> {
        self.fees
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| EngineError::UndefinedStep { strategy: "waterfall".into(), step: format!("fee '{name}' not found") })
    }

    pub fn tranche(&self, name: &str) -> Option<&Tranche> {
        self.tranches.iter().find(|t| t.name == name)
    }

    pub fn test_pass(&self, id: TestId) -> bool {
        self.compliance
            .results
            .iter()
            .find(|r| r.test_id.0 == id.0)
            .map(|r| r.pass)
            .unwrap_or(false)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn evaluate_trigger(&self, trigger: &Trigger) -> bool {
        match trigger {
            Trigger::Always => true,
            Trigger::AllTestsPass => self.compliance.all_pass,
            Trigger::TestPasses(id) => self.test_pass(*id),
            Trigger::TestFails(id) => !self.test_pass(*id),
            Trigger::FlagSet(name) => self.flag(name),
            Trigger::FlagUnset(name) => !self.flag(name),
            Trigger::And(l, r) => self.evaluate_trigger(l) && self.evaluate_trigger(r),
            Trigger::Or(l, r) => self.evaluate_trigger(l) || self.evaluate_trigger(r),
            Trigger::Not(t) => !self.evaluate_trigger(t),
        }
    }

    /// Build the variable vocabulary a step's amount formula is evaluated
    /// against, scoped to the step's destination.
    pub fn vars_for(&self, source: AccountName, destination: &StepDestination) -> Vars {
        let mut vars = Vars::new();
        vars.insert("available_cash".into(), self.accounts.balance(source));
        vars.insert("pool_par".into(), self.pool.total_par());
        vars.insert("period".into(), Decimal::from(self.period));
        vars.insert("period_frac".into(), self.period_frac);

        match destination {
            StepDestination::TrancheInterest(name) | StepDestination::TranchePrincipal(name) => {
                if let Some(t) = self.tranche(name) {
                    vars.insert("tranche_balance".into(), t.current_balance);
                    vars.insert("deferred_interest".into(), t.deferred_interest);
                    let due = t.interest_due(self.index_rate, self.period_frac);
                    vars.insert("coupon_rate".into(), match &t.coupon {
                        crate::types::CouponType::Fixed { rate } => *rate,
                        crate::types::CouponType::Floating { spread } => self.index_rate + spread,
                    });
                    vars.insert("interest_due".into(), due);
                }
            }
            StepDestination::Fee(name) => {
                if let Some(f) = self.fees.iter().find(|f| f.name == *name) {
                    vars.insert("deferred_balance".into(), f.deferred_balance);
                    vars.insert("fee_due".into(), f.amount_due(self.pool.total_par(), self.period_frac));
                }
            }
            _ => {}
        }
        vars
    }

    /// The only mutation path available to a strategy: move `amount`
    /// from `source` to `destination`, applying the corresponding
    /// bookkeeping (tranche/fee ledger update) atomically with the
    /// account-level transfer.
    pub fn transfer(&mut self, source: AccountName, destination: &StepDestination, amount: Money, memo: &str) -> EngineResult<Money> {
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        match destination {
            StepDestination::TrancheInterest(name) => {
                let (rate, frac) = (self.index_rate, self.period_frac);
                let period = self.period;
                let available = amount;
                let tranche = self.tranche_mut(name)?;
                let paid = tranche.accrue_interest(period, rate, frac, available)?;
                self.accounts.transfer(self.period, source, None, paid, memo)?;
                Ok(paid)
            }
            StepDestination::TranchePrincipal(name) => {
                let period = self.period;
                let tranche = self.tranche_mut(name)?;
                let paid = tranche.pay_principal(period, amount)?;
                self.accounts.transfer(self.period, source, None, paid, memo)?;
                Ok(paid)
            }
            StepDestination::Fee(name) => {
                // `amount` already reflects the cohort's due-vs-available
                // resolution (the fee's formula reads `deferred_balance`
                // directly, so the due it produced already accounts for
                // prior shortfalls); paying it down further reduces the
                // deferred balance before crediting fresh accrual.
                let fee = self.fee_mut(name)?;
                let applied_to_deferred = amount.min(fee.deferred_balance);
                fee.deferred_balance -= applied_to_deferred;
                fee.paid_to_date += amount;
                self.accounts.transfer(self.period, source, None, amount, memo)?;
                Ok(amount)
            }
            StepDestination::Account(dest) => {
                let record = self.accounts.transfer(self.period, source, Some(*dest), amount, memo)?;
                Ok(record.amount)
            }
            StepDestination::Escrow => {
                self.accounts.transfer(self.period, source, None, amount, memo)?;
                *self.escrow_balance += amount;
                Ok(amount)
            }
            StepDestination::Equity => {
                self.accounts.transfer(self.period, source, None, amount, memo)?;
                self.equity_distributions.push((self.as_of, amount));
                Ok(amount)
            }
            StepDestination::ReinvestmentBudget => {
                self.accounts.transfer(self.period, source, None, amount, memo)?;
                *self.reinvestment_budget += amount;
                Ok(amount)
            }
        }
    }
}

/// Execute a strategy's step sequence for one period, returning the
/// ordered list of step outcomes for the journal.
///
/// Equi-priority cohorts (consecutive steps sharing `priority`) are paid
/// pro-rata by due amount when the cohort's combined due exceeds
/// available cash. Any residual left after a cohort (including sub-cent
/// rounding slack) simply remains in the source account and is
/// available to the next step, with no special-case code needed.
pub fn run_step_sequence(strategy: &dyn Strategy, view: &mut EngineView) -> EngineResult<Vec<StepOutcome>> {
    let mut outcomes = Vec::new();
    let steps = strategy.steps().to_vec();
    let mut i = 0;

    while i < steps.len() {
        let priority = steps[i].priority;
        let mut j = i;
        while j < steps.len() && steps[j].priority == priority {
            j += 1;
        }
        let cohort = &steps[i..j];
        let cohort_outcomes = run_cohort(cohort, view)?;
        outcomes.extend(cohort_outcomes);
        i = j;
    }

    Ok(outcomes)
}

fn run_cohort(cohort: &[WaterfallStep], view: &mut EngineView) -> EngineResult<Vec<StepOutcome>> {
    // First pass: evaluate triggers and dues without mutating state.
    let mut dues = Vec::with_capacity(cohort.len());
    let mut sources: HashSet<AccountName> = HashSet::new();
    for step in cohort {
        let triggered = view.evaluate_trigger(&step.trigger);
        let due = if triggered {
            let vars = view.vars_for(step.source, &step.destination);
            step.formula.evaluate(&vars)?.max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        dues.push(due);
        sources.insert(step.source);
    }

    let mut outcomes = Vec::with_capacity(cohort.len());

    if sources.len() == 1 {
        let source = *sources.iter().next().unwrap();
        let available = view.accounts.balance(source);
        let total_due: Decimal = dues.iter().copied().sum();

        for (step, due) in cohort.iter().zip(dues.iter()) {
            let paid = if total_due.is_zero() {
                Decimal::ZERO
            } else if total_due <= available {
                *due
            } else {
                // pro-rata by due amount across the cohort.
                (*due * available / total_due).min(*due)
            };
            let actually_paid = view.transfer(step.source, &step.destination, paid, &step.name)?;
            outcomes.push(StepOutcome {
                step_name: step.name.clone(),
                triggered: *due > Decimal::ZERO,
                amount_due: *due,
                amount_paid: actually_paid,
                remaining_cash: view.accounts.balance(step.source),
            });
        }
    } else {
        // Steps in this cohort draw from different source accounts;
        // no shared-pool pro-ration applies, each settles independently.
        for (step, due) in cohort.iter().zip(dues.iter()) {
            let available = view.accounts.balance(step.source);
            let to_pay = due.min(available);
            let actually_paid = view.transfer(step.source, &step.destination, to_pay, &step.name)?;
            outcomes.push(StepOutcome {
                step_name: step.name.clone(),
                triggered: *due > Decimal::ZERO,
                amount_due: *due,
                amount_paid: actually_paid,
                remaining_cash: view.accounts.balance(step.source),
            });
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountName;
    use crate::types::CouponType;
    use crate::waterfall::formula;
    use crate::waterfall::StepSequenceStrategy;
    use rust_decimal_macros::dec;

    fn base_tranche(name: &str, balance: Decimal) -> Tranche {
        Tranche {
            name: name.into(),
            seniority_rank: 1,
            original_balance: balance,
            current_balance: balance,
            coupon: CouponType::Fixed { rate: dec!(0.06) },
            pik_allowed: false,
            pik_active: false,
            deferred_interest: Decimal::ZERO,
            deferred_interest_penalty_rate: Decimal::ZERO,
            write_down: Decimal::ZERO,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_single_step_pays_min_of_due_and_available() {
        let pool = CollateralPool::new(Vec::new());
        let mut tranches = vec![base_tranche("Class A", dec!(100_000_000))];
        let mut fees = Vec::new();
        let mut accounts = AccountSet::new();
        accounts.deposit(1, AccountName::InterestCollection, dec!(1_000_000), "collections").unwrap();
        let compliance = ComplianceSuiteResult { results: Vec::new(), all_pass: true };
        let flags = HashMap::new();
        let mut escrow = Decimal::ZERO;
        let mut budget = Decimal::ZERO;
        let mut equity = Vec::new();

        let mut view = EngineView {
            period: 1,
            pool: &pool,
            tranches: &mut tranches,
            fees: &mut fees,
            accounts: &mut accounts,
            compliance: &compliance,
            flags: &flags,
            escrow_balance: &mut escrow,
            reinvestment_budget: &mut budget,
            equity_distributions: &mut equity,
            as_of: chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            index_rate: Decimal::ZERO,
            period_frac: dec!(0.25),
        };

        let strategy = StepSequenceStrategy {
            name: "test".into(),
            steps: vec![WaterfallStep {
                name: "Class A Interest".into(),
                priority: 1,
                source: AccountName::InterestCollection,
                destination: StepDestination::TrancheInterest("Class A".into()),
                trigger: Trigger::Always,
                formula: formula::parse("tranche_balance * coupon_rate * 0.25").unwrap(),
            }],
        };

        let outcomes = run_step_sequence(&strategy, &mut view).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].amount_due, dec!(1_500_000));
        assert_eq!(outcomes[0].amount_paid, dec!(1_000_000)); // capped by available cash
    }

    #[test]
    fn test_untriggered_step_pays_nothing() {
        let pool = CollateralPool::new(Vec::new());
        let mut tranches = vec![base_tranche("Class A", dec!(100_000_000))];
        let mut fees = Vec::new();
        let mut accounts = AccountSet::new();
        accounts.deposit(1, AccountName::InterestCollection, dec!(1_000_000), "collections").unwrap();
        let compliance = ComplianceSuiteResult { results: Vec::new(), all_pass: false };
        let flags = HashMap::new();
        let mut escrow = Decimal::ZERO;
        let mut budget = Decimal::ZERO;
        let mut equity = Vec::new();

        let mut view = EngineView {
            period: 1,
            pool: &pool,
            tranches: &mut tranches,
            fees: &mut fees,
            accounts: &mut accounts,
            compliance: &compliance,
            flags: &flags,
            escrow_balance: &mut escrow,
            reinvestment_budget: &mut budget,
            equity_distributions: &mut equity,
            as_of: chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            index_rate: Decimal::ZERO,
            period_frac: dec!(0.25),
        };

        let strategy = StepSequenceStrategy {
            name: "test".into(),
            steps: vec![WaterfallStep {
                name: "Principal (only if tests pass)".into(),
                priority: 1,
                source: AccountName::InterestCollection,
                destination: StepDestination::TranchePrincipal("Class A".into()),
                trigger: Trigger::AllTestsPass,
                formula: formula::parse("available_cash").unwrap(),
            }],
        };

        let outcomes = run_step_sequence(&strategy, &mut view).unwrap();
        assert!(!outcomes[0].triggered);
        assert_eq!(outcomes[0].amount_paid, Decimal::ZERO);
    }
}
