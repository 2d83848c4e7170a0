//! Deal engine orchestrator (C10 §4.8): the master period loop binding
//! the asset model (C3), pool (C4), liability model (C5), fees/accounts
//! (C6), reinvestment (C7), compliance suite (C8), waterfall strategies
//! (C9), and incentive fee (C11) together.
//!
//! Grounded in shape — a state struct mutated across a bounded period
//! loop, one row appended per period, an early-stop condition checked
//! every iteration — on the teacher's actuarial projection-engine loop
//! pattern (the same shape `Trellis`'s block-projection driver uses),
//! re-expressed with this crate's own Decimal state and the nine engine
//! passes named in the Design Notes rather than a single monolithic
//! valuation function.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::{debug, error, warn};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::accounts::{AccountName, AccountSet};
use crate::asset::cashflow::{self, RecoveryQueue};
use crate::compliance::threshold::ThresholdHistory;
use crate::compliance::{
    self, ComplianceContext, ComplianceSuiteResult, CountryGroups, TestDef, TestId,
};
use crate::curve::YieldCurve;
use crate::error::{EngineError, EngineWarning};
use crate::fees::Fee;
use crate::incentive_fee::{IncentiveFeeAllocation, IncentiveFeeTracker};
use crate::liability::Tranche;
use crate::pool::CollateralPool;
use crate::reinvestment::{self, ReinvestmentProfile, ReinvestmentResult};
use crate::schedule::{PaymentSchedule, SchedulePeriod};
use crate::types::{Frequency, Money, Rate};
use crate::waterfall::engine::{run_step_sequence, EngineView};
use crate::waterfall::mag::MagFlags;
use crate::waterfall::registry::StrategyRegistry;
use crate::waterfall::strategies::WaterfallConfig;
use crate::waterfall::{StepOutcome, Strategy, StepSequenceStrategy};
use crate::EngineResult;

/// Flat annualized default/prepayment assumptions applied uniformly to
/// every performing asset each period, converted to the period rate the
/// same way a CDR/CPR vector is converted to a per-period hazard rate:
/// `period_rate = 1 - (1 - annual_rate)^period_frac`. Per-asset vectors
/// (§4.3's "hazard-rate vector") remain available directly through
/// [`crate::asset::cashflow::project_life`] for callers that need them;
/// the orchestrator's single flat pair matches the CDR/CPR inputs named
/// in §8's scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowAssumptions {
    pub annual_default_rate: Rate,
    pub annual_prepay_rate: Rate,
    pub recovery_lag_periods: u32,
}

impl CashFlowAssumptions {
    fn period_rate(annual_rate: Rate, period_frac: Decimal) -> Rate {
        if annual_rate.is_zero() {
            return Decimal::ZERO;
        }
        Decimal::ONE - (Decimal::ONE - annual_rate).powd(period_frac)
    }

    fn hazard_rate(&self, period_frac: Decimal) -> Rate {
        Self::period_rate(self.annual_default_rate, period_frac)
    }

    fn prepay_rate(&self, period_frac: Decimal) -> Rate {
        Self::period_rate(self.annual_prepay_rate, period_frac)
    }
}

/// Event-of-default detection (§4.8 step 5, §8 Scenario 6): a named
/// compliance test failing for `consecutive_periods_required` periods in
/// a row switches the period's waterfall to `eod_strategy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOfDefaultConfig {
    pub trigger_test: TestId,
    pub consecutive_periods_required: u32,
}

/// Reinvestment-period configuration (§4.9). Principal steps in the
/// standard strategies are gated off while `"reinvestment_period"` is
/// set (see [`crate::waterfall::strategies`]), so unused principal
/// collections accumulate for [`reinvestment::run`] rather than paying
/// down tranches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestmentConfig {
    pub profile: ReinvestmentProfile,
    pub reinvestment_end_period: u32,
    pub concentration_tests: Vec<TestDef>,
}

/// Equity-tranche incentive-fee configuration (C11 §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncentiveFeeConfig {
    pub initial_equity_investment: Money,
    pub investment_date: NaiveDate,
    pub hurdle_rate: Rate,
    pub catch_up_rate: Rate,
    pub carry_rate: Rate,
}

/// Assigns countries to regional concentration groups from a flat table
/// (§4.6 geography tests), the concrete [`CountryGroups`] implementation
/// a deal configuration supplies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryGroupTable(pub HashMap<String, u8>);

impl CountryGroups for CountryGroupTable {
    fn group_of(&self, country: &str) -> Option<u8> {
        self.0.get(country).copied()
    }
}

/// Everything [`DealEngine::new`] needs to run a deal end to end —
/// consolidates the `(deal_config, initial_pool, payment_schedule,
/// yield_curves, strategy_config, random_seed)` argument list from §6
/// into one typed, `serde`-deserializable record (Design Notes §9:
/// "scenario table → typed config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConfig {
    pub deal_id: String,
    pub pool: CollateralPool,
    pub tranches: Vec<Tranche>,
    pub fees: Vec<Fee>,
    pub closing_date: NaiveDate,
    pub legal_final: NaiveDate,
    pub payment_frequency: Frequency,
    pub yield_curve: Option<YieldCurve>,
    pub assumptions: CashFlowAssumptions,
    pub waterfall_config: WaterfallConfig,
    pub strategy_name: String,
    pub eod_strategy_name: Option<String>,
    pub event_of_default: Option<EventOfDefaultConfig>,
    pub reinvestment: Option<ReinvestmentConfig>,
    pub incentive_fee: Option<IncentiveFeeConfig>,
    pub compliance_tests: Vec<TestDef>,
    pub thresholds: HashMap<TestId, ThresholdHistory>,
    pub mag_version: Option<String>,
    #[serde(default)]
    pub mag_flags: MagFlags,
    pub country_groups: CountryGroupTable,
    /// Last period number of the non-call period (inclusive); `None` means
    /// the deal was never call-protected. Drives `call_protected` in
    /// [`DealEngine::compute_flags`].
    #[serde(default)]
    pub non_call_period_end: Option<u32>,
}

/// One payment period's journal row (§3 Waterfall Execution Record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period: u32,
    pub as_of: NaiveDate,
    pub begin_pool_par: Money,
    pub end_pool_par: Money,
    pub interest_collected: Money,
    pub principal_collected: Money,
    pub default_amount: Money,
    pub recovery_amount: Money,
    pub outstanding_defaulted_par: Money,
    pub compliance: ComplianceSuiteResult,
    pub event_of_default: bool,
    pub strategy_used: String,
    pub step_outcomes: Vec<StepOutcome>,
    pub reinvestment: Option<ReinvestmentResult>,
    pub incentive_fee: Option<IncentiveFeeAllocation>,
    pub tranche_balances: Vec<(String, Money)>,
    pub account_balances: AccountBalances,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalances {
    pub interest_collection: Money,
    pub principal_collection: Money,
    pub interest_reserve: Money,
    pub principal_reserve: Money,
    pub custodial: Money,
}

impl From<&AccountSet> for AccountBalances {
    fn from(accounts: &AccountSet) -> Self {
        Self {
            interest_collection: accounts.balance(AccountName::InterestCollection),
            principal_collection: accounts.balance(AccountName::PrincipalCollection),
            interest_reserve: accounts.balance(AccountName::InterestReserve),
            principal_reserve: accounts.balance(AccountName::PrincipalReserve),
            custodial: accounts.balance(AccountName::Custodial),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrancheSummary {
    pub name: String,
    pub original_balance: Money,
    pub final_balance: Money,
    pub total_interest_paid: Money,
    pub total_interest_pik: Money,
    pub total_principal_paid: Money,
}

/// End-to-end result of `run_deal` (§6): the period journal, warnings
/// accumulated rather than thrown, and the end-of-deal summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealResult {
    pub journal: Vec<PeriodRecord>,
    pub warnings: Vec<EngineWarning>,
    pub tranche_summary: Vec<TrancheSummary>,
    pub equity_irr: Option<Rate>,
    pub realized_losses: Money,
    pub final_compliance: Option<ComplianceSuiteResult>,
    /// Set when the caller's cancellation flag was observed between
    /// periods; the journal up to this period is still returned in full
    /// (§5 "partial results up to the last completed period are
    /// preserved").
    pub cancelled_at_period: Option<u32>,
}

/// The deal engine: owns the pool, tranches, accounts, and fees
/// exclusively for the run's duration (§3 Ownership) and exposes only
/// `run`.
pub struct DealEngine {
    config: DealConfig,
    schedule: PaymentSchedule,
    strategy: StepSequenceStrategy,
    eod_strategy: Option<StepSequenceStrategy>,
    pool: CollateralPool,
    tranches: Vec<Tranche>,
    fees: Vec<Fee>,
    accounts: AccountSet,
    recovery_queues: HashMap<String, RecoveryQueue>,
    next_asset_seq: u32,
    escrow_balance: Money,
    reinvestment_budget: Money,
    equity_distributions: Vec<(NaiveDate, Money)>,
    incentive_tracker: Option<IncentiveFeeTracker>,
    consecutive_eod_breaches: u32,
    cumulative_default_amount: Money,
    cumulative_recovery_amount: Money,
    warnings: Vec<EngineWarning>,
}

impl DealEngine {
    pub fn new(config: DealConfig) -> EngineResult<Self> {
        config.pool.validate()?;
        for tranche in &config.tranches {
            tranche.validate()?;
        }

        let schedule = PaymentSchedule::generate(config.closing_date, config.legal_final, config.payment_frequency)?;

        let registry = StrategyRegistry::standard();
        let strategy = registry.build(&config.strategy_name, &config.waterfall_config)?;
        let eod_strategy = config
            .eod_strategy_name
            .as_ref()
            .map(|name| registry.build(name, &config.waterfall_config))
            .transpose()?;

        let recovery_queues = config
            .pool
            .assets
            .iter()
            .map(|a| (a.id.clone(), RecoveryQueue::default()))
            .collect();
        let next_asset_seq = config.pool.assets.len() as u32 + 1;

        let incentive_tracker = config
            .incentive_fee
            .as_ref()
            .map(|ifc| {
                IncentiveFeeTracker::new(
                    ifc.initial_equity_investment,
                    ifc.investment_date,
                    ifc.hurdle_rate,
                    ifc.catch_up_rate,
                    ifc.carry_rate,
                )
            })
            .transpose()?;

        let pool = config.pool.clone();
        let tranches = config.tranches.clone();
        let fees = config.fees.clone();

        Ok(Self {
            config,
            schedule,
            strategy,
            eod_strategy,
            pool,
            tranches,
            fees,
            accounts: AccountSet::new(),
            recovery_queues,
            next_asset_seq,
            escrow_balance: Decimal::ZERO,
            reinvestment_budget: Decimal::ZERO,
            equity_distributions: Vec::new(),
            incentive_tracker,
            consecutive_eod_breaches: 0,
            cumulative_default_amount: Decimal::ZERO,
            cumulative_recovery_amount: Decimal::ZERO,
            warnings: Vec::new(),
        })
    }

    /// Run the full period loop (§4.8), checking `is_cancelled` between
    /// periods and invoking `on_period_complete` after each period is
    /// journaled (§9 Design Notes: replaces the legacy progress-bar hook
    /// with an engine-exposed callback, no process-wide state).
    pub fn run(
        &mut self,
        mut is_cancelled: impl FnMut() -> bool,
        mut on_period_complete: impl FnMut(u32, &PeriodRecord),
    ) -> EngineResult<DealResult> {
        let mut journal = Vec::new();
        let mut cancelled_at = None;
        let periods = self.schedule.periods.clone();

        for sp in &periods {
            if is_cancelled() {
                cancelled_at = Some(sp.index.saturating_sub(1));
                break;
            }

            debug!("period {} starting, as_of {}", sp.index, sp.payment_date);
            let record = self.run_period(sp)?;
            on_period_complete(sp.index, &record);
            journal.push(record);

            let deal_retired = self.tranches.iter().all(|t| t.is_retired()) && self.pool.total_par().is_zero();
            if deal_retired {
                debug!("deal fully retired after period {}", sp.index);
                break;
            }
        }

        Ok(self.build_result(journal, cancelled_at))
    }

    fn run_period(&mut self, sp: &SchedulePeriod) -> EngineResult<PeriodRecord> {
        // 1. Snapshot.
        let begin_pool_par = self.pool.total_par();
        let years_from_close = Decimal::from((sp.accrual_end - self.config.closing_date).num_days()) / Decimal::from(365);
        let deal_period_frac = crate::types::DayCount::Act365.fraction(sp.accrual_start, sp.accrual_end);
        let index_rate = self
            .config
            .yield_curve
            .as_ref()
            .map(|c| c.spot_rate(years_from_close))
            .unwrap_or(Decimal::ZERO);

        // 2. Asset pass.
        let (interest_collected, principal_collected, default_amount, recovery_amount) =
            self.project_assets(sp, years_from_close)?;
        self.accounts
            .deposit(sp.index, AccountName::InterestCollection, interest_collected, "collateral interest")?;
        self.accounts
            .deposit(sp.index, AccountName::PrincipalCollection, principal_collected, "collateral principal")?;
        self.cumulative_default_amount += default_amount;
        self.cumulative_recovery_amount += recovery_amount;

        // 3. Liability pass: interest due, accumulated senior-to-junior for
        // the IC-ratio compliance tests (§4.6).
        let mut cumulative_interest_due: HashMap<u32, Money> = HashMap::new();
        let mut running = Decimal::ZERO;
        let mut ranked: Vec<&Tranche> = self.tranches.iter().collect();
        ranked.sort_by_key(|t| t.seniority_rank);
        for tranche in ranked {
            running += tranche.interest_due(index_rate, deal_period_frac);
            cumulative_interest_due.insert(tranche.seniority_rank, running);
        }

        let outstanding_defaulted_par: Money = self.pool.assets.iter().map(|a| a.recovery_expectation).sum();

        // 4. Compliance pass.
        let ctx = ComplianceContext {
            pool: &self.pool,
            as_of: sp.payment_date,
            tranches: &self.tranches,
            cumulative_interest_due: &cumulative_interest_due,
            period_interest_available: self.accounts.balance(AccountName::InterestCollection),
            defaulted_par: outstanding_defaulted_par,
            country_groups: &self.config.country_groups,
            mag_version: self.config.mag_version.clone(),
        };
        let compliance = compliance::evaluate_all(&self.config.compliance_tests, &ctx, &self.config.thresholds)?;
        if !compliance.all_pass {
            warn!("period {}: one or more compliance tests failed", sp.index);
        }

        // 5. Event detection, then run the waterfall.
        let event_of_default = self.update_eod_state(&compliance);
        let strategy_name;
        let step_outcomes = {
            let flags = self.compute_flags(&compliance, sp.index);
            let strategy: &StepSequenceStrategy = if event_of_default {
                self.eod_strategy.as_ref().unwrap_or(&self.strategy)
            } else {
                &self.strategy
            };
            strategy_name = strategy.name().to_string();

            let mut view = EngineView {
                period: sp.index,
                pool: &self.pool,
                tranches: &mut self.tranches,
                fees: &mut self.fees,
                accounts: &mut self.accounts,
                compliance: &compliance,
                flags: &flags,
                escrow_balance: &mut self.escrow_balance,
                reinvestment_budget: &mut self.reinvestment_budget,
                equity_distributions: &mut self.equity_distributions,
                as_of: sp.payment_date,
                index_rate,
                period_frac: deal_period_frac,
            };
            run_step_sequence(strategy as &dyn Strategy, &mut view)?
        };

        for tranche in &self.tranches {
            if let Err(e) = tranche.validate() {
                error!("period {}: {e}", sp.index);
                return Err(e);
            }
        }

        // 6. Reinvestment pass.
        let reinvestment_result = self.run_reinvestment_pass(sp, event_of_default, &cumulative_interest_due)?;

        // 7. Incentive fee pass.
        let period_equity_distribution: Money = self
            .equity_distributions
            .iter()
            .filter(|(date, _)| *date == sp.payment_date)
            .map(|(_, amount)| *amount)
            .sum();
        let incentive_fee = match self.incentive_tracker.as_mut() {
            Some(tracker) => match tracker.record_period(sp.payment_date, period_equity_distribution) {
                Ok(allocation) => Some(allocation),
                Err(EngineError::NonConvergent { function, iterations, last_delta }) => {
                    self.warnings.push(EngineWarning {
                        period: Some(sp.index),
                        component: "incentive_fee".into(),
                        message: format!("{function} failed to converge after {iterations} iterations (last delta {last_delta})"),
                    });
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        // 8. Journal write.
        let tranche_balances = self.tranches.iter().map(|t| (t.name.clone(), t.current_balance)).collect();
        let record = PeriodRecord {
            period: sp.index,
            as_of: sp.payment_date,
            begin_pool_par,
            end_pool_par: self.pool.total_par(),
            interest_collected,
            principal_collected,
            default_amount,
            recovery_amount,
            outstanding_defaulted_par,
            compliance,
            event_of_default,
            strategy_used: strategy_name,
            step_outcomes,
            reinvestment: reinvestment_result,
            incentive_fee,
            tranche_balances,
            account_balances: AccountBalances::from(&self.accounts),
        };

        Ok(record)
    }

    fn project_assets(&mut self, sp: &SchedulePeriod, years_from_close: Decimal) -> EngineResult<(Money, Money, Money, Money)> {
        let mut interest_collected = Decimal::ZERO;
        let mut principal_collected = Decimal::ZERO;
        let mut default_amount = Decimal::ZERO;
        let mut recovery_amount = Decimal::ZERO;

        for asset in &mut self.pool.assets {
            let ppy = asset.frequency.periods_per_year();
            let asset_period_frac = if ppy == 0 { Decimal::ONE } else { Decimal::ONE / Decimal::from(ppy) };
            let hazard_rate = self.config.assumptions.hazard_rate(asset_period_frac);
            let prepay_rate = self.config.assumptions.prepay_rate(asset_period_frac);
            let recoveries = self.recovery_queues.entry(asset.id.clone()).or_default();
            let scheduled_amort = asset.scheduled_amort(asset_period_frac, sp.accrual_end);

            let flow = cashflow::project_period(
                asset,
                sp.index,
                years_from_close,
                scheduled_amort,
                hazard_rate,
                prepay_rate,
                self.config.assumptions.recovery_lag_periods,
                self.config.yield_curve.as_ref(),
                recoveries,
            )?;

            interest_collected += flow.scheduled_interest;
            principal_collected += flow.scheduled_principal + flow.prepayment + flow.recovery;
            default_amount += flow.default_amount;
            recovery_amount += flow.recovery;
        }

        Ok((interest_collected, principal_collected, default_amount, recovery_amount))
    }

    /// Tracks consecutive breaches of the configured event-of-default
    /// trigger test, returning whether EOD is in effect this period
    /// (§4.8 step 5, §8 Scenario 6).
    fn update_eod_state(&mut self, compliance: &ComplianceSuiteResult) -> bool {
        let Some(eod) = &self.config.event_of_default else {
            return false;
        };
        let breached = compliance
            .results
            .iter()
            .find(|r| r.test_id.0 == eod.trigger_test.0)
            .map(|r| !r.pass)
            .unwrap_or(false);

        self.consecutive_eod_breaches = if breached { self.consecutive_eod_breaches + 1 } else { 0 };
        self.consecutive_eod_breaches >= eod.consecutive_periods_required
    }

    fn compute_flags(&self, compliance: &ComplianceSuiteResult, period: u32) -> HashMap<String, bool> {
        let hurdle_met = self.incentive_tracker.as_ref().map(|t| t.hurdle_met()).unwrap_or(false);
        let turbo_active = !compliance.all_pass;
        let reinvestment_period = self
            .config
            .reinvestment
            .as_ref()
            .map(|r| period <= r.reinvestment_end_period)
            .unwrap_or(false);
        let call_protected = self
            .config
            .non_call_period_end
            .map(|end| period <= end)
            .unwrap_or(false);
        let distribution_stopper = !compliance.all_pass;

        let mut flags = HashMap::new();
        flags.insert("turbo_active".into(), turbo_active);
        flags.insert("hurdle_met".into(), hurdle_met);
        flags.insert("call_protected".into(), call_protected);
        flags.insert("reinvestment_period".into(), reinvestment_period);
        flags.insert(self.config.mag_flags.turbo.clone(), turbo_active);
        flags.insert(self.config.mag_flags.clawback_hurdle_met.clone(), hurdle_met);
        flags.insert(self.config.mag_flags.call_protected.clone(), call_protected);
        flags.insert(self.config.mag_flags.distribution_stopper.clone(), distribution_stopper);
        flags
    }

    fn run_reinvestment_pass(
        &mut self,
        sp: &SchedulePeriod,
        event_of_default: bool,
        cumulative_interest_due: &HashMap<u32, Money>,
    ) -> EngineResult<Option<ReinvestmentResult>> {
        let Some(reinvestment_cfg) = self.config.reinvestment.clone() else {
            return Ok(None);
        };
        if event_of_default || sp.index > reinvestment_cfg.reinvestment_end_period {
            return Ok(None);
        }

        let budget = self.accounts.balance(AccountName::PrincipalCollection);
        if budget.is_zero() {
            return Ok(None);
        }

        let result = reinvestment::run(
            &mut self.pool,
            budget,
            &reinvestment_cfg.profile,
            sp.payment_date,
            &mut self.next_asset_seq,
            &self.tranches,
            cumulative_interest_due,
            self.accounts.balance(AccountName::InterestCollection),
            &self.config.country_groups,
            &reinvestment_cfg.concentration_tests,
            &self.config.thresholds,
        )?;

        if result.total_invested > Decimal::ZERO {
            self.accounts.transfer(
                sp.index,
                AccountName::PrincipalCollection,
                None,
                result.total_invested,
                "reinvestment purchase",
            )?;
        }

        Ok(Some(result))
    }

    fn build_result(&self, journal: Vec<PeriodRecord>, cancelled_at_period: Option<u32>) -> DealResult {
        let tranche_summary = self
            .tranches
            .iter()
            .map(|t| TrancheSummary {
                name: t.name.clone(),
                original_balance: t.original_balance,
                final_balance: t.current_balance,
                total_interest_paid: t.history.iter().map(|cf| cf.interest_paid).sum(),
                total_interest_pik: t.history.iter().map(|cf| cf.interest_pik).sum(),
                total_principal_paid: t.history.iter().map(|cf| cf.principal_paid).sum(),
            })
            .collect();

        let equity_irr = self.incentive_tracker.as_ref().and_then(|t| t.cumulative_irr());
        let realized_losses = (self.cumulative_default_amount - self.cumulative_recovery_amount).max(Decimal::ZERO);
        let final_compliance = journal.last().map(|r| r.compliance.clone());

        DealResult {
            journal,
            warnings: self.warnings.clone(),
            tranche_summary,
            equity_irr,
            realized_losses,
            final_compliance,
            cancelled_at_period,
        }
    }
}

/// Entry point (§6): build the engine from a typed [`DealConfig`] and run
/// it to completion (or cancellation) with no progress callback.
pub fn run_deal(config: DealConfig) -> EngineResult<DealResult> {
    let mut engine = DealEngine::new(config)?;
    engine.run(|| false, |_, _| {})
}
