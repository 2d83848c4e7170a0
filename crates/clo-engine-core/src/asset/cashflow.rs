//! Per-asset cash-flow projection: each asset is driven by its own
//! hazard-rate and prepayment vectors rather than a single aggregate
//! pool balance, with floating coupons read off the forward curve
//! instead of a flat spread.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::curve::YieldCurve;
use crate::error::EngineError;
use crate::schedule::PaymentSchedule;
use crate::types::{CouponType, Money, Rate};
use crate::EngineResult;

use super::Asset;

/// Cash flows realized by one asset in one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPeriodFlow {
    pub period: u32,
    pub begin_balance: Money,
    pub scheduled_interest: Money,
    pub scheduled_principal: Money,
    pub prepayment: Money,
    pub default_amount: Money,
    pub recovery: Money,
    pub end_balance: Money,
}

/// Queue of recoveries owed in future periods, keyed by the period they
/// become due.
#[derive(Debug, Clone, Default)]
pub struct RecoveryQueue {
    pending: Vec<(u32, Money)>,
}

impl RecoveryQueue {
    pub fn schedule(&mut self, due_period: u32, amount: Money) {
        if !amount.is_zero() {
            self.pending.push((due_period, amount));
        }
    }

    /// Collect and remove all recoveries due at `period`.
    pub fn collect(&mut self, period: u32) -> Money {
        let (due, not_due): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(p, _)| *p == period);
        self.pending = not_due;
        due.into_iter().map(|(_, amt)| amt).sum()
    }

    pub fn outstanding(&self) -> Money {
        self.pending.iter().map(|(_, amt)| *amt).sum()
    }
}

/// Project one period of cash flow for `asset`, mutating its balance and
/// defaulted state in place, and returning the realized flow.
///
/// Order of operations: scheduled amortization, then prepayment, then
/// default — all reducing the performing balance before interest is
/// computed on the period's *beginning* balance.
#[allow(clippy::too_many_arguments)]
pub fn project_period(
    asset: &mut Asset,
    period: u32,
    years_from_close: Decimal,
    scheduled_amort: Money,
    hazard_rate: Rate,
    prepay_rate: Rate,
    recovery_lag_periods: u32,
    curve: Option<&YieldCurve>,
    recoveries: &mut RecoveryQueue,
) -> EngineResult<AssetPeriodFlow> {
    let begin_balance = asset.current_balance;

    if asset.defaulted || begin_balance.is_zero() {
        let recovery = recoveries.collect(period);
        asset.recovery_expectation = recoveries.outstanding();
        return Ok(AssetPeriodFlow {
            period,
            begin_balance,
            scheduled_interest: Decimal::ZERO,
            scheduled_principal: Decimal::ZERO,
            prepayment: Decimal::ZERO,
            default_amount: Decimal::ZERO,
            recovery,
            end_balance: begin_balance,
        });
    }

    let period_frac = match asset.frequency.periods_per_year() {
        0 => Decimal::ONE,
        n => Decimal::ONE / Decimal::from(n),
    };

    let coupon_rate = match &asset.coupon {
        CouponType::Fixed { rate } => *rate,
        CouponType::Floating { spread } => {
            let index = curve
                .map(|c| c.spot_rate(years_from_close))
                .unwrap_or(Decimal::ZERO);
            index + spread
        }
    };

    let scheduled_interest = begin_balance * coupon_rate * period_frac;

    // 1. scheduled amortization
    let scheduled_amort = scheduled_amort.min(begin_balance);
    let after_amort = begin_balance - scheduled_amort;

    // 2. prepayment
    let prepayment = (after_amort * prepay_rate).max(Decimal::ZERO);
    let after_prepay = (after_amort - prepayment).max(Decimal::ZERO);

    // 3. default
    let default_amount = (after_prepay * hazard_rate).max(Decimal::ZERO);
    let end_balance = (after_prepay - default_amount).max(Decimal::ZERO);

    if default_amount > Decimal::ZERO {
        let recovery_rate = asset.ratings.recovery_rate();
        let recovery_amount = default_amount * recovery_rate;
        recoveries.schedule(period + recovery_lag_periods.max(1), recovery_amount);
    }

    let recovery = recoveries.collect(period);

    asset.current_balance = end_balance;
    asset.recovery_expectation = recoveries.outstanding();
    if end_balance.is_zero() && !default_amount.is_zero() {
        asset.defaulted = true;
        asset.current_pay = false;
    }

    if asset.current_balance < Decimal::ZERO {
        return Err(EngineError::InvariantBreach {
            period,
            component: "asset_cashflow".into(),
            detail: format!("asset {} balance went negative", asset.id),
        });
    }

    Ok(AssetPeriodFlow {
        period,
        begin_balance,
        scheduled_interest,
        scheduled_principal: scheduled_amort,
        prepayment,
        default_amount,
        recovery,
        end_balance,
    })
}

/// Project an asset across an entire payment schedule given a per-period
/// hazard-rate and prepayment-rate vector (one entry per schedule period,
/// last value repeated if the vectors are shorter than the schedule).
pub fn project_life(
    asset: &mut Asset,
    schedule: &PaymentSchedule,
    hazard_rates: &[Rate],
    prepay_rates: &[Rate],
    recovery_lag_periods: u32,
    curve: Option<&YieldCurve>,
) -> EngineResult<Vec<AssetPeriodFlow>> {
    let mut recoveries = RecoveryQueue::default();
    let mut flows = Vec::with_capacity(schedule.periods.len());

    for sp in &schedule.periods {
        let hazard = rate_at(hazard_rates, sp.index);
        let prepay = rate_at(prepay_rates, sp.index);
        let years = Decimal::from(sp.index) / Decimal::from(asset.frequency.periods_per_year());
        let period_frac = match asset.frequency.periods_per_year() {
            0 => Decimal::ONE,
            n => Decimal::ONE / Decimal::from(n),
        };
        let scheduled_amort = asset.scheduled_amort(period_frac, sp.accrual_end);
        let flow = project_period(
            asset,
            sp.index,
            years,
            scheduled_amort,
            hazard,
            prepay,
            recovery_lag_periods,
            curve,
            &mut recoveries,
        )?;
        flows.push(flow);
    }

    Ok(flows)
}

fn rate_at(rates: &[Rate], index: u32) -> Rate {
    if rates.is_empty() {
        return Decimal::ZERO;
    }
    let i = (index as usize - 1).min(rates.len() - 1);
    rates[i]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetRatings;
    use crate::types::{DayCount, Frequency, Rating};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_asset() -> Asset {
        Asset {
            id: "L-1".into(),
            initial_par: dec!(1_000_000),
            current_balance: dec!(1_000_000),
            coupon: CouponType::Fixed { rate: dec!(0.08) },
            frequency: Frequency::Quarterly,
            day_count: DayCount::Act360,
            origination_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            first_payment_date: NaiveDate::from_ymd_opt(2019, 4, 1).unwrap(),
            maturity_date: NaiveDate::from_ymd_opt(2029, 1, 1).unwrap(),
            legal_final_date: NaiveDate::from_ymd_opt(2029, 1, 1).unwrap(),
            amortization: crate::types::AmortizationSchedule::Bullet,
            seniority: "Senior Secured".into(),
            industry_sp: "Software".into(),
            industry_moody: "Software".into(),
            country: "US".into(),
            obligor_group: "Acme".into(),
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
            market_price: dec!(99.5),
        }
    }

    #[test]
    fn test_no_defaults_no_prepay_interest_only() {
        let mut asset = sample_asset();
        let mut recoveries = RecoveryQueue::default();
        let flow = project_period(
            &mut asset,
            1,
            dec!(0.25),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            6,
            None,
            &mut recoveries,
        )
        .unwrap();
        assert_eq!(flow.scheduled_interest, dec!(20_000)); // 1mm * 8% * 0.25
        assert_eq!(flow.end_balance, dec!(1_000_000));
    }

    #[test]
    fn test_default_reduces_balance_and_schedules_recovery() {
        let mut asset = sample_asset();
        let mut recoveries = RecoveryQueue::default();
        let flow = project_period(
            &mut asset,
            1,
            dec!(0.25),
            Decimal::ZERO,
            dec!(0.02),
            Decimal::ZERO,
            6,
            None,
            &mut recoveries,
        )
        .unwrap();
        assert_eq!(flow.default_amount, dec!(20_000));
        assert_eq!(asset.current_balance, dec!(980_000));
        assert!(recoveries.outstanding() > Decimal::ZERO);
    }

    #[test]
    fn test_recovery_collected_after_lag() {
        let mut asset = sample_asset();
        let mut recoveries = RecoveryQueue::default();
        // Period 1: default triggers a recovery due at period 1 + lag(1) = 2
        project_period(
            &mut asset, 1, dec!(0.25), Decimal::ZERO, dec!(0.02), Decimal::ZERO, 1, None,
            &mut recoveries,
        )
        .unwrap();
        let flow2 = project_period(
            &mut asset, 2, dec!(0.5), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, 1, None,
            &mut recoveries,
        )
        .unwrap();
        assert!(flow2.recovery > Decimal::ZERO);
    }

    #[test]
    fn test_prepayment_before_default_in_order() {
        let mut asset = sample_asset();
        let mut recoveries = RecoveryQueue::default();
        let flow = project_period(
            &mut asset, 1, dec!(0.25), Decimal::ZERO, dec!(0.10), dec!(0.10), 6, None,
            &mut recoveries,
        )
        .unwrap();
        // prepay applies to 1,000,000 -> 100,000; default applies to the
        // remaining 900,000 -> 90,000, not to the original balance.
        assert_eq!(flow.prepayment, dec!(100_000));
        assert_eq!(flow.default_amount, dec!(90_000));
    }

    #[test]
    fn test_floating_coupon_reads_forward_curve() {
        use crate::curve::{CurvePoint, YieldCurve};
        let mut asset = sample_asset();
        asset.coupon = CouponType::Floating { spread: dec!(0.02) };
        let curve = YieldCurve::new(vec![
            CurvePoint { tenor: dec!(0.25), rate: dec!(0.05) },
        ])
        .unwrap();
        let mut recoveries = RecoveryQueue::default();
        let flow = project_period(
            &mut asset, 1, dec!(0.25), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, 6,
            Some(&curve), &mut recoveries,
        )
        .unwrap();
        // (5% + 2%) * 0.25 * 1,000,000
        assert_eq!(flow.scheduled_interest, dec!(17_500));
    }

    #[test]
    fn test_defaulted_asset_produces_only_recovery_flows() {
        let mut asset = sample_asset();
        asset.defaulted = true;
        asset.current_pay = false;
        asset.current_balance = Decimal::ZERO;
        asset.recovery_expectation = dec!(50_000);
        let mut recoveries = RecoveryQueue::default();
        recoveries.schedule(1, dec!(50_000));
        let flow = project_period(
            &mut asset, 1, dec!(0.25), Decimal::ZERO, dec!(0.02), Decimal::ZERO, 6, None,
            &mut recoveries,
        )
        .unwrap();
        assert_eq!(flow.scheduled_interest, Decimal::ZERO);
        assert_eq!(flow.recovery, dec!(50_000));
    }

    #[test]
    fn test_bullet_payoff_at_maturity_fully_amortizes() {
        let mut asset = sample_asset();
        let mut recoveries = RecoveryQueue::default();
        let scheduled_amort = asset.scheduled_amort(dec!(0.25), asset.maturity_date);
        let flow = project_period(
            &mut asset, 40, dec!(10), scheduled_amort, Decimal::ZERO, Decimal::ZERO, 6, None,
            &mut recoveries,
        )
        .unwrap();
        assert_eq!(flow.scheduled_principal, dec!(1_000_000));
        assert_eq!(flow.end_balance, Decimal::ZERO);
        assert_eq!(asset.current_balance, Decimal::ZERO);
    }
}
