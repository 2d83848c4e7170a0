//! Asset: a single loan position in the collateral pool. Aggregation and
//! pool-level operations live in [`crate::pool`]; this module owns the
//! per-asset record and its cash-flow projection.

pub mod cashflow;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{AmortizationSchedule, CouponType, DayCount, Frequency, Money, Rate, Rating};
use crate::EngineResult;

/// Moody's and S&P rating pair, with watch flags, for a single asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRatings {
    pub moody: Rating,
    pub moody_on_watch_downgrade: bool,
    pub sp: Rating,
    pub sp_on_watch_downgrade: bool,
}

impl AssetRatings {
    /// The recovery rate implied by the worse of the two ratings.
    pub fn recovery_rate(&self) -> Rate {
        self.moody.max(self.sp).recovery_rate()
    }
}

/// A single loan position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub initial_par: Money,
    pub current_balance: Money,
    pub coupon: CouponType,
    pub frequency: Frequency,
    pub day_count: DayCount,
    pub origination_date: NaiveDate,
    pub first_payment_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub legal_final_date: NaiveDate,
    pub amortization: AmortizationSchedule,
    pub seniority: String,
    pub industry_sp: String,
    pub industry_moody: String,
    pub country: String,
    pub obligor_group: String,
    pub ratings: AssetRatings,
    pub covenant_lite: bool,
    pub dip: bool,
    pub current_pay: bool,
    pub defaulted: bool,
    /// Outstanding par still awaiting recovery, if defaulted.
    pub recovery_expectation: Money,
    pub market_price: Decimal,
}

impl Asset {
    /// Validate invariants: `current_balance >= 0`, `maturity >=
    /// origination`, and (once defaulted) that the asset is no longer
    /// performing.
    pub fn validate(&self) -> EngineResult<()> {
        if self.current_balance < Decimal::ZERO {
            return Err(EngineError::InvariantBreach {
                period: 0,
                component: "asset".into(),
                detail: format!("asset {} has negative balance", self.id),
            });
        }
        if self.maturity_date < self.origination_date {
            return Err(EngineError::BadInput {
                field: "maturity_date".into(),
                reason: format!("asset {} matures before it originates", self.id),
            });
        }
        if self.defaulted && self.current_pay {
            return Err(EngineError::InvariantBreach {
                period: 0,
                component: "asset".into(),
                detail: format!("asset {} is defaulted but marked current-pay", self.id),
            });
        }
        Ok(())
    }

    /// Whether this asset is extinguished: nothing left to pay down and no
    /// recovery still outstanding.
    pub fn is_extinguished(&self) -> bool {
        self.current_balance.is_zero() && self.recovery_expectation.is_zero()
    }

    /// Scheduled principal due for a period of length `period_frac`
    /// (years) ending on `accrual_end`, ahead of prepayment and default
    /// (§4.3 order of operations). A period whose accrual spans
    /// `maturity_date` forces a full bullet payoff of whatever balance
    /// remains, regardless of `amortization`.
    pub fn scheduled_amort(&self, period_frac: Decimal, accrual_end: NaiveDate) -> Money {
        if accrual_end >= self.maturity_date {
            return self.current_balance;
        }
        match &self.amortization {
            AmortizationSchedule::Bullet => Decimal::ZERO,
            AmortizationSchedule::Straight { annual_pct } => {
                (self.initial_par * annual_pct * period_frac).min(self.current_balance)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_asset() -> Asset {
        Asset {
            id: "L-1".into(),
            initial_par: dec!(1_000_000),
            current_balance: dec!(1_000_000),
            coupon: CouponType::Floating { spread: dec!(0.035) },
            frequency: Frequency::Quarterly,
            day_count: DayCount::Act360,
            origination_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            first_payment_date: NaiveDate::from_ymd_opt(2019, 4, 1).unwrap(),
            maturity_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            legal_final_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            amortization: AmortizationSchedule::Bullet,
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
    fn test_valid_asset_passes() {
        assert!(sample_asset().validate().is_ok());
    }

    #[test]
    fn test_negative_balance_is_invariant_breach() {
        let mut a = sample_asset();
        a.current_balance = dec!(-1);
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_maturity_before_origination_rejected() {
        let mut a = sample_asset();
        a.maturity_date = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_defaulted_and_current_pay_is_invariant_breach() {
        let mut a = sample_asset();
        a.defaulted = true;
        a.current_pay = true;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_extinguished_when_zero_balance_and_no_recovery() {
        let mut a = sample_asset();
        a.current_balance = Decimal::ZERO;
        assert!(a.is_extinguished());
    }

    #[test]
    fn test_bullet_amortizes_nothing_before_maturity() {
        let a = sample_asset();
        let before_maturity = a.maturity_date.pred_opt().unwrap();
        assert_eq!(a.scheduled_amort(dec!(0.25), before_maturity), Decimal::ZERO);
    }

    #[test]
    fn test_bullet_pays_full_balance_at_maturity() {
        let a = sample_asset();
        assert_eq!(a.scheduled_amort(dec!(0.25), a.maturity_date), a.current_balance);
    }

    #[test]
    fn test_straight_amortization_is_capped_by_current_balance() {
        let mut a = sample_asset();
        a.amortization = AmortizationSchedule::Straight { annual_pct: dec!(0.01) };
        a.current_balance = dec!(1_000);
        let before_maturity = a.maturity_date.pred_opt().unwrap();
        // 1,000,000 * 1% * 0.25 = 2,500, capped at the 1,000 remaining balance.
        assert_eq!(a.scheduled_amort(dec!(0.25), before_maturity), dec!(1_000));
    }
}
