//! Fees: recurring charges accrued against a basis each period, with an
//! accrual rate, a basis, and a deferral policy for shortfalls.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{Money, Rate};
use crate::EngineResult;

/// What a fee's accrual rate is multiplied against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeBasis {
    CollateralPar,
    TrancheBalance,
    FixedAmount,
}

/// Whether an unpaid fee shortfall is deferred (and carried forward) or
/// forfeited for the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferralPolicy {
    Defer,
    Forfeit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fee {
    pub name: String,
    pub accrual_rate: Rate,
    pub basis: FeeBasis,
    pub deferral_policy: DeferralPolicy,
    pub paid_to_date: Money,
    pub deferred_balance: Money,
}

impl Fee {
    pub fn new(name: &str, accrual_rate: Rate, basis: FeeBasis, deferral_policy: DeferralPolicy) -> Self {
        Self {
            name: name.into(),
            accrual_rate,
            basis,
            deferral_policy,
            paid_to_date: Decimal::ZERO,
            deferred_balance: Decimal::ZERO,
        }
    }

    /// Amount due this period given the relevant basis amount (collateral
    /// par, tranche balance, or the accrual rate itself when the basis is
    /// a fixed amount) and the period fraction.
    pub fn amount_due(&self, basis_amount: Money, period_frac: Decimal) -> Money {
        match self.basis {
            FeeBasis::FixedAmount => self.accrual_rate,
            _ => basis_amount * self.accrual_rate * period_frac,
        }
    }

    /// Settle this period's fee: pay as much as `cash_available` allows,
    /// then defer or forfeit the rest per policy. Returns the cash paid.
    pub fn settle(&mut self, due: Money, cash_available: Money) -> EngineResult<Money> {
        if cash_available < Decimal::ZERO {
            return Err(EngineError::BadInput {
                field: "cash_available".into(),
                reason: "cannot be negative".into(),
            });
        }
        let total_due = due + self.deferred_balance;
        let paid = total_due.min(cash_available);
        let shortfall = total_due - paid;

        self.paid_to_date += paid;
        self.deferred_balance = match self.deferral_policy {
            DeferralPolicy::Defer => shortfall,
            DeferralPolicy::Forfeit => Decimal::ZERO,
        };

        Ok(paid)
    }
}
