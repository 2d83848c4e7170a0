//! Incentive fee tracker (C11 §4.11): equity IRR tracking and
//! performance-fee split.
//!
//! The catch-up-then-carry split is the teacher's `pe::waterfall` GP
//! catch-up arithmetic (`CatchUp`/`CarriedInterest` tiers), generalized
//! from a one-shot exit-proceeds distribution to a running tracker that
//! the deal engine calls once per period: each call folds that period's
//! actual equity-tier cash into the cumulative IRR and, once the
//! configured hurdle has ever been reached, diverts the catch-up share
//! to the manager before falling back to the flat carry split.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::time_value;
use crate::types::{DatedCashFlow, Money, Rate};
use crate::EngineResult;

/// Running tracker for one deal's equity tranche: cumulative cash flows
/// (the initial investment, then one entry per period's net equity
/// distribution), the configured hurdle/catch-up/carry policy, and the
/// cumulative split already paid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncentiveFeeTracker {
    flows: Vec<DatedCashFlow>,
    pub hurdle_rate: Rate,
    /// Manager's share of cash during the catch-up phase (typically
    /// 1.0 — "100% catch-up").
    pub catch_up_rate: Rate,
    /// Manager's share of cash once catch-up is satisfied (the ordinary
    /// carried-interest / incentive-fee split).
    pub carry_rate: Rate,
    cumulative_manager_fee: Money,
    cumulative_equity_distributions: Money,
    /// Sticky once tripped: §8 Scenario 4 requires normal sharing to
    /// continue in every period after the hurdle is first reached, even
    /// if a later period's IRR were to dip back below it.
    hurdle_ever_met: bool,
}

/// One period's fee-split outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncentiveFeeAllocation {
    pub period_distribution: Money,
    pub to_manager: Money,
    pub to_equity: Money,
    pub cumulative_irr: Option<Rate>,
    pub hurdle_met: bool,
}

impl IncentiveFeeTracker {
    pub fn new(
        initial_equity_investment: Money,
        investment_date: NaiveDate,
        hurdle_rate: Rate,
        catch_up_rate: Rate,
        carry_rate: Rate,
    ) -> EngineResult<Self> {
        if initial_equity_investment <= Decimal::ZERO {
            return Err(EngineError::BadInput {
                field: "initial_equity_investment".into(),
                reason: "initial equity investment must be positive".into(),
            });
        }
        if hurdle_rate < Decimal::ZERO {
            return Err(EngineError::BadInput {
                field: "hurdle_rate".into(),
                reason: "hurdle rate cannot be negative".into(),
            });
        }
        if !(Decimal::ZERO..=Decimal::ONE).contains(&catch_up_rate) {
            return Err(EngineError::BadInput {
                field: "catch_up_rate".into(),
                reason: "catch-up rate must be between 0 and 1".into(),
            });
        }
        if !(Decimal::ZERO..Decimal::ONE).contains(&carry_rate) {
            return Err(EngineError::BadInput {
                field: "carry_rate".into(),
                reason: "carry rate must be in [0, 1)".into(),
            });
        }

        Ok(Self {
            flows: vec![DatedCashFlow {
                date: investment_date,
                amount: -initial_equity_investment,
            }],
            hurdle_rate,
            catch_up_rate,
            carry_rate,
            cumulative_manager_fee: Decimal::ZERO,
            cumulative_equity_distributions: Decimal::ZERO,
            hurdle_ever_met: false,
        })
    }

    /// Cumulative equity-investor IRR over every recorded cash flow to
    /// date. `None` until there are at least two flows, or if XIRR fails
    /// to converge (the caller is expected to surface that as a warning
    /// rather than abort the deal).
    pub fn cumulative_irr(&self) -> Option<Rate> {
        if self.flows.len() < 2 {
            return None;
        }
        time_value::xirr(&self.flows, dec!(0.1)).ok()
    }

    pub fn cumulative_manager_fee(&self) -> Money {
        self.cumulative_manager_fee
    }

    pub fn cumulative_equity_distributions(&self) -> Money {
        self.cumulative_equity_distributions
    }

    pub fn hurdle_met(&self) -> bool {
        self.hurdle_ever_met
    }

    /// Fold one period's gross equity-tier cash into the tracker,
    /// splitting it between the manager and equity holders per the
    /// catch-up-then-carry policy, and return the allocation.
    ///
    /// Before the hurdle has ever been reached, the full amount passes
    /// through to equity with no fee — this mirrors a waterfall that
    /// escrows the residual until the IRR test clears (§4.7 Equity
    /// Claw-Back) — and the period in which the hurdle is first reached
    /// gets the catch-up applied to its own distribution, matching §8
    /// Scenario 4.
    pub fn record_period(&mut self, as_of: NaiveDate, gross_distribution: Money) -> EngineResult<IncentiveFeeAllocation> {
        if gross_distribution < Decimal::ZERO {
            return Err(EngineError::BadInput {
                field: "gross_distribution".into(),
                reason: "equity distribution cannot be negative".into(),
            });
        }

        if !self.hurdle_ever_met {
            let mut probe = self.flows.clone();
            probe.push(DatedCashFlow {
                date: as_of,
                amount: gross_distribution,
            });
            if let Ok(rate) = time_value::xirr(&probe, dec!(0.1)) {
                if rate >= self.hurdle_rate {
                    self.hurdle_ever_met = true;
                }
            }
        }

        let (to_manager, to_equity) = if self.hurdle_ever_met {
            let target_catchup_cumulative = (self.carry_rate / (Decimal::ONE - self.carry_rate)) * self.cumulative_equity_distributions;
            let catchup_remaining = (target_catchup_cumulative - self.cumulative_manager_fee).max(Decimal::ZERO);
            let catchup_amount = gross_distribution.min(catchup_remaining);
            let carry_amount = gross_distribution - catchup_amount;

            let manager_from_catchup = catchup_amount * self.catch_up_rate;
            let manager_from_carry = carry_amount * self.carry_rate;
            let to_manager = manager_from_catchup + manager_from_carry;
            let to_equity = gross_distribution - to_manager;
            (to_manager, to_equity)
        } else {
            (Decimal::ZERO, gross_distribution)
        };

        self.cumulative_manager_fee += to_manager;
        self.cumulative_equity_distributions += to_equity;
        self.flows.push(DatedCashFlow {
            date: as_of,
            amount: to_equity,
        });

        Ok(IncentiveFeeAllocation {
            period_distribution: gross_distribution,
            to_manager,
            to_equity,
            cumulative_irr: self.cumulative_irr(),
            hurdle_met: self.hurdle_ever_met,
        })
    }
}
