//! Financial primitives (C1): time-value-of-money functions, XIRR/XNPV.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::types::{DatedCashFlow, Money, Rate};
use crate::EngineResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;

/// Net Present Value of a series of regularly-spaced cash flows.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> EngineResult<Money> {
    if rate <= dec!(-1) {
        return Err(EngineError::BadInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount.is_zero() {
            return Err(EngineError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

/// Internal Rate of Return (periodic, regularly-spaced cash flows) via
/// Newton-Raphson.
pub fn irr(cash_flows: &[Money], guess: Rate) -> EngineResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(EngineError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }

    let mut rate = guess;

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;
        let one_plus_r = Decimal::ONE + rate;

        for (t, cf) in cash_flows.iter().enumerate() {
            let t_dec = Decimal::from(t as i64);
            let discount = one_plus_r.powd(t_dec);
            if discount.is_zero() {
                continue;
            }
            npv_val += cf / discount;
            if t > 0 {
                dnpv -= t_dec * cf / (one_plus_r.powd(t_dec + Decimal::ONE));
            }
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(EngineError::NonConvergent {
                function: "IRR".into(),
                iterations: i,
                last_delta: npv_val,
            });
        }

        rate -= npv_val / dnpv;

        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(EngineError::NonConvergent {
        function: "IRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: npv(rate, cash_flows).unwrap_or(Decimal::MAX),
    })
}

/// XNPV: present value of irregularly-dated cash flows at `rate`, using an
/// ACT/365 year fraction from the first flow's date (Excel-parity formula:
/// `sum(cf_i / (1+rate)^((d_i - d_0)/365))`).
pub fn xnpv(rate: Rate, dated_flows: &[DatedCashFlow]) -> EngineResult<Money> {
    if dated_flows.is_empty() {
        return Err(EngineError::InsufficientData(
            "XNPV requires at least 1 cash flow".into(),
        ));
    }
    if rate <= dec!(-1) {
        return Err(EngineError::BadInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let base_date = dated_flows[0].date;
    let one_plus_r = Decimal::ONE + rate;
    let mut total = Decimal::ZERO;

    for flow in dated_flows {
        let days = (flow.date - base_date).num_days();
        let years = Decimal::from(days) / dec!(365);
        let discount = one_plus_r.powd(years);
        if discount.is_zero() {
            return Err(EngineError::DivisionByZero {
                context: "XNPV discount factor".into(),
            });
        }
        total += flow.amount / discount;
    }

    Ok(total)
}

/// XIRR: the rate at which `xnpv(rate, dated_flows) == 0`, solved by
/// Newton-Raphson with the 1e-10 tolerance and 100-iteration cap the
/// legacy spreadsheet baseline requires (§4.1).
pub fn xirr(dated_flows: &[DatedCashFlow], guess: Rate) -> EngineResult<Rate> {
    if dated_flows.len() < 2 {
        return Err(EngineError::InsufficientData(
            "XIRR requires at least 2 cash flows".into(),
        ));
    }

    let base_date = dated_flows[0].date;
    let mut rate = guess;
    const TOLERANCE: Decimal = dec!(0.0000000001);

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;

        for flow in dated_flows {
            let days = (flow.date - base_date).num_days();
            let years = Decimal::from(days) / dec!(365);
            let one_plus_r = Decimal::ONE + rate;

            if one_plus_r <= Decimal::ZERO {
                return Err(EngineError::NonConvergent {
                    function: "XIRR".into(),
                    iterations: i,
                    last_delta: npv_val,
                });
            }

            let discount = one_plus_r.powd(years);
            if discount.is_zero() {
                continue;
            }

            npv_val += flow.amount / discount;
            dnpv -= years * flow.amount / (one_plus_r * discount);
        }

        if npv_val.abs() < TOLERANCE {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(EngineError::NonConvergent {
                function: "XIRR".into(),
                iterations: i,
                last_delta: npv_val,
            });
        }

        rate -= npv_val / dnpv;

        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(EngineError::NonConvergent {
        function: "XIRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: Decimal::ZERO,
    })
}

/// Present Value of a level annuity.
pub fn pv(rate: Rate, nper: u32, pmt: Money, future_value: Money) -> EngineResult<Money> {
    if rate.is_zero() {
        return Ok(-(pmt * Decimal::from(nper) + future_value));
    }

    let one_plus_r = Decimal::ONE + rate;
    let factor = one_plus_r.powd(Decimal::from(nper));

    if factor.is_zero() {
        return Err(EngineError::DivisionByZero {
            context: "PV factor".into(),
        });
    }

    let annuity_factor = (Decimal::ONE - Decimal::ONE / factor) / rate;
    Ok(-(pmt * annuity_factor + future_value / factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs, dec!(0.10)).unwrap();
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_pv_basic() {
        let result = pv(dec!(0.08), 10, dec!(-100), dec!(0)).unwrap();
        assert!((result - dec!(671)).abs() < dec!(2.0));
    }

    #[test]
    fn test_xirr_matches_annual_irr_on_annual_flows() {
        let flows = vec![
            DatedCashFlow { date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), amount: dec!(-1000) },
            DatedCashFlow { date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), amount: dec!(400) },
            DatedCashFlow { date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(), amount: dec!(400) },
            DatedCashFlow { date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), amount: dec!(400) },
        ];
        let result = xirr(&flows, dec!(0.10)).unwrap();
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_xnpv_zero_at_xirr_root() {
        let flows = vec![
            DatedCashFlow { date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), amount: dec!(-1000) },
            DatedCashFlow { date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), amount: dec!(1200) },
        ];
        let rate = xirr(&flows, dec!(0.05)).unwrap();
        let value = xnpv(rate, &flows).unwrap();
        assert!(value.abs() < dec!(0.01));
    }

    #[test]
    fn test_xirr_requires_two_flows() {
        let flows = vec![DatedCashFlow {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            amount: dec!(-1000),
        }];
        assert!(xirr(&flows, dec!(0.1)).is_err());
    }
}
