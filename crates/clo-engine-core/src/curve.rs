//! Yield curve and forward-rate derivation (C1).
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{Rate, Years};
use crate::EngineResult;

/// A single (tenor, spot rate) point on a yield curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Tenor in years.
    pub tenor: Years,
    /// Annualized spot rate (decimal).
    pub rate: Rate,
}

/// An ordered yield curve anchored at an analysis date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldCurve {
    pub points: Vec<CurvePoint>,
}

impl YieldCurve {
    pub fn new(mut points: Vec<CurvePoint>) -> EngineResult<Self> {
        if points.is_empty() {
            return Err(EngineError::InsufficientData(
                "Yield curve requires at least one point".into(),
            ));
        }
        points.sort_by(|a, b| a.tenor.cmp(&b.tenor));
        Ok(Self { points })
    }

    /// Spot rate at `tenor`, linearly interpolated in rate space between
    /// the two bracketing curve points (flat-extrapolated beyond the ends).
    pub fn spot_rate(&self, tenor: Years) -> Rate {
        if tenor <= self.points[0].tenor {
            return self.points[0].rate;
        }
        let last = self.points.len() - 1;
        if tenor >= self.points[last].tenor {
            return self.points[last].rate;
        }
        for window in self.points.windows(2) {
            let (lo, hi) = (&window[0], &window[1]);
            if tenor >= lo.tenor && tenor <= hi.tenor {
                let span = hi.tenor - lo.tenor;
                if span.is_zero() {
                    return lo.rate;
                }
                let weight = (tenor - lo.tenor) / span;
                return lo.rate + weight * (hi.rate - lo.rate);
            }
        }
        self.points[last].rate
    }

    /// Discrete forward rate between `t1` and `t2` (years from the
    /// analysis date), derived from spot rates:
    /// `f(t1,t2) = ((1+z2)^t2 / (1+z1)^t1)^(1/(t2-t1)) - 1`.
    pub fn forward_rate(&self, t1: Years, t2: Years) -> EngineResult<Rate> {
        if t2 <= t1 {
            return Err(EngineError::BadInput {
                field: "t2".into(),
                reason: "t2 must be strictly greater than t1".into(),
            });
        }
        let z1 = self.spot_rate(t1);
        let z2 = self.spot_rate(t2);
        let grown_to_t2 = (Decimal::ONE + z2).powd(t2);
        let grown_to_t1 = (Decimal::ONE + z1).powd(t1);
        if grown_to_t1.is_zero() {
            return Err(EngineError::DivisionByZero {
                context: "forward rate denominator".into(),
            });
        }
        let ratio = grown_to_t2 / grown_to_t1;
        let exponent = Decimal::ONE / (t2 - t1);
        Ok(ratio.powd(exponent) - Decimal::ONE)
    }
}
