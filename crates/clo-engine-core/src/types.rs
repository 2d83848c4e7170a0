use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Year fractions or counts.
pub type Years = Decimal;

/// A single dated cash flow, used by XIRR/XNPV and the equity/incentive fee
/// IRR tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatedCashFlow {
    pub date: NaiveDate,
    pub amount: Money,
}

/// Day-count convention (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCount {
    Act360,
    Act365,
    Thirty360,
}

impl DayCount {
    /// Year fraction between two dates under this convention.
    pub fn fraction(&self, start: NaiveDate, end: NaiveDate) -> Decimal {
        match self {
            DayCount::Act360 => Decimal::from((end - start).num_days()) / Decimal::from(360),
            DayCount::Act365 => Decimal::from((end - start).num_days()) / Decimal::from(365),
            DayCount::Thirty360 => {
                let (y1, m1) = (start.year() as i64, start.month() as i64);
                let (y2, m2) = (end.year() as i64, end.month() as i64);
                let d1 = (start.day() as i64).min(30);
                let d2 = if d1 == 30 { (end.day() as i64).min(30) } else { end.day() as i64 };
                let days = (y2 - y1) * 360 + (m2 - m1) * 30 + (d2 - d1);
                Decimal::from(days) / Decimal::from(360)
            }
        }
    }
}

/// Payment/accrual frequency, as periods per year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Frequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Frequency::Monthly => 12,
            Frequency::Quarterly => 4,
            Frequency::SemiAnnual => 2,
            Frequency::Annual => 1,
        }
    }

    pub fn months_per_period(&self) -> u32 {
        12 / self.periods_per_year()
    }
}

/// Coupon type shared by assets and tranches: fixed, or floating at a
/// spread over a reference index read from the forward curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CouponType {
    Fixed { rate: Rate },
    Floating { spread: Rate },
}

/// How an asset's principal amortizes ahead of its `maturity_date` (§3
/// Asset, §4.3). Every variant still pays off whatever balance remains
/// as a bullet at `maturity_date` — the distinction is only what, if
/// anything, amortizes before then. Most broadly syndicated leveraged
/// loans are bullet with a nominal 1%/year mandatory amortization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AmortizationSchedule {
    /// No scheduled principal before maturity; the full balance is due
    /// at `maturity_date`.
    Bullet,
    /// `annual_pct` of original par amortizes straight-line each period
    /// before maturity; any balance left at `maturity_date` pays off as
    /// a balloon.
    Straight { annual_pct: Rate },
}

/// Simplified Moody's-family rating scale used for recovery/factor lookups
/// and rating-bucket compliance tests. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rating {
    Aaa,
    Aa1,
    Aa2,
    Aa3,
    A1,
    A2,
    A3,
    Baa1,
    Baa2,
    Baa3,
    Ba1,
    Ba2,
    Ba3,
    B1,
    B2,
    B3,
    Caa1,
    Caa2,
    Caa3,
    Ca,
    C,
}

impl Rating {
    pub const ALL: [Rating; 21] = [
        Rating::Aaa,
        Rating::Aa1,
        Rating::Aa2,
        Rating::Aa3,
        Rating::A1,
        Rating::A2,
        Rating::A3,
        Rating::Baa1,
        Rating::Baa2,
        Rating::Baa3,
        Rating::Ba1,
        Rating::Ba2,
        Rating::Ba3,
        Rating::B1,
        Rating::B2,
        Rating::B3,
        Rating::Caa1,
        Rating::Caa2,
        Rating::Caa3,
        Rating::Ca,
        Rating::C,
    ];

    /// Moody's rating factor (lower is better). Used for WARF.
    pub fn factor(&self) -> Decimal {
        match self {
            Rating::Aaa => Decimal::from(1),
            Rating::Aa1 => Decimal::from(10),
            Rating::Aa2 => Decimal::from(20),
            Rating::Aa3 => Decimal::from(40),
            Rating::A1 => Decimal::from(70),
            Rating::A2 => Decimal::from(120),
            Rating::A3 => Decimal::from(180),
            Rating::Baa1 => Decimal::from(260),
            Rating::Baa2 => Decimal::from(360),
            Rating::Baa3 => Decimal::from(610),
            Rating::Ba1 => Decimal::from(940),
            Rating::Ba2 => Decimal::from(1350),
            Rating::Ba3 => Decimal::from(1766),
            Rating::B1 => Decimal::from(2220),
            Rating::B2 => Decimal::from(2720),
            Rating::B3 => Decimal::from(3490),
            Rating::Caa1 => Decimal::from(4770),
            Rating::Caa2 => Decimal::from(6500),
            Rating::Caa3 => Decimal::from(8070),
            Rating::Ca => Decimal::from(10000),
            Rating::C => Decimal::from(10000),
        }
    }

    /// Rating-based recovery-rate lookup (§3 Asset invariant: "ratings map
    /// to a recovery rate through a documented lookup"). Senior secured
    /// loan recovery assumptions, decimal (0.70 = 70%).
    pub fn recovery_rate(&self) -> Decimal {
        use rust_decimal_macros::dec;
        match self {
            Rating::Aaa | Rating::Aa1 | Rating::Aa2 | Rating::Aa3 => dec!(0.70),
            Rating::A1 | Rating::A2 | Rating::A3 => dec!(0.68),
            Rating::Baa1 | Rating::Baa2 | Rating::Baa3 => dec!(0.65),
            Rating::Ba1 | Rating::Ba2 | Rating::Ba3 => dec!(0.60),
            Rating::B1 | Rating::B2 | Rating::B3 => dec!(0.50),
            Rating::Caa1 | Rating::Caa2 | Rating::Caa3 => dec!(0.40),
            Rating::Ca | Rating::C => dec!(0.25),
        }
    }

    pub fn is_investment_grade(&self) -> bool {
        *self <= Rating::Baa3
    }

    pub fn is_ccc_or_below(&self) -> bool {
        *self >= Rating::Caa1
    }
}
