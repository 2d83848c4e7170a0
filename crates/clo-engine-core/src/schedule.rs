//! Payment schedule (§3 data model).

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Frequency;
use crate::EngineResult;

/// A single entry in the payment schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePeriod {
    /// 1-indexed period number.
    pub index: u32,
    pub accrual_start: NaiveDate,
    pub accrual_end: NaiveDate,
    pub payment_date: NaiveDate,
}

/// Ordered list of payment dates from closing to legal final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub periods: Vec<SchedulePeriod>,
}

impl PaymentSchedule {
    /// Build a schedule from closing to legal final at the given
    /// frequency. Payment dates coincide with accrual-period ends.
    pub fn generate(
        closing_date: NaiveDate,
        legal_final: NaiveDate,
        frequency: Frequency,
    ) -> EngineResult<Self> {
        if legal_final <= closing_date {
            return Err(EngineError::BadInput {
                field: "legal_final".into(),
                reason: "legal final must be after closing date".into(),
            });
        }

        let months_per_period = frequency.months_per_period();
        let mut periods = Vec::new();
        let mut accrual_start = closing_date;
        let mut index = 1u32;

        loop {
            let accrual_end = accrual_start
                .checked_add_months(Months::new(months_per_period))
                .ok_or_else(|| EngineError::DateError("date overflow building schedule".into()))?;

            if accrual_end > legal_final {
                // final stub period ends exactly at legal final.
                periods.push(SchedulePeriod {
                    index,
                    accrual_start,
                    accrual_end: legal_final,
                    payment_date: legal_final,
                });
                break;
            }

            periods.push(SchedulePeriod {
                index,
                accrual_start,
                accrual_end,
                payment_date: accrual_end,
            });

            if accrual_end == legal_final {
                break;
            }

            accrual_start = accrual_end;
            index += 1;
        }

        Ok(Self { periods })
    }

    pub fn num_periods(&self) -> u32 {
        self.periods.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarterly_schedule_covers_full_span() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let schedule = PaymentSchedule::generate(start, end, Frequency::Quarterly).unwrap();
        assert_eq!(schedule.num_periods(), 40);
        assert_eq!(schedule.periods[0].accrual_start, start);
        assert_eq!(schedule.periods.last().unwrap().accrual_end, end);
    }

    #[test]
    fn test_rejects_legal_final_before_closing() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2019, 1, 15).unwrap();
        assert!(PaymentSchedule::generate(start, end, Frequency::Quarterly).is_err());
    }

    #[test]
    fn test_stub_period_when_span_not_exact_multiple() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 10, 1).unwrap();
        let schedule = PaymentSchedule::generate(start, end, Frequency::Quarterly).unwrap();
        // 3 full quarters + a stub ending exactly at legal final.
        assert_eq!(schedule.periods.last().unwrap().accrual_end, end);
    }
}
