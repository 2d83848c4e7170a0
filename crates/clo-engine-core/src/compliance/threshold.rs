//! Compliance threshold history and effective-date resolution (§3
//! Compliance Threshold).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::EngineResult;

use super::TestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdSource {
    Default,
    Template,
    DealOverride,
}

impl ThresholdSource {
    /// Precedence rank used to break effective-date ties: deal override
    /// beats template beats default (§3 **(added)** tie-break rule).
    fn precedence(&self) -> u8 {
        match self {
            ThresholdSource::DealOverride => 2,
            ThresholdSource::Template => 1,
            ThresholdSource::Default => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRecord {
    pub test_id: TestId,
    pub value: rust_decimal::Decimal,
    pub source: ThresholdSource,
    pub effective_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    /// Some tests carry a value specific to one MAG version; `None` means
    /// the record applies regardless of strategy variant.
    pub mag_version: Option<String>,
}

/// Append-only history of threshold records for one test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdHistory {
    pub records: Vec<ThresholdRecord>,
}

impl ThresholdHistory {
    pub fn append(&mut self, record: ThresholdRecord) {
        self.records.push(record);
    }

    /// The threshold in effect at `as_of`: among records with
    /// `effective_date <= as_of < expiry_date`, the one with the most
    /// recent `effective_date`; ties at the same `effective_date` are
    /// broken by source precedence (deal override > template > default).
    pub fn effective_as_of(&self, as_of: NaiveDate, mag_version: Option<&str>) -> EngineResult<&ThresholdRecord> {
        self.records
            .iter()
            .filter(|r| r.effective_date <= as_of)
            .filter(|r| r.expiry_date.map(|exp| as_of < exp).unwrap_or(true))
            .filter(|r| match (&r.mag_version, mag_version) {
                (None, _) => true,
                (Some(rv), Some(mv)) => rv == mv,
                (Some(_), None) => false,
            })
            .max_by(|a, b| {
                a.effective_date
                    .cmp(&b.effective_date)
                    .then(a.source.precedence().cmp(&b.source.precedence()))
            })
            .ok_or_else(|| EngineError::InsufficientData(format!(
                "no effective threshold for test {:?} as of {as_of}",
                self.records.first().map(|r| r.test_id)
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(source: ThresholdSource, effective: (i32, u32, u32), value: rust_decimal::Decimal) -> ThresholdRecord {
        ThresholdRecord {
            test_id: TestId(1),
            value,
            source,
            effective_date: NaiveDate::from_ymd_opt(effective.0, effective.1, effective.2).unwrap(),
            expiry_date: None,
            mag_version: None,
        }
    }

    #[test]
    fn test_deal_override_beats_template_at_same_date() {
        let mut history = ThresholdHistory::default();
        history.append(record(ThresholdSource::Default, (2020, 1, 1), dec!(1.20)));
        history.append(record(ThresholdSource::Template, (2020, 1, 1), dec!(1.25)));
        history.append(record(ThresholdSource::DealOverride, (2020, 1, 1), dec!(1.30)));
        let as_of = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let effective = history.effective_as_of(as_of, None).unwrap();
        assert_eq!(effective.value, dec!(1.30));
    }

    #[test]
    fn test_template_beats_default_when_no_override_present() {
        let mut history = ThresholdHistory::default();
        history.append(record(ThresholdSource::Default, (2020, 1, 1), dec!(1.20)));
        history.append(record(ThresholdSource::Template, (2020, 1, 1), dec!(1.25)));
        let as_of = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        assert_eq!(history.effective_as_of(as_of, None).unwrap().value, dec!(1.25));
    }

    #[test]
    fn test_expired_record_is_not_effective() {
        let mut history = ThresholdHistory::default();
        let mut expiring = record(ThresholdSource::DealOverride, (2020, 1, 1), dec!(1.30));
        expiring.expiry_date = Some(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        history.append(expiring);
        history.append(record(ThresholdSource::Default, (2019, 1, 1), dec!(1.20)));
        let as_of = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        assert_eq!(history.effective_as_of(as_of, None).unwrap().value, dec!(1.20));
    }

    #[test]
    fn test_mag_specific_record_only_applies_to_matching_version() {
        let mut history = ThresholdHistory::default();
        history.append(record(ThresholdSource::Default, (2020, 1, 1), dec!(1.20)));
        let mut mag_specific = record(ThresholdSource::DealOverride, (2020, 1, 1), dec!(1.15));
        mag_specific.mag_version = Some("Mag12".into());
        history.append(mag_specific);
        let as_of = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        assert_eq!(history.effective_as_of(as_of, Some("Mag12")).unwrap().value, dec!(1.15));
        assert_eq!(history.effective_as_of(as_of, Some("Mag6")).unwrap().value, dec!(1.20));
    }

    #[test]
    fn test_more_recent_effective_date_beats_higher_precedence() {
        let mut history = ThresholdHistory::default();
        history.append(record(ThresholdSource::DealOverride, (2018, 1, 1), dec!(1.30)));
        history.append(record(ThresholdSource::Default, (2021, 1, 1), dec!(1.10)));
        let as_of = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        // The 2021 default record postdates the 2018 deal override, so it
        // wins even though it has lower source precedence.
        assert_eq!(history.effective_as_of(as_of, None).unwrap().value, dec!(1.10));
    }

    #[test]
    fn test_no_effective_record_is_an_error() {
        let history = ThresholdHistory::default();
        let as_of = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        assert!(history.effective_as_of(as_of, None).is_err());
    }
}
