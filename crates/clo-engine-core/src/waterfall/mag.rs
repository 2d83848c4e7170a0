//! Magnetar-family waterfall variants: twelve version-specific feature
//! sets layered cumulatively on top of [`super::strategies::traditional`].
//!
//! Each `MagVersion` binds a documented equity hurdle rate except
//! `Mag12`, which has no built-in default: [`MagConfig::hurdle_rate`]
//! must be supplied by the caller or [`build`] returns `BadInput`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::accounts::AccountName;
use crate::error::EngineError;
use crate::types::Rate;
use crate::EngineResult;

use super::formula::Formula;
use super::strategies::WaterfallConfig;
use super::{StepDestination, StepSequenceStrategy, Trigger, WaterfallStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MagVersion {
    Mag6,
    Mag7,
    Mag8,
    Mag9,
    Mag10,
    Mag11,
    Mag12,
    Mag13,
    Mag14,
    Mag15,
    Mag16,
    Mag17,
}

impl MagVersion {
    fn ordinal(&self) -> u32 {
        match self {
            MagVersion::Mag6 => 6,
            MagVersion::Mag7 => 7,
            MagVersion::Mag8 => 8,
            MagVersion::Mag9 => 9,
            MagVersion::Mag10 => 10,
            MagVersion::Mag11 => 11,
            MagVersion::Mag12 => 12,
            MagVersion::Mag13 => 13,
            MagVersion::Mag14 => 14,
            MagVersion::Mag15 => 15,
            MagVersion::Mag16 => 16,
            MagVersion::Mag17 => 17,
        }
    }

    /// Turbo principal sweep, enabled from Mag 6 onward.
    fn has_turbo_principal(&self) -> bool {
        self.ordinal() >= 6
    }

    /// Equity claw-back escrow, enabled from Mag 8 onward.
    fn has_equity_clawback(&self) -> bool {
        self.ordinal() >= 8
    }

    /// Management-fee deferral when equity IRR is below the version's
    /// hurdle, enabled from Mag 10 onward.
    fn has_management_fee_deferral(&self) -> bool {
        self.ordinal() >= 10
    }

    /// Incentive-fee sharing at a configured split, enabled from Mag 12
    /// onward (the incentive fee tracker itself applies the split; this
    /// only affects whether the waterfall routes a share to the manager
    /// ahead of the residual equity step).
    fn has_incentive_fee_sharing(&self) -> bool {
        self.ordinal() >= 12
    }

    /// Reinvestment-overlay fee, Mag 14 onward.
    fn has_reinvestment_overlay_fee(&self) -> bool {
        self.ordinal() >= 14
    }

    /// IRR-based performance-hurdle triggers (as opposed to a flat
    /// coverage-test trigger), Mag 15 onward.
    fn has_irr_hurdle_triggers(&self) -> bool {
        self.ordinal() >= 15
    }

    /// Distribution stopper on covenant breach, Mag 16 onward.
    fn has_distribution_stopper(&self) -> bool {
        self.ordinal() >= 16
    }

    /// Call-protection override plus excess-spread capture: Mag 17 only
    /// ("Mag 17 enables all features plus call-protection override and
    /// excess-spread capture").
    fn has_call_protection_override(&self) -> bool {
        matches!(self, MagVersion::Mag17)
    }

    /// Excess-spread capture: diverts a configured share of interest
    /// proceeds left over after fees and tranche interest into the
    /// reinvestment budget instead of letting it reach equity, Mag 17 only.
    fn has_excess_spread_capture(&self) -> bool {
        matches!(self, MagVersion::Mag17)
    }

    /// Documented default equity hurdle rate (Mag 6 = 8% through Mag 17 =
    /// 15%). Returns `None` for `Mag12`, whose rate is deliberately not
    /// defaulted — see the module doc comment.
    fn default_hurdle_rate(&self) -> Option<Rate> {
        match self {
            MagVersion::Mag6 => Some(dec!(0.08)),
            MagVersion::Mag7 => Some(dec!(0.085)),
            MagVersion::Mag8 => Some(dec!(0.09)),
            MagVersion::Mag9 => Some(dec!(0.095)),
            MagVersion::Mag10 => Some(dec!(0.10)),
            MagVersion::Mag11 => Some(dec!(0.105)),
            MagVersion::Mag12 => None,
            MagVersion::Mag13 => Some(dec!(0.115)),
            MagVersion::Mag14 => Some(dec!(0.12)),
            MagVersion::Mag15 => Some(dec!(0.125)),
            MagVersion::Mag16 => Some(dec!(0.135)),
            MagVersion::Mag17 => Some(dec!(0.15)),
        }
    }
}

/// Flag names the orchestrator is expected to compute each period and
/// make available to [`super::engine::EngineView::flags`], consumed by
/// the feature gates a given `MagVersion` turns on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagFlags {
    pub turbo: String,
    pub clawback_hurdle_met: String,
    pub distribution_stopper: String,
    pub call_protected: String,
}

impl Default for MagFlags {
    fn default() -> Self {
        Self {
            turbo: "mag_turbo".into(),
            clawback_hurdle_met: "mag_clawback_hurdle_met".into(),
            distribution_stopper: "mag_distribution_stopper".into(),
            call_protected: "mag_call_protected".into(),
        }
    }
}

/// Per-deal Magnetar configuration. `hurdle_rate` is required for
/// `Mag12` and ignored (the documented default is used) for every other
/// version if left `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagConfig {
    pub version: MagVersion,
    pub hurdle_rate: Option<Rate>,
    pub incentive_fee_split: Rate,
    pub reinvestment_overlay_fee_name: String,
    #[serde(default)]
    pub flags: MagFlags,
    /// Share of interest proceeds diverted to the reinvestment budget ahead
    /// of the equity residual step, Mag 17 only (`has_excess_spread_capture`).
    #[serde(default)]
    pub excess_spread_capture_rate: Rate,
}

impl MagConfig {
    /// Resolve the effective hurdle rate, erroring if `Mag12` was built
    /// without an explicit rate.
    pub fn effective_hurdle_rate(&self) -> EngineResult<Rate> {
        match self.version.default_hurdle_rate() {
            Some(rate) => Ok(self.hurdle_rate.unwrap_or(rate)),
            None => self.hurdle_rate.ok_or_else(|| EngineError::BadInput {
                field: "hurdle_rate".into(),
                reason: "Mag12 hurdle rate is not defaulted (source materials carry conflicting \
                         11%/11.5% figures); it must be supplied explicitly"
                    .into(),
            }),
        }
    }
}

/// Build the Magnetar-version waterfall: `traditional` with feature
/// flags layered on per the version's cumulative feature matrix.
pub fn build(waterfall: &WaterfallConfig, mag: &MagConfig) -> EngineResult<StepSequenceStrategy> {
    let _hurdle_rate = mag.effective_hurdle_rate()?;
    let mut strategy = super::strategies::traditional(waterfall);
    let principal_start = waterfall.senior_fees.len() + waterfall.cohorts.len();

    if mag.version.has_turbo_principal() {
        for (i, cohort) in waterfall.cohorts.iter().enumerate() {
            let step = &mut strategy.steps[principal_start + i];
            let coverage_trigger = step.trigger.clone();
            step.trigger = Trigger::Or(Box::new(coverage_trigger), Box::new(Trigger::FlagSet(mag.flags.turbo.clone())));
        }
    }

    if mag.version.has_distribution_stopper() {
        for step in strategy.steps.iter_mut() {
            if matches!(step.destination, StepDestination::Equity) {
                let existing = step.trigger.clone();
                step.trigger = Trigger::And(Box::new(existing), Box::new(Trigger::FlagUnset(mag.flags.distribution_stopper.clone())));
            }
        }
    }

    if mag.version.has_equity_clawback() {
        if let Some(last) = strategy.steps.last_mut() {
            if matches!(last.destination, StepDestination::Equity) {
                last.destination = StepDestination::Escrow;
            }
        }
        // Pre-Mag15 versions gate escrow release on coverage tests passing
        // outright rather than the IRR-based hurdle flag Mag15+ tracks.
        let hurdle_trigger = if mag.version.has_irr_hurdle_triggers() {
            Trigger::FlagSet(mag.flags.clawback_hurdle_met.clone())
        } else {
            Trigger::AllTestsPass
        };
        let release_priority = strategy.steps.last().map(|s| s.priority + 1).unwrap_or(1);
        strategy.steps.push(WaterfallStep {
            name: "Escrow Release to Equity".into(),
            priority: release_priority,
            source: AccountName::Custodial,
            destination: StepDestination::Equity,
            trigger: hurdle_trigger,
            formula: super::formula::parse("available_cash").expect("static formula"),
        });
    }

    if mag.version.has_excess_spread_capture() {
        let insert_at = strategy
            .steps
            .iter()
            .position(|s| matches!(s.destination, StepDestination::Equity | StepDestination::Escrow))
            .unwrap_or(strategy.steps.len());
        let priority = strategy.steps[insert_at].priority;
        for step in strategy.steps[insert_at..].iter_mut() {
            step.priority += 1;
        }
        strategy.steps.insert(
            insert_at,
            WaterfallStep {
                name: "Excess Spread Capture".into(),
                priority,
                source: AccountName::InterestCollection,
                destination: StepDestination::ReinvestmentBudget,
                trigger: Trigger::Always,
                formula: Formula::Mul(
                    Box::new(Formula::Var("available_cash".into())),
                    Box::new(Formula::Literal(mag.excess_spread_capture_rate)),
                ),
            },
        );
    }

    if mag.version.has_reinvestment_overlay_fee() {
        let priority = strategy.steps.last().map(|s| s.priority + 1).unwrap_or(1);
        strategy.steps.push(WaterfallStep {
            name: "Reinvestment Overlay Fee".into(),
            priority,
            source: AccountName::PrincipalCollection,
            destination: StepDestination::Fee(mag.reinvestment_overlay_fee_name.clone()),
            trigger: Trigger::Always,
            formula: super::formula::parse("fee_due + deferred_balance").expect("static formula"),
        });
    }

    if mag.version.has_call_protection_override() {
        for (i, cohort) in waterfall.cohorts.iter().enumerate() {
            let _ = cohort;
            let step = &mut strategy.steps[principal_start + i];
            let existing = step.trigger.clone();
            step.trigger = Trigger::Or(Box::new(existing), Box::new(Trigger::FlagUnset(mag.flags.call_protected.clone())));
        }
    }

    // Management-fee deferral (Mag 10+) and incentive-fee sharing split
    // (Mag 12+) are applied by the deal engine and incentive fee tracker
    // respectively against `mag.version`/`mag.incentive_fee_split`
    // directly, rather than as waterfall steps — they change how much a
    // fee settlement or equity distribution nets out to, not where cash
    // routes.
    let _ = mag.version.has_management_fee_deferral();
    let _ = mag.version.has_incentive_fee_sharing();

    strategy.name = format!("{:?}", mag.version);
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::TestId;
    use crate::waterfall::strategies::TrancheCohort;

    fn sample_config() -> WaterfallConfig {
        WaterfallConfig {
            cohorts: vec![TrancheCohort { tranche_name: "Class A".into(), oc_test: TestId(1), ic_test: TestId(2) }],
            senior_fees: vec!["Senior Management Fee".into()],
            subordinate_fees: vec![],
            equity_tranche: "Subordinated Notes".into(),
        }
    }

    fn sample_mag(version: MagVersion, hurdle_rate: Option<Rate>) -> MagConfig {
        MagConfig {
            version,
            hurdle_rate,
            incentive_fee_split: dec!(0.20),
            reinvestment_overlay_fee_name: "Reinvestment Overlay Fee".into(),
            flags: MagFlags::default(),
            excess_spread_capture_rate: dec!(0.05),
        }
    }

    #[test]
    fn test_mag6_has_turbo_but_not_clawback() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag6, None)).unwrap();
        let principal = strategy.steps.iter().find(|s| s.name.contains("Principal")).unwrap();
        assert!(matches!(principal.trigger, Trigger::Or(_, _)));
        assert!(!strategy.steps.iter().any(|s| matches!(s.destination, StepDestination::Escrow)));
    }

    #[test]
    fn test_mag8_adds_equity_clawback_escrow() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag8, None)).unwrap();
        assert!(strategy.steps.iter().any(|s| matches!(s.destination, StepDestination::Escrow)));
        assert!(strategy.steps.iter().any(|s| s.name == "Escrow Release to Equity"));
    }

    #[test]
    fn test_mag12_requires_explicit_hurdle_rate() {
        let result = build(&sample_config(), &sample_mag(MagVersion::Mag12, None));
        assert!(result.is_err());
    }

    #[test]
    fn test_mag12_builds_with_explicit_hurdle_rate() {
        let result = build(&sample_config(), &sample_mag(MagVersion::Mag12, Some(dec!(0.11))));
        assert!(result.is_ok());
    }

    #[test]
    fn test_mag17_has_call_protection_override() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag17, None)).unwrap();
        let principal = strategy.steps.iter().find(|s| s.name.contains("Principal")).unwrap();
        // turbo OR + call-protection override OR => nested Or triggers
        assert!(matches!(principal.trigger, Trigger::Or(_, _)));
    }

    #[test]
    fn test_mag17_adds_excess_spread_capture_before_escrow() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag17, None)).unwrap();
        let capture_idx = strategy.steps.iter().position(|s| s.name == "Excess Spread Capture").unwrap();
        let escrow_idx = strategy.steps.iter().position(|s| matches!(s.destination, StepDestination::Escrow)).unwrap();
        assert!(capture_idx < escrow_idx);
        assert!(matches!(strategy.steps[capture_idx].destination, StepDestination::ReinvestmentBudget));
    }

    #[test]
    fn test_mag16_has_no_excess_spread_capture() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag16, None)).unwrap();
        assert!(!strategy.steps.iter().any(|s| s.name == "Excess Spread Capture"));
    }

    #[test]
    fn test_pre_mag15_hurdle_trigger_is_not_irr_based() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag8, None)).unwrap();
        let release = strategy.steps.iter().find(|s| s.name == "Escrow Release to Equity").unwrap();
        assert!(matches!(release.trigger, Trigger::AllTestsPass));
    }

    #[test]
    fn test_mag15_hurdle_trigger_is_irr_based() {
        let strategy = build(&sample_config(), &sample_mag(MagVersion::Mag15, None)).unwrap();
        let release = strategy.steps.iter().find(|s| s.name == "Escrow Release to Equity").unwrap();
        assert!(matches!(release.trigger, Trigger::FlagSet(_)));
    }

    #[test]
    fn test_hurdle_rates_span_documented_range() {
        assert_eq!(MagVersion::Mag6.default_hurdle_rate(), Some(dec!(0.08)));
        assert_eq!(MagVersion::Mag17.default_hurdle_rate(), Some(dec!(0.15)));
        assert_eq!(MagVersion::Mag12.default_hurdle_rate(), None);
    }
}
