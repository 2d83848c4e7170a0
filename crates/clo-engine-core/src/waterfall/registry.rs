//! Strategy registry: maps a strategy name to a factory, so a
//! deal-configuration file can select a waterfall shape by name instead
//! of the caller hard-coding a call to a specific builder in
//! [`super::strategies`] or [`super::mag`].

use std::collections::HashMap;

use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::EngineResult;

use super::mag::{MagConfig, MagFlags, MagVersion};
use super::strategies::{self, WaterfallConfig};
use super::{mag, StepSequenceStrategy, Strategy};

/// Every Magnetar vintage the registry preloads a named entry for.
const MAG_VERSIONS: [MagVersion; 12] = [
    MagVersion::Mag6,
    MagVersion::Mag7,
    MagVersion::Mag8,
    MagVersion::Mag9,
    MagVersion::Mag10,
    MagVersion::Mag11,
    MagVersion::Mag12,
    MagVersion::Mag13,
    MagVersion::Mag14,
    MagVersion::Mag15,
    MagVersion::Mag16,
    MagVersion::Mag17,
];

fn mag_name(version: MagVersion) -> &'static str {
    match version {
        MagVersion::Mag6 => "mag6",
        MagVersion::Mag7 => "mag7",
        MagVersion::Mag8 => "mag8",
        MagVersion::Mag9 => "mag9",
        MagVersion::Mag10 => "mag10",
        MagVersion::Mag11 => "mag11",
        MagVersion::Mag12 => "mag12",
        MagVersion::Mag13 => "mag13",
        MagVersion::Mag14 => "mag14",
        MagVersion::Mag15 => "mag15",
        MagVersion::Mag16 => "mag16",
        MagVersion::Mag17 => "mag17",
    }
}

type Factory = Box<dyn Fn(&WaterfallConfig) -> EngineResult<StepSequenceStrategy> + Send + Sync>;

/// Maps a strategy name to the factory that constructs it from a
/// [`WaterfallConfig`]. [`StrategyRegistry::standard`] preloads the five
/// named strategies in [`strategies`] plus one entry per Magnetar
/// vintage, each using that version's documented default hurdle rate
/// (`mag12` has none and will fail to build unless the caller replaces
/// it with [`register_mag`] supplying an explicit rate).
pub struct StrategyRegistry {
    factories: HashMap<String, Factory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Factory) {
        self.factories.insert(name.into(), factory);
    }

    /// Register (or replace) a Magnetar-version entry with a fully
    /// specified [`MagConfig`], useful for `mag12` where the default
    /// build has no hurdle rate to fall back on.
    pub fn register_mag(&mut self, name: impl Into<String>, config: MagConfig) {
        self.register(name, Box::new(move |wf| mag::build(wf, &config)));
    }

    pub fn build(&self, name: &str, config: &WaterfallConfig) -> EngineResult<StepSequenceStrategy> {
        let factory = self.factories.get(name).ok_or_else(|| EngineError::UndefinedStep {
            strategy: name.to_string(),
            step: "<not found in registry>".to_string(),
        })?;
        factory(config)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// A registry preloaded with `traditional`, `turbo`, `pik_toggle`,
    /// `equity_clawback`, `call_protected`, and one entry per Magnetar
    /// vintage under its lowercase name (`mag6` .. `mag17`).
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("traditional", Box::new(|cfg| Ok(strategies::traditional(cfg))));
        registry.register("turbo", Box::new(|cfg| Ok(strategies::turbo(cfg, "turbo_active"))));
        registry.register("pik_toggle", Box::new(|cfg| Ok(strategies::pik_toggle(cfg))));
        registry.register(
            "equity_clawback",
            Box::new(|cfg| Ok(strategies::equity_clawback(cfg, "hurdle_met"))),
        );
        registry.register(
            "call_protected",
            Box::new(|cfg| Ok(strategies::call_protected(cfg, "call_protected"))),
        );

        for version in MAG_VERSIONS {
            let config = MagConfig {
                version,
                hurdle_rate: None,
                incentive_fee_split: dec!(0.20),
                reinvestment_overlay_fee_name: "reinvestment_overlay".to_string(),
                flags: MagFlags::default(),
                excess_spread_capture_rate: dec!(0.05),
            };
            registry.register(mag_name(version), Box::new(move |wf| mag::build(wf, &config)));
        }

        registry
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
