//! External reference-data collaborators (§6 External Interfaces).
//!
//! Threshold persistence, correlation/transition-matrix storage, and
//! scenario-parameter tables are ordinary CRUD behind narrow trait
//! boundaries — the engine never contains a database client. The crate
//! ships only `InMemory*` implementations, the same role the teacher's
//! `ThresholdStore`-shaped traits in `credit::covenants` play for tests
//! and the CLI; a real deployment supplies its own.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::compliance::threshold::{ThresholdHistory, ThresholdRecord};
use crate::compliance::TestId;
use crate::types::Rating;
use crate::EngineResult;

/// Read access to every test's threshold history for one deal (§6
/// "Threshold store"). The engine resolves the effective value through
/// [`ThresholdHistory::effective_as_of`]; this trait only supplies the
/// raw history by `(deal_id, test_id)`.
pub trait ThresholdStore {
    fn history(&self, deal_id: &str, test_id: TestId) -> Option<&ThresholdHistory>;

    fn test_ids(&self, deal_id: &str) -> Vec<TestId>;

    /// The effective threshold set for every test with recorded history,
    /// resolved at `analysis_date` — "by `(deal_id, analysis_date)`
    /// returns the effective threshold set and the raw history."
    fn effective_set(
        &self,
        deal_id: &str,
        analysis_date: NaiveDate,
        mag_version: Option<&str>,
    ) -> EngineResult<HashMap<TestId, ThresholdRecord>> {
        let mut out = HashMap::new();
        for test_id in self.test_ids(deal_id) {
            if let Some(history) = self.history(deal_id, test_id) {
                let record = history.effective_as_of(analysis_date, mag_version)?;
                out.insert(test_id, record.clone());
            }
        }
        Ok(out)
    }
}

/// In-memory `ThresholdStore`, keyed by deal then test id. What the CLI
/// and integration tests populate directly from a deal-configuration
/// file instead of a database round-trip.
#[derive(Debug, Clone, Default)]
pub struct InMemoryThresholdStore {
    deals: HashMap<String, HashMap<TestId, ThresholdHistory>>,
}

impl InMemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deal_id: impl Into<String>, test_id: TestId, history: ThresholdHistory) {
        self.deals.entry(deal_id.into()).or_default().insert(test_id, history);
    }

    /// Expose the per-deal table keyed by test id directly, as the deal
    /// engine wants for `compliance::evaluate_all`.
    pub fn histories_for(&self, deal_id: &str) -> HashMap<TestId, ThresholdHistory> {
        self.deals.get(deal_id).cloned().unwrap_or_default()
    }
}

impl ThresholdStore for InMemoryThresholdStore {
    fn history(&self, deal_id: &str, test_id: TestId) -> Option<&ThresholdHistory> {
        self.deals.get(deal_id)?.get(&test_id)
    }

    fn test_ids(&self, deal_id: &str) -> Vec<TestId> {
        self.deals
            .get(deal_id)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }
}

/// What kind of pairwise correlation an entry represents (§6 reference
/// data: "correlation matrix `{(asset_id_i, asset_id_j, value, type)}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationType {
    AssetAsset,
    IndustryIndustry,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub asset_id_i: String,
    pub asset_id_j: String,
    pub value: Decimal,
    pub correlation_type: CorrelationType,
}

/// One row of the scenario input file (§6), kept in its original
/// (scenario_name, section, parameter) shape plus the row/column fields
/// the loader must preserve ordering through rather than resolving into
/// a typed config itself — that mapping is the caller's concern per
/// Design Notes §9 ("scenario table → typed config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioParameter {
    pub scenario_name: String,
    pub scenario_type: String,
    pub section_name: String,
    pub parameter_name: String,
    pub parameter_value: String,
    pub parameter_type: String,
    pub row: u32,
    pub column: u32,
}

/// Read access to deal-independent reference data (§6 "Reference data"):
/// the asset correlation matrix, the rating lookup tables the matrix
/// engine and asset model otherwise hard-code defaults for, and the
/// scenario-parameter table.
pub trait ReferenceDataStore {
    fn correlations(&self) -> &[CorrelationEntry];
    fn recovery_table(&self) -> &HashMap<Rating, Decimal>;
    fn factor_table(&self) -> &HashMap<Rating, Decimal>;

    /// Scenario rows for one named scenario, in original (row, column)
    /// order — callers resolve these into typed config, the store never
    /// does (§9 Design Notes).
    fn scenario_parameters(&self, scenario_name: &str) -> Vec<&ScenarioParameter>;
}

/// In-memory `ReferenceDataStore`. Recovery/factor tables default to
/// `Rating::recovery_rate()`/`Rating::factor()`'s built-in lookups so a
/// caller only needs to populate it when overriding those defaults.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceDataStore {
    correlations: Vec<CorrelationEntry>,
    recovery_table: HashMap<Rating, Decimal>,
    factor_table: HashMap<Rating, Decimal>,
    scenarios: Vec<ScenarioParameter>,
}

impl InMemoryReferenceDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation(mut self, entry: CorrelationEntry) -> Self {
        self.correlations.push(entry);
        self
    }

    pub fn with_scenario_parameter(mut self, parameter: ScenarioParameter) -> Self {
        self.scenarios.push(parameter);
        self
    }

    pub fn with_recovery_override(mut self, rating: Rating, recovery: Decimal) -> Self {
        self.recovery_table.insert(rating, recovery);
        self
    }

    pub fn with_factor_override(mut self, rating: Rating, factor: Decimal) -> Self {
        self.factor_table.insert(rating, factor);
        self
    }
}

impl ReferenceDataStore for InMemoryReferenceDataStore {
    fn correlations(&self) -> &[CorrelationEntry] {
        &self.correlations
    }

    fn recovery_table(&self) -> &HashMap<Rating, Decimal> {
        &self.recovery_table
    }

    fn factor_table(&self) -> &HashMap<Rating, Decimal> {
        &self.factor_table
    }

    fn scenario_parameters(&self, scenario_name: &str) -> Vec<&ScenarioParameter> {
        let mut rows: Vec<&ScenarioParameter> = self
            .scenarios
            .iter()
            .filter(|p| p.scenario_name == scenario_name)
            .collect();
        rows.sort_by_key(|p| (p.row, p.column));
        rows
    }
}
