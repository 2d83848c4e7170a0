use rust_decimal::Decimal;
use thiserror::Error;

/// Errors the engine surfaces, per the error-kind taxonomy in the design:
/// validation errors are raised at load, numeric warnings are collected and
/// never thrown mid-computation, invariant breaches halt immediately.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {field} — {reason}")]
    BadInput { field: String, reason: String },

    #[error("Financial impossibility: {0}")]
    FinancialImpossibility(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("{function} failed to converge after {iterations} iterations (last delta: {last_delta})")]
    NonConvergent {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Invariant breach in period {period}, component {component}: {detail}")]
    InvariantBreach {
        period: u32,
        component: String,
        detail: String,
    },

    #[error("Waterfall step '{step}' in strategy '{strategy}' has no registered formula or destination")]
    UndefinedStep { strategy: String, step: String },

    #[error("Run cancelled after period {last_completed_period}")]
    Cancelled { last_completed_period: u32 },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::SerializationError(e.to_string())
    }
}

/// A non-fatal numeric warning recorded during computation (e.g. an XIRR
/// that did not converge for a single asset or tranche). Collected on
/// `DealResult`, never thrown mid-computation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineWarning {
    pub period: Option<u32>,
    pub component: String,
    pub message: String,
}

pub type EngineResult<T> = Result<T, EngineError>;
