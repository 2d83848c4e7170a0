//! CLO cash-flow projection and waterfall engine.
//!
//! One module per concern, a shared `error`/`types` foundation, and a
//! single orchestrator (`engine`) that wires the others together period
//! by period.

pub mod error;
pub mod time_value;
pub mod types;

pub mod curve;
pub mod schedule;

#[cfg(feature = "credit_migration")]
pub mod matrix;

pub mod asset;
pub mod pool;

pub mod liability;
pub mod accounts;
pub mod fees;

pub mod compliance;
pub mod reference_data;

pub mod waterfall;
pub mod reinvestment;
pub mod incentive_fee;

pub mod engine;

pub use error::EngineError;
pub use error::{EngineResult, EngineWarning};
pub use types::*;
