//! Waterfall strategies: the family of payment-priority state machines
//! that decide, each period, how available cash moves from collections
//! to fees, tranche interest/principal, reserves, reinvestment, and
//! equity.
//!
//! `Strategy` is a `(sequence, triggers, amounts)` triple, executed by
//! one shared harness ([`engine::run_step_sequence`]) instead of one
//! function per waterfall shape.

pub mod engine;
pub mod formula;
pub mod mag;
pub mod registry;
pub mod strategies;

use serde::{Deserialize, Serialize};

use crate::accounts::AccountName;
use crate::compliance::TestId;

/// Where a step's amount, once determined, is transferred to. Every
/// variant ultimately bottoms out in one [`crate::accounts::AccountSet::transfer`]
/// call — the one verb strategies use to mutate engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepDestination {
    TrancheInterest(String),
    TranchePrincipal(String),
    Fee(String),
    Account(AccountName),
    /// Equity claw-back escrow: held back pending a performance hurdle.
    Escrow,
    Equity,
    ReinvestmentBudget,
}

/// A boolean condition gating whether a step fires this period. Evaluated
/// against compliance results and deal-level flags the orchestrator
/// precomputed for the period — a strategy never recomputes a test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Trigger {
    Always,
    AllTestsPass,
    TestPasses(TestId),
    TestFails(TestId),
    FlagSet(String),
    FlagUnset(String),
    And(Box<Trigger>, Box<Trigger>),
    Or(Box<Trigger>, Box<Trigger>),
    Not(Box<Trigger>),
}

/// One step in a waterfall's totally-ordered sequence. Steps sharing the
/// same `priority` form an equi-priority cohort paid pro-rata by due
/// amount when available cash is insufficient to cover the cohort in
/// full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub name: String,
    pub priority: u32,
    pub source: AccountName,
    pub destination: StepDestination,
    pub trigger: Trigger,
    pub formula: formula::Formula,
}

/// The outcome of one step's evaluation in one period, written to the
/// period journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_name: String,
    pub triggered: bool,
    pub amount_due: rust_decimal::Decimal,
    pub amount_paid: rust_decimal::Decimal,
    pub remaining_cash: rust_decimal::Decimal,
}

/// A waterfall strategy: the `(sequence, triggers, amounts)` triple.
/// Implementors only need to supply the step sequence; execution is
/// handled uniformly by [`engine::run_step_sequence`].
pub trait Strategy {
    fn name(&self) -> &str;
    fn steps(&self) -> &[WaterfallStep];
}

/// A strategy built purely from its step sequence — what every concrete
/// strategy in [`strategies`] and [`mag`] ultimately constructs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSequenceStrategy {
    pub name: String,
    pub steps: Vec<WaterfallStep>,
}

impl Strategy for StepSequenceStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn steps(&self) -> &[WaterfallStep] {
        &self.steps
    }
}
