use clap::Args;
use serde_json::Value;

use clo_engine_core::pool::filter;

#[derive(Args)]
pub struct FilterCheckArgs {
    /// Collateral-pool filter expression, e.g. `industry == "Healthcare" and not defaulted`.
    pub expression: String,
}

/// Parses a pool filter expression and re-serializes the AST, demonstrating
/// the reversibility law (parse -> to_string -> parse is a fixed point, up
/// to redundant parentheses) on an arbitrary expression from the caller.
pub fn run_filter_check(args: FilterCheckArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let parsed = filter::parse(&args.expression)?;
    let rendered = parsed.to_string();
    let reparsed = filter::parse(&rendered)?;

    Ok(serde_json::json!({
        "input": args.expression,
        "parsed": rendered,
        "round_trips": reparsed.to_string() == rendered,
    }))
}
