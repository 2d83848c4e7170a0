use clap::Args;
use serde_json::Value;

use clo_engine_core::engine::{self, DealConfig};

use crate::input;

#[derive(Args)]
pub struct RunDealArgs {
    /// Path to a deal configuration JSON file; reads stdin if omitted.
    #[arg(long)]
    pub input: Option<String>,

    /// Print the full period journal rather than just the summary.
    #[arg(long)]
    pub journal: bool,
}

pub fn run_deal(args: RunDealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config: DealConfig = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <deal.json> or stdin required".into());
    };

    let result = engine::run_deal(config)?;

    if args.journal {
        Ok(serde_json::to_value(&result)?)
    } else {
        Ok(serde_json::json!({
            "tranche_summary": result.tranche_summary,
            "equity_irr": result.equity_irr,
            "realized_losses": result.realized_losses,
            "warnings": result.warnings,
            "cancelled_at_period": result.cancelled_at_period,
            "periods_run": result.journal.len(),
            "final_compliance": result.final_compliance,
        }))
    }
}
