use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;

use clo_engine_core::compliance::threshold::ThresholdHistory;

use crate::input;

#[derive(Args)]
pub struct ThresholdArgs {
    /// Path to a threshold history JSON file; reads stdin if omitted.
    #[arg(long)]
    pub input: Option<String>,

    /// Analysis date (YYYY-MM-DD) to resolve the effective threshold at.
    #[arg(long)]
    pub date: String,

    /// Optional Mag-version binding to prefer when resolving the record.
    #[arg(long)]
    pub mag_version: Option<String>,
}

pub fn run_threshold(args: ThresholdArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let history: ThresholdHistory = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <thresholds.json> or stdin required".into());
    };

    let as_of = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d")
        .map_err(|e| format!("invalid --date '{}': {}", args.date, e))?;

    let record = history.effective_as_of(as_of, args.mag_version.as_deref())?;
    Ok(serde_json::to_value(record)?)
}
