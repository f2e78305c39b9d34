//! Artifact export — JSON results, CSV trade tape and derivative trajectory.
//!
//! Persisted results carry a `schema_version`; newer versions are rejected
//! on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use sclu_core::domain::TradeRecord;
use sclu_core::indicators::DerivativeState;

use crate::backtest::{BacktestResult, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: side, entry_timestamp, entry_price, exit_timestamp, exit_price,
/// size, pnl, return_pct, exit_reason
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_timestamp",
        "entry_price",
        "exit_timestamp",
        "exit_price",
        "size",
        "pnl",
        "return_pct",
        "exit_reason",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.side.to_string(),
            &t.entry_timestamp.to_string(),
            &format!("{:.2}", t.entry_price),
            &t.exit_timestamp.to_string(),
            &format!("{:.2}", t.exit_price),
            &t.size.to_string(),
            &format!("{:.2}", t.pnl),
            &format!("{:.6}", t.return_pct()),
            &t.exit_reason.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: timestamp, open_interest, oi_moving_average, first_derivative,
/// second_derivative. Undefined values are empty cells.
pub fn export_trajectory_csv(trajectory: &[DerivativeState]) -> Result<String> {
    let cell = |v: Option<f64>| v.map(|x| format!("{x:.4}")).unwrap_or_default();
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "open_interest",
        "oi_moving_average",
        "first_derivative",
        "second_derivative",
    ])?;
    for d in trajectory {
        wtr.write_record([
            d.timestamp.to_string(),
            format!("{:.0}", d.open_interest),
            cell(d.oi_moving_average),
            cell(d.first_derivative),
            cell(d.second_derivative),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `result.json`, `trades.csv` and `trajectory.csv` into
/// `{output_dir}/{symbol}_{run_id prefix}/`. Returns the directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.run_id.chars().take(12).collect();
    let dir = output_dir.join(format!("{}_{}", result.symbol, short_id));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let writes = [
        ("result.json", export_json(result)?),
        ("trades.csv", export_trades_csv(&result.trades)?),
        ("trajectory.csv", export_trajectory_csv(&result.trajectory)?),
    ];
    for (name, content) in writes {
        let path = dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sclu_core::domain::{ExitReason, OptionSide};

    #[test]
    fn trades_csv_has_header_and_rows() {
        let ts = NaiveDate::from_ymd_opt(2024, 7, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let trade = TradeRecord {
            side: OptionSide::Put,
            entry_timestamp: ts,
            entry_price: 80.0,
            exit_timestamp: ts,
            exit_price: 88.0,
            size: 50,
            pnl: 400.0,
            exit_reason: ExitReason::TakeProfit,
        };
        let csv = export_trades_csv(&[trade]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("side,entry_timestamp"));
        assert!(lines[1].starts_with("PE,"));
        assert!(lines[1].ends_with(",take_profit"));
    }

    #[test]
    fn trajectory_leaves_undefined_cells_empty() {
        let d = DerivativeState {
            timestamp: NaiveDate::from_ymd_opt(2024, 7, 3)
                .unwrap()
                .and_hms_opt(9, 15, 0)
                .unwrap(),
            open_interest: 1_000_000.0,
            oi_moving_average: None,
            first_derivative: None,
            second_derivative: None,
            window_filled: false,
        };
        let csv = export_trajectory_csv(&[d]).unwrap();
        assert_eq!(csv.lines().nth(1), Some("2024-07-03 09:15:00,1000000,,,"));
    }
}
