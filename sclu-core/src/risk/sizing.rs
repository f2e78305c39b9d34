//! Position sizing — capital fraction converted to whole lots.
//!
//! The sizer is signal-agnostic: it never looks at derivatives or the side,
//! only at the entry price.

use crate::domain::Instrument;

use super::RiskRejection;

/// Commit a fixed fraction of portfolio capital per entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalFractionSizer {
    pub portfolio_capital: f64,
    pub position_size_pct: f64,
    pub instrument: Instrument,
}

impl CapitalFractionSizer {
    /// `floor(capital × pct / price)` contracts, rounded down to whole lots.
    ///
    /// A result of zero contracts is a [`RiskRejection::SizingError`].
    pub fn size(&self, entry_price: f64) -> Result<u64, RiskRejection> {
        let reject = || RiskRejection::SizingError {
            entry_price,
            allocation: self.portfolio_capital * self.position_size_pct,
            lot_size: self.instrument.lot_size,
        };
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(reject());
        }
        let contracts = (self.portfolio_capital * self.position_size_pct / entry_price).floor();
        match self.instrument.round_down_to_lots(contracts) {
            0 => Err(reject()),
            size => Ok(size),
        }
    }
}
