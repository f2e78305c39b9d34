use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lot/tick metadata for the traded option contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub tick_size: f64,
    /// Exchange lot size; every order is a whole number of lots.
    pub lot_size: u64,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, tick_size: f64, lot_size: u64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            lot_size,
        }
    }

    /// Round a raw contract quantity down to whole lots.
    ///
    /// Rounding down never sizes beyond the capital allocation. Returns 0 when
    /// the quantity is smaller than a single lot.
    pub fn round_down_to_lots(&self, quantity: f64) -> u64 {
        if !quantity.is_finite() || quantity <= 0.0 || self.lot_size == 0 {
            return 0;
        }
        let lots = (quantity / self.lot_size as f64).floor() as u64;
        lots * self.lot_size
    }

    /// Round a price to the nearest tick.
    pub fn round_price(&self, price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        (price / self.tick_size).round() * self.tick_size
    }

    /// Validate quantity respects lot size.
    pub fn validate_quantity(&self, quantity: u64) -> Result<u64, InstrumentError> {
        if self.lot_size == 0 || quantity % self.lot_size != 0 {
            return Err(InstrumentError::InvalidLotSize {
                quantity,
                lot_size: self.lot_size,
            });
        }
        Ok(quantity)
    }
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("Quantity {quantity} does not respect lot_size {lot_size}")]
    InvalidLotSize { quantity: u64, lot_size: u64 },
}
