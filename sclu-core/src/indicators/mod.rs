//! OI indicator implementations.
//!
//! Only the open-interest derivative engine lives here; price indicators are
//! deliberately absent. Derivatives are computed incrementally, one closed bar
//! at a time, so the same code serves backtest replay and live sessions.

pub mod oi_derivative;

pub use oi_derivative::{
    advance, compute_series, DataGapError, DerivativeParams, DerivativeState, OiDerivativeEngine,
    OiHistory,
};

/// Create synthetic 3-minute bars from OI values for testing.
///
/// Prices are flat at 100.0 so only OI moves; timestamps start at 09:15.
#[cfg(test)]
pub fn make_oi_bars(ois: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let start = chrono::NaiveDate::from_ymd_opt(2024, 7, 3)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    ois.iter()
        .enumerate()
        .map(|(i, &oi)| {
            Bar::new(
                start + chrono::Duration::minutes(3 * i as i64),
                100.0,
                101.0,
                99.0,
                100.0,
                1000,
                oi,
            )
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;
