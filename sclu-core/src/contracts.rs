//! Contract selection — which strikes and expiries the strategy trades.
//!
//! Forced exits push hardest on the outer strikes, so selection starts at the
//! ATM strike and walks out of the money: upward for short covering (calls),
//! downward for long unwinding (puts). Near expiries are preferred, but never
//! the expiry day itself.
//!
//! This is library API for callers that resolve an option chain. The
//! backtest and live runners replay a single, already chosen contract's bars
//! and do not call into it; `min_dte`/`max_dte` reach it through
//! [`DteWindow::from_config`].

use chrono::NaiveDate;

use crate::config::ValidatedConfig;
use crate::domain::RallyKind;

/// ATM strike plus up to `max_strikes - 1` OTM strikes for `rally`.
///
/// `strikes` may be unsorted and contain duplicates. The ATM strike is the
/// one nearest `spot`; on a tie the lower strike wins.
pub fn select_strikes(spot: f64, strikes: &[f64], rally: RallyKind, max_strikes: usize) -> Vec<f64> {
    let mut ladder: Vec<f64> = strikes.iter().copied().filter(|s| s.is_finite()).collect();
    ladder.sort_by(f64::total_cmp);
    ladder.dedup();
    if ladder.is_empty() || max_strikes == 0 || !spot.is_finite() {
        return Vec::new();
    }

    let mut atm = 0;
    for (i, strike) in ladder.iter().enumerate() {
        if (strike - spot).abs() < (ladder[atm] - spot).abs() {
            atm = i;
        }
    }

    match rally {
        RallyKind::ShortCovering => ladder[atm..].iter().take(max_strikes).copied().collect(),
        RallyKind::LongUnwinding => ladder[..=atm].iter().rev().take(max_strikes).copied().collect(),
    }
}

/// Whole calendar days from `today` until `expiry`. Negative once expired.
pub fn days_to_expiry(expiry: NaiveDate, today: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

pub fn is_suitable_dte(dte: i64, min_dte: i64, max_dte: i64) -> bool {
    (min_dte..=max_dte).contains(&dte)
}

/// Configured DTE window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DteWindow {
    pub min: i64,
    pub max: i64,
}

impl DteWindow {
    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self {
            min: config.min_dte,
            max: config.max_dte,
        }
    }

    pub fn accepts(&self, expiry: NaiveDate, today: NaiveDate) -> bool {
        is_suitable_dte(days_to_expiry(expiry, today), self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;

    const LADDER: [f64; 7] = [23_700.0, 23_750.0, 23_800.0, 23_850.0, 23_900.0, 23_950.0, 24_000.0];

    #[test]
    fn short_covering_walks_up_from_atm() {
        let picked = select_strikes(23_812.0, &LADDER, RallyKind::ShortCovering, 3);
        assert_eq!(picked, vec![23_800.0, 23_850.0, 23_900.0]);
    }

    #[test]
    fn long_unwinding_walks_down_from_atm() {
        let picked = select_strikes(23_812.0, &LADDER, RallyKind::LongUnwinding, 3);
        assert_eq!(picked, vec![23_800.0, 23_750.0, 23_700.0]);
    }

    #[test]
    fn ladder_edge_truncates() {
        let picked = select_strikes(23_990.0, &LADDER, RallyKind::ShortCovering, 3);
        assert_eq!(picked, vec![24_000.0]);
        let picked = select_strikes(23_600.0, &LADDER, RallyKind::LongUnwinding, 3);
        assert_eq!(picked, vec![23_700.0]);
    }

    #[test]
    fn unsorted_input_and_ties() {
        let strikes = [23_900.0, 23_800.0, 23_850.0, 23_800.0];
        // 23825 is equidistant from 23800 and 23850: lower wins.
        let picked = select_strikes(23_825.0, &strikes, RallyKind::ShortCovering, 2);
        assert_eq!(picked, vec![23_800.0, 23_850.0]);
        assert!(select_strikes(23_825.0, &[], RallyKind::ShortCovering, 2).is_empty());
    }

    #[test]
    fn dte_window_excludes_expiry_day() {
        let cfg = StrategyConfig::default().validate().unwrap();
        let window = DteWindow::from_config(&cfg);
        let today = NaiveDate::from_ymd_opt(2024, 7, 8).unwrap();
        let thursday = NaiveDate::from_ymd_opt(2024, 7, 11).unwrap();
        assert_eq!(days_to_expiry(thursday, today), 3);
        assert!(window.accepts(thursday, today));
        assert!(!window.accepts(today, today));
        assert!(!window.accepts(NaiveDate::from_ymd_opt(2024, 7, 18).unwrap(), today));
        assert!(is_suitable_dte(4, 1, 4));
        assert!(!is_suitable_dte(5, 1, 4));
    }
}
