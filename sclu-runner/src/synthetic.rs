//! Seeded synthetic option bars with scripted OI unwinding episodes.
//!
//! Bars are 3 minutes apart inside a 09:15–15:30 session (125 bars a day),
//! weekdays only. OI drifts upward with noise; every `episode_every` bars it
//! falls off a cliff for a few bars while the option price rallies, which is
//! what a forced short-covering exit looks like from the bought leg.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sclu_core::domain::{Bar, OptionSide};
use sclu_core::engine::BarInput;

pub const BARS_PER_SESSION: usize = 125;

/// Per-bar OI change during an episode, as a fraction of current OI.
const EPISODE_PROFILE: [f64; 5] = [-0.004, -0.06, -0.065, 0.001, 0.002];

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticBars {
    pub seed: u64,
    pub start_date: NaiveDate,
    pub base_price: f64,
    pub base_oi: f64,
    /// Bars between the starts of two unwinding episodes.
    pub episode_every: usize,
}

impl Default for SyntheticBars {
    fn default() -> Self {
        Self {
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap_or(NaiveDate::MIN),
            base_price: 120.0,
            base_oi: 2_000_000.0,
            episode_every: 60,
        }
    }
}

impl SyntheticBars {
    /// Timestamp of the `index`-th bar.
    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        let open = NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN);
        let mut date = self.start_date;
        let mut days = index / BARS_PER_SESSION;
        while is_weekend(date) {
            date += Duration::days(1);
        }
        while days > 0 {
            date += Duration::days(1);
            if !is_weekend(date) {
                days -= 1;
            }
        }
        let slot = (index % BARS_PER_SESSION) as i64;
        date.and_time(open) + Duration::minutes(3 * slot)
    }

    /// Traded-leg bars only.
    pub fn generate(&self, n: usize) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut price = self.base_price;
        let mut oi = self.base_oi;
        (0..n)
            .map(|i| {
                let phase = i % self.episode_every.max(EPISODE_PROFILE.len() + 1);
                let episode_start = self.episode_every.max(EPISODE_PROFILE.len() + 1)
                    - EPISODE_PROFILE.len();
                let (oi_step, price_step) = if phase >= episode_start {
                    let k = phase - episode_start;
                    (EPISODE_PROFILE[k], if k < 3 { 0.02 } else { -0.005 })
                } else {
                    (rng.gen_range(0.0002..0.0012), rng.gen_range(-0.004..0.004))
                };
                oi = (oi * (1.0 + oi_step)).round().max(0.0);
                let open = price;
                price = (price * (1.0 + price_step)).max(0.05);
                let wiggle = rng.gen_range(0.0..0.5);
                Bar::new(
                    self.timestamp(i),
                    round_tick(open),
                    round_tick(open.max(price) + wiggle),
                    round_tick((open.min(price) - wiggle).max(0.05)),
                    round_tick(price),
                    rng.gen_range(1_000..20_000),
                    oi,
                )
            })
            .collect()
    }

    /// Traded-leg bars paired with a quiet companion leg and a side hint.
    pub fn generate_inputs(&self, n: usize, traded_leg: OptionSide) -> Vec<BarInput> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0x5c1u64);
        let mut companion_oi = self.base_oi * 0.8;
        self.generate(n)
            .into_iter()
            .map(|bar| {
                companion_oi = (companion_oi * (1.0 + rng.gen_range(0.0..0.001))).round();
                let companion = Bar::new(
                    bar.timestamp,
                    self.base_price,
                    self.base_price + 0.5,
                    self.base_price - 0.5,
                    self.base_price,
                    5_000,
                    companion_oi,
                );
                BarInput::from(bar)
                    .with_companion(companion)
                    .with_hint(traded_leg)
            })
            .collect()
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn round_tick(price: f64) -> f64 {
    (price / 0.05).round() * 0.05
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generation_is_reproducible() {
        let gen = SyntheticBars::default();
        assert_eq!(gen.generate(300), gen.generate(300));
        let other = SyntheticBars {
            seed: 7,
            ..SyntheticBars::default()
        };
        assert_ne!(gen.generate(300), other.generate(300));
    }

    #[test]
    fn timestamps_skip_weekends_and_stay_in_session() {
        let gen = SyntheticBars {
            // Friday
            start_date: NaiveDate::from_ymd_opt(2024, 7, 5).unwrap(),
            ..SyntheticBars::default()
        };
        let last_friday = gen.timestamp(BARS_PER_SESSION - 1);
        assert_eq!(last_friday.time(), NaiveTime::from_hms_opt(15, 27, 0).unwrap());
        let first_monday = gen.timestamp(BARS_PER_SESSION);
        assert_eq!(first_monday.date(), NaiveDate::from_ymd_opt(2024, 7, 8).unwrap());
        assert_eq!(first_monday.time(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
    }

    #[test]
    fn bars_are_sane_and_ordered() {
        let bars = SyntheticBars::default().generate(500);
        assert!(bars.iter().all(|b| b.is_sane()));
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn episodes_cut_open_interest() {
        let gen = SyntheticBars::default();
        let bars = gen.generate(gen.episode_every);
        let start = gen.episode_every - EPISODE_PROFILE.len();
        let before = bars[start].open_interest;
        let after = bars[start + 2].open_interest;
        assert!(after < before * 0.9);
    }
}
