//! Entry/exit state machine on OI derivatives.
//!
//! States: `Flat` and `Open(side)`, cyclic, initial `Flat`.
//!
//! - `Flat → Open(side)` when the window is filled, the first derivative is
//!   negative and the second derivative is strictly below
//!   `-sensitivity × basis`. The side comes from a [`SidePolicy`]; an
//!   ambiguous decision keeps the machine flat.
//! - `Open(side) → Flat` when the first derivative is above
//!   `-exit_loose_threshold × basis` **or** the second derivative is above
//!   `-sensitivity × basis`. Either condition alone exits.
//!
//! The machine only emits intents; sizing, gating and orders belong to the
//! risk manager and the strategy loop.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::{ThresholdBasis, ValidatedConfig};
use crate::domain::{ExitReason, OptionSide, PositionState};
use crate::indicators::DerivativeState;

use super::side::{SideContext, SideDecision, SidePolicy};

/// Threshold fractions and the basis they scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    /// Entry fraction; also the second-derivative exit fraction.
    pub entry: f64,
    pub exit_loose: f64,
    pub basis: ThresholdBasis,
    pub feeling: f64,
}

impl SignalThresholds {
    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self {
            entry: config.sensitivity,
            exit_loose: config.exit_loose_threshold,
            basis: config.threshold_basis,
            feeling: config.feeling,
        }
    }

    fn basis_value(&self, oi_moving_average: f64) -> f64 {
        match self.basis {
            ThresholdBasis::MovingAverage => oi_moving_average.abs(),
            ThresholdBasis::Feeling => self.feeling,
        }
    }

    /// Negative bound the second derivative must cross to enter.
    pub fn entry_bound(&self, oi_moving_average: f64) -> f64 {
        -self.entry * self.basis_value(oi_moving_average)
    }

    /// Negative bound above which the first derivative forces an exit.
    pub fn exit_loose_bound(&self, oi_moving_average: f64) -> f64 {
        -self.exit_loose * self.basis_value(oi_moving_average)
    }

    /// Accelerating OI decline: `d1 < 0` and `d2` strictly below the entry bound.
    pub fn is_accelerating_decline(&self, state: &DerivativeState) -> bool {
        match state.ready() {
            Some((ma, d1, d2)) => d1 < 0.0 && d2 < self.entry_bound(ma),
            None => false,
        }
    }

    /// Exit reason if either exit condition holds. The first-derivative
    /// condition is reported when both hold.
    pub fn exit_reason(&self, state: &DerivativeState) -> Option<ExitReason> {
        let (ma, d1, d2) = state.ready()?;
        if d1 > self.exit_loose_bound(ma) {
            Some(ExitReason::FirstDerivativeSlowing)
        } else if d2 > self.entry_bound(ma) {
            Some(ExitReason::SecondDerivativeReversing)
        } else {
            None
        }
    }
}

/// Machine state, projected from the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    Flat,
    Open(OptionSide),
}

impl From<&PositionState> for SignalState {
    fn from(position: &PositionState) -> Self {
        match position.side() {
            Some(side) => Self::Open(side),
            None => Self::Flat,
        }
    }
}

/// Request to open a position, consumed by the risk manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryIntent {
    pub side: OptionSide,
    pub timestamp: NaiveDateTime,
    pub oi_moving_average: f64,
    pub first_derivative: f64,
    pub second_derivative: f64,
    pub entry_bound: f64,
}

/// Request to close the open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitIntent {
    pub side: OptionSide,
    pub timestamp: NaiveDateTime,
    pub reason: ExitReason,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Stay,
    Enter(EntryIntent),
    Exit(ExitIntent),
    /// Entry conditions held but the side policy could not pick a leg.
    AmbiguousSide { timestamp: NaiveDateTime },
}

#[derive(Debug, Clone)]
pub struct SignalMachine {
    thresholds: SignalThresholds,
}

impl SignalMachine {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self::new(SignalThresholds::from_config(config))
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    /// Evaluate the transition for one freshly refreshed derivative state.
    pub fn evaluate(
        &self,
        state: SignalState,
        derivatives: &DerivativeState,
        side_policy: &dyn SidePolicy,
        companion: Option<&DerivativeState>,
        hint: Option<OptionSide>,
    ) -> Transition {
        match state {
            SignalState::Flat => {
                // Warm-up: nothing fires until the window is filled.
                let Some((ma, d1, d2)) = derivatives.ready() else {
                    return Transition::Stay;
                };
                if !self.thresholds.is_accelerating_decline(derivatives) {
                    return Transition::Stay;
                }
                let ctx = SideContext {
                    traded: derivatives,
                    companion,
                    hint,
                    thresholds: &self.thresholds,
                };
                match side_policy.select(&ctx) {
                    SideDecision::Side(side) => Transition::Enter(EntryIntent {
                        side,
                        timestamp: derivatives.timestamp,
                        oi_moving_average: ma,
                        first_derivative: d1,
                        second_derivative: d2,
                        entry_bound: self.thresholds.entry_bound(ma),
                    }),
                    SideDecision::Ambiguous => Transition::AmbiguousSide {
                        timestamp: derivatives.timestamp,
                    },
                }
            }
            SignalState::Open(side) => match self.thresholds.exit_reason(derivatives) {
                Some(reason) => Transition::Exit(ExitIntent {
                    side,
                    timestamp: derivatives.timestamp,
                    reason,
                }),
                None => Transition::Stay,
            },
        }
    }
}
