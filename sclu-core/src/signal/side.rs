//! Side selection — which option leg an entry buys.
//!
//! The choice between a short-covering call and a long-unwinding put is a
//! pluggable policy. Policies see the traded leg's derivatives, optionally a
//! companion leg's derivatives and an external hint; anything they cannot
//! resolve is [`SideDecision::Ambiguous`] and no position opens.

use crate::domain::OptionSide;
use crate::indicators::DerivativeState;

use super::state_machine::SignalThresholds;

/// Everything a side policy may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct SideContext<'a> {
    /// Derivatives of the leg whose bars drive the loop (and whose entry
    /// conditions just held).
    pub traded: &'a DerivativeState,
    /// Derivatives of the opposite leg on the same underlying, if fed.
    pub companion: Option<&'a DerivativeState>,
    /// Side supplied by an external detector alongside the bar.
    pub hint: Option<OptionSide>,
    pub thresholds: &'a SignalThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideDecision {
    Side(OptionSide),
    Ambiguous,
}

/// Pluggable side-selection rule.
pub trait SidePolicy: Send + Sync {
    /// Name for logs and run manifests.
    fn name(&self) -> &str;

    fn select(&self, ctx: &SideContext<'_>) -> SideDecision;
}

/// Always buy the same leg. Used when the feed is a single contract.
#[derive(Debug, Clone, Copy)]
pub struct FixedSide(pub OptionSide);

impl SidePolicy for FixedSide {
    fn name(&self) -> &str {
        match self.0 {
            OptionSide::Call => "fixed_call",
            OptionSide::Put => "fixed_put",
        }
    }

    fn select(&self, _ctx: &SideContext<'_>) -> SideDecision {
        SideDecision::Side(self.0)
    }
}

/// Take the side from the per-bar hint; no hint is ambiguous.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalHint;

impl SidePolicy for ExternalHint {
    fn name(&self) -> &str {
        "external_hint"
    }

    fn select(&self, ctx: &SideContext<'_>) -> SideDecision {
        match ctx.hint {
            Some(side) => SideDecision::Side(side),
            None => SideDecision::Ambiguous,
        }
    }
}

/// Compare the traded leg against its companion leg.
///
/// The traded leg is bought only when its OI is in accelerating decline and
/// the companion's is not. Both legs unwinding at once, or a companion that
/// has not warmed up yet, is ambiguous.
#[derive(Debug, Clone, Copy)]
pub struct CompanionLeg {
    pub traded_leg: OptionSide,
}

impl SidePolicy for CompanionLeg {
    fn name(&self) -> &str {
        "companion_leg"
    }

    fn select(&self, ctx: &SideContext<'_>) -> SideDecision {
        let Some(companion) = ctx.companion else {
            return SideDecision::Ambiguous;
        };
        if companion.ready().is_none() {
            return SideDecision::Ambiguous;
        }
        let traded_declining = ctx.thresholds.is_accelerating_decline(ctx.traded);
        let companion_declining = ctx.thresholds.is_accelerating_decline(companion);
        match (traded_declining, companion_declining) {
            (true, false) => SideDecision::Side(self.traded_leg),
            _ => SideDecision::Ambiguous,
        }
    }
}
