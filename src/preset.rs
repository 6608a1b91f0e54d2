//! Named charge presets and matching against the live setpoint.

use crate::curve;

/// Tolerances for reconciling the live setpoint against the catalog.
pub(crate) const SOC_TOLERANCE_PCT: f32 = 1.0;
pub(crate) const CURRENT_TOLERANCE_A: f32 = 0.3;

/// Target charge current of a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurrentTarget {
    Amps(f32),
    /// Whatever the selected pack can take. Stays symbolic until the preset
    /// is sent, when it resolves to the model's maximum current.
    Unlimited,
}

/// A named (target SOC, target current) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub target_soc_pct: f32,
    pub target_current: CurrentTarget,
}

impl Preset {
    pub fn new(name: &str, target_soc_pct: f32, target_current: CurrentTarget) -> Self {
        Self {
            name: name.into(),
            target_soc_pct,
            target_current,
        }
    }

    /// An all-zero preset switches the output off instead of commanding a
    /// target.
    pub fn is_off(&self) -> bool {
        self.target_soc_pct == 0.0
            || matches!(self.target_current, CurrentTarget::Amps(a) if a == 0.0)
    }

    /// Whether this preset holds a real charge target.
    pub fn is_set(&self) -> bool {
        !self.is_off()
    }

    /// The pack voltage this preset's SOC target resolves to.
    pub fn target_voltage(&self, series_cells: u32) -> f32 {
        curve::voltage_from_soc(self.target_soc_pct) * series_cells as f32
    }

    /// The concrete current this preset resolves to.
    pub fn resolve_current(&self, max_current_a: f32) -> f32 {
        match self.target_current {
            CurrentTarget::Amps(amps) => amps,
            CurrentTarget::Unlimited => max_current_a,
        }
    }

    /// Whether the live setpoint is within tolerance of this preset.
    /// An `Unlimited` target is symbolic and never matches a finite current.
    pub(crate) fn matches(&self, setpoint_soc_pct: f32, setpoint_current_a: f32) -> bool {
        let CurrentTarget::Amps(amps) = self.target_current else {
            return false;
        };
        (self.target_soc_pct - setpoint_soc_pct).abs() < SOC_TOLERANCE_PCT
            && (amps - setpoint_current_a).abs() < CURRENT_TOLERANCE_A
    }

    /// A "Casual 5A 90% 145.4V" style label.
    pub fn describe(&self, series_cells: u32, max_current_a: f32) -> String {
        if self.is_off() {
            return self.name.clone();
        }
        format!(
            "{} {:.0}A {:.0}% {:.1}V",
            self.name,
            self.resolve_current(max_current_a),
            self.target_soc_pct,
            self.target_voltage(series_cells)
        )
    }
}

/// Which preset the live setpoint currently corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePreset {
    /// Index into the catalog.
    Catalog(usize),
    /// No catalog entry matched; the mutable user preset holds the live
    /// values.
    User,
}

/// The built-in catalog. Declaration order is the match tie-break.
pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset::new("Off", 0.0, CurrentTarget::Amps(0.0)),
        Preset::new("Max", 100.0, CurrentTarget::Unlimited),
        Preset::new("Casual", 90.0, CurrentTarget::Amps(5.0)),
        Preset::new("Storage", 60.0, CurrentTarget::Amps(3.0)),
    ]
}
