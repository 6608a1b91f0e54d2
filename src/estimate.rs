//! Pure battery state-estimation math.
//!
//! Everything here is a function of its arguments only. Where a required
//! input is missing or a denominator is zero the result is `None`, never a
//! stand-in number, so callers can tell "unknown" from "zero".

use crate::curve;
use crate::model::CELL_FLOOR_V;

/// Pack resistance assumed when no model is selected. Deliberately on the
/// high side so rest-voltage compensation under-promises.
pub const FALLBACK_PACK_RESISTANCE_OHMS: f32 = 0.2;

/// Setpoint currents below this make the asymptote prediction unreliable.
const ASYMPTOTE_MIN_CURRENT_A: f32 = 0.1;

/// Terminal voltage with the IR drop from the charge current subtracted,
/// approximating the pack's open-circuit voltage.
pub fn rest_voltage(dc_voltage: f32, dc_current: f32, pack_resistance_ohms: f32) -> f32 {
    dc_voltage - dc_current * pack_resistance_ohms
}

/// State of charge for a whole-pack voltage.
pub fn soc_from_pack_voltage(pack_voltage: f32, series_cells: u32) -> f32 {
    curve::soc_from_voltage(pack_voltage / series_cells as f32)
}

/// Nominal capacity in amp-hours, using the curve's 50% voltage as the
/// nominal per-cell voltage for the conversion.
pub fn capacity_amp_hours(capacity_wh: f32, series_cells: u32) -> f32 {
    capacity_wh / curve::voltage_from_soc(50.0) / series_cells as f32
}

/// Seconds to charge from `soc_pct` to `target_soc_pct` at the present
/// output power, or `None` when no power is flowing.
///
/// Approximates energy delivered as power times time at the instantaneous
/// power; the charge curve's nonlinearity near full is deliberately ignored.
pub fn time_to_target_secs(
    target_soc_pct: f32,
    soc_pct: f32,
    capacity_wh: f32,
    power_w: f32,
) -> Option<f32> {
    if power_w <= 0.0 {
        return None;
    }
    let secs = (target_soc_pct - soc_pct) / 100.0 * capacity_wh / power_w * 3600.0;
    Some(secs.max(0.0))
}

/// State of charge the pack will settle toward under the given setpoint.
///
/// Withheld below 3.0 V/cell or 0.1 A, where the prediction is unreliable.
pub fn asymptote_soc(
    setpoint_voltage: f32,
    setpoint_current: f32,
    series_cells: u32,
    pack_resistance_ohms: f32,
) -> Option<f32> {
    if setpoint_voltage < CELL_FLOOR_V * series_cells as f32
        || setpoint_current < ASYMPTOTE_MIN_CURRENT_A
    {
        return None;
    }
    let settled = setpoint_voltage - setpoint_current * pack_resistance_ohms;
    Some(curve::soc_from_voltage(settled / series_cells as f32))
}

/// Render a time estimate the way a human reads one: minutes under an hour,
/// tenths of hours above.
pub fn format_duration(seconds: f32) -> String {
    if seconds.is_infinite() || seconds.is_nan() {
        return "∞".into();
    }
    if seconds < 3600.0 {
        format!("{:.0}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_voltage_compensates_ir_drop() {
        let rest = rest_voltage(151.2, 2.0, 0.198);
        assert!((rest - 150.804).abs() < 1e-3);
        let per_cell = rest / 36.0;
        assert!((per_cell - 4.189).abs() < 1e-3);
        // Interpolated between the 4.15/99 and 4.20/100 anchors.
        let soc = curve::soc_from_voltage(per_cell);
        assert!((soc - 99.78).abs() < 0.05, "{soc}");
    }

    #[test]
    fn time_estimate_needs_power() {
        assert_eq!(time_to_target_secs(90.0, 50.0, 2600.0, 0.0), None);
        assert_eq!(time_to_target_secs(90.0, 50.0, 2600.0, -5.0), None);
    }

    #[test]
    fn time_estimate_is_non_negative() {
        // Already past the target.
        assert_eq!(time_to_target_secs(50.0, 90.0, 2600.0, 300.0), Some(0.0));
        let secs = time_to_target_secs(90.0, 50.0, 2600.0, 300.0).unwrap();
        // 0.4 * 2600 Wh at 300 W.
        assert!((secs - 12480.0).abs() < 1.0);
    }

    #[test]
    fn capacity_uses_the_midpoint_voltage() {
        let ah = capacity_amp_hours(2600.0, 36);
        assert!((ah - 2600.0 / 3.70 / 36.0).abs() < 1e-3);
    }

    #[test]
    fn asymptote_withheld_below_thresholds() {
        assert_eq!(asymptote_soc(100.0, 5.0, 36, 0.198), None);
        assert_eq!(asymptote_soc(151.2, 0.05, 36, 0.198), None);
        let soc = asymptote_soc(151.2, 5.0, 36, 0.198).unwrap();
        assert!((0.0..=100.0).contains(&soc));
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(1800.0), "30m");
        assert_eq!(format_duration(5400.0), "1.5h");
        assert_eq!(format_duration(f32::INFINITY), "∞");
    }
}
