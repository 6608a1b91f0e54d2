//! Fixed per-cell charge curve with bidirectional interpolated lookup.

/// One anchor point of the charge curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub volts_per_cell: f32,
    pub soc_pct: f32,
}

const fn point(volts_per_cell: f32, soc_pct: f32) -> CurvePoint {
    CurvePoint {
        volts_per_cell,
        soc_pct,
    }
}

/// Anchor points, strictly descending in both coordinates, 100% down to 0%.
pub const CHARGE_CURVE: [CurvePoint; 14] = [
    point(4.20, 100.0),
    point(4.15, 99.0),
    point(4.07, 95.0),
    point(4.04, 90.0),
    point(3.99, 80.0),
    point(3.87, 70.0),
    point(3.79, 60.0),
    point(3.70, 50.0),
    point(3.61, 40.0),
    point(3.54, 30.0),
    point(3.44, 20.0),
    point(3.33, 10.0),
    point(3.15, 5.0),
    point(3.00, 0.0),
];

/// Per-cell voltage to state of charge, linearly interpolated between the
/// bracketing anchors.
///
/// Inputs outside the table clamp to the nearest end. The relationship is
/// highly non-linear out there, so no extrapolation is attempted.
pub fn soc_from_voltage(volts_per_cell: f32) -> f32 {
    let mut upper = CHARGE_CURVE[0];
    if volts_per_cell > upper.volts_per_cell {
        return upper.soc_pct;
    }
    for lower in &CHARGE_CURVE[1..] {
        if volts_per_cell > lower.volts_per_cell {
            let t = (volts_per_cell - lower.volts_per_cell)
                / (upper.volts_per_cell - lower.volts_per_cell);
            return lower.soc_pct + t * (upper.soc_pct - lower.soc_pct);
        }
        upper = *lower;
    }
    upper.soc_pct
}

/// State of charge to per-cell voltage, the inverse of [`soc_from_voltage`].
pub fn voltage_from_soc(soc_pct: f32) -> f32 {
    let mut upper = CHARGE_CURVE[0];
    if soc_pct >= upper.soc_pct {
        return upper.volts_per_cell;
    }
    for lower in &CHARGE_CURVE[1..] {
        if soc_pct > lower.soc_pct {
            let t = (soc_pct - lower.soc_pct) / (upper.soc_pct - lower.soc_pct);
            return lower.volts_per_cell + t * (upper.volts_per_cell - lower.volts_per_cell);
        }
        upper = *lower;
    }
    upper.volts_per_cell
}
