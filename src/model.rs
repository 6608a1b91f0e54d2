//! Catalog of known battery packs and detection of which one is attached.

/// No sane charge target sits above this per-cell voltage.
pub const CELL_CEILING_V: f32 = 4.24;
/// No live pack sits below this per-cell voltage.
pub const CELL_FLOOR_V: f32 = 3.0;

/// Physical parameters of one known battery pack.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryModel {
    pub name: String,
    /// Cells wired in series; scales pack voltage to per-cell voltage.
    pub series_cells: u32,
    pub capacity_wh: f32,
    pub max_current_a: f32,
    /// Total pack resistance as seen by the charger, in ohms.
    pub pack_resistance_ohms: f32,
}

impl BatteryModel {
    /// `series_cells` must be at least 1; per-cell voltage math divides by
    /// it.
    pub fn new(
        name: &str,
        series_cells: u32,
        capacity_wh: f32,
        max_current_a: f32,
        pack_resistance_ohms: f32,
    ) -> Self {
        debug_assert!(series_cells >= 1, "a pack has at least one series cell");
        Self {
            name: name.into(),
            series_cells,
            capacity_wh,
            max_current_a,
            pack_resistance_ohms,
        }
    }

    /// Highest pack voltage this model could plausibly be charged toward.
    pub fn max_target_voltage(&self) -> f32 {
        self.series_cells as f32 * CELL_CEILING_V
    }

    /// Lowest pack voltage at which this model could plausibly sit.
    pub fn min_pack_voltage(&self) -> f32 {
        self.series_cells as f32 * CELL_FLOOR_V
    }
}

/// Ordered, immutable catalog of known packs.
///
/// Declaration order matters: it is the tie-break when more than one model is
/// consistent with the observed voltages.
pub struct ModelRegistry {
    models: Vec<BatteryModel>,
}

impl ModelRegistry {
    pub fn new(models: Vec<BatteryModel>) -> Self {
        Self { models }
    }

    /// The built-in catalog.
    ///
    /// Pack resistance assumes a Samsung 50S-class cell group (0.022/4 ohm)
    /// scaled by series count, except where a datasheet said otherwise.
    pub fn builtin() -> Self {
        Self::new(vec![
            //                              S     Wh     A    Ohm
            BatteryModel::new("KingSong S22", 30, 2220.0, 12.0, 0.022 / 4.0 * 30.0),
            BatteryModel::new("Inmotion V13", 30, 3024.0, 14.0, 0.035 / 8.0 * 30.0), // 35E, 8p
            BatteryModel::new("Begode Master", 32, 2400.0, 10.0, 0.022 / 4.0 * 32.0),
            BatteryModel::new("Leaperkim Lynx", 36, 2600.0, 18.0, 0.022 / 4.0 * 36.0), // 50S, 4p
            BatteryModel::new("Begode ET Max", 40, 3000.0, 20.0, 0.022 / 4.0 * 40.0), // 50S, 4p
        ])
    }

    pub fn get(&self, index: usize) -> Option<&BatteryModel> {
        self.models.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatteryModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Infer which pack is attached from the commanded and observed voltages.
    ///
    /// Returns the index of the first model, in declaration order, whose cell
    /// count is consistent with both: the setpoint must sit below the model's
    /// ceiling and the observed pack voltage at or above its floor. Undefined
    /// until both inputs are nonzero.
    pub fn detect(&self, setpoint_voltage: f32, observed_voltage: f32) -> Option<usize> {
        if setpoint_voltage == 0.0 || observed_voltage == 0.0 {
            return None;
        }
        self.models.iter().position(|model| {
            setpoint_voltage < model.max_target_voltage()
                && observed_voltage >= model.min_pack_voltage()
        })
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
