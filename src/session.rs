//! State for one charger session: telemetry history, the live setpoint, the
//! attached-pack selection and preset reconciliation.
//!
//! A `Session` is plain owned state with no transport handles. It is driven
//! from a single execution context (the client's poll/notify loop) and must
//! not be mutated concurrently; the client upholds that by owning it.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::curve;
use crate::estimate::{self, FALLBACK_PACK_RESISTANCE_OHMS};
use crate::frame::{decode, AckOutcome, Command, Decoded, StatusFields};
use crate::model::{BatteryModel, ModelRegistry};
use crate::preset::{builtin_presets, ActivePreset, CurrentTarget, Preset};

/// One decoded status notification, stamped with local receipt time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub received_at: Instant,
    pub status: StatusFields,
}

/// The last known commanded voltage/current target, confirmed by a device
/// echo or optimistically recorded when a write is issued.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoint {
    pub voltage: f32,
    pub current: f32,
}

/// Connection lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// Transport is up but no status frame has been decoded yet.
    Connected,
    /// At least one status frame has arrived.
    Streaming,
}

/// What one inbound frame meant to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StatusUpdated,
    SetpointChanged,
    VoltageAccepted,
    /// The device rejected the last voltage write. Session state is
    /// unchanged; the caller decides whether to retry.
    VoltageRejected,
    CurrentAccepted,
    CurrentRejected,
    /// Malformed or unrecognized frame, discarded.
    Ignored,
}

/// Current shown for an `Unlimited` preset when no model is selected.
/// Display only: [`Session::preset_commands`] always resolves against a
/// selected model.
const DISPLAY_FALLBACK_CURRENT_A: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// Inferred from observed voltages; cleared by any setpoint echo.
    Detected(usize),
    /// Chosen by the user; survives setpoint echoes.
    Explicit(usize),
}

pub struct Session {
    link: LinkState,
    history: Vec<TelemetrySample>,
    history_limit: Option<usize>,
    setpoint: Setpoint,
    registry: ModelRegistry,
    selection: Option<Selection>,
    presets: Vec<Preset>,
    user_preset: Preset,
    active_preset: ActivePreset,
}

impl Session {
    pub fn new() -> Self {
        Self::with_catalog(ModelRegistry::builtin(), builtin_presets())
    }

    pub fn with_catalog(registry: ModelRegistry, presets: Vec<Preset>) -> Self {
        Self {
            link: LinkState::Disconnected,
            history: Vec::new(),
            history_limit: None,
            setpoint: Setpoint::default(),
            registry,
            selection: None,
            presets,
            user_preset: Preset::new("Custom", 0.0, CurrentTarget::Amps(0.0)),
            active_preset: ActivePreset::User,
        }
    }

    /// Cap the telemetry history at `limit` samples, discarding the oldest.
    /// Retention is a policy choice; estimation only ever reads the newest
    /// sample.
    pub fn set_history_limit(&mut self, limit: Option<usize>) {
        self.history_limit = limit;
        if let Some(limit) = limit {
            let excess = self.history.len().saturating_sub(limit);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }
    }

    // ---- link lifecycle ----

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    /// The transport came up. Telemetry has not arrived yet.
    pub fn mark_connected(&mut self) {
        self.link = LinkState::Connected;
    }

    /// The transport went away, cleanly or not. The client stops polling and
    /// drops its channel handles; history and setpoint are kept for
    /// inspection.
    pub fn mark_disconnected(&mut self) {
        self.link = LinkState::Disconnected;
    }

    // ---- frame handling ----

    /// Apply one inbound notification buffer.
    pub fn handle_frame(&mut self, buffer: &[u8], received_at: Instant) -> SessionEvent {
        match decode(buffer) {
            Decoded::Status(status) => {
                self.push_sample(TelemetrySample {
                    received_at,
                    status,
                });
                if self.link != LinkState::Disconnected {
                    self.link = LinkState::Streaming;
                }
                if self.selection.is_none() {
                    self.try_detect();
                }
                SessionEvent::StatusUpdated
            }
            Decoded::SetpointEcho { voltage, current } => {
                self.setpoint = Setpoint { voltage, current };
                // The echo may reflect a change made outside this session,
                // so a detected selection is stale. An explicit one is kept.
                if matches!(self.selection, Some(Selection::Detected(_))) {
                    debug!("setpoint echo invalidated the detected pack model");
                    self.selection = None;
                }
                if self.selection.is_none() {
                    self.try_detect();
                }
                self.reconcile_preset();
                SessionEvent::SetpointChanged
            }
            Decoded::SetVoltageAck(AckOutcome::Accepted) => SessionEvent::VoltageAccepted,
            Decoded::SetVoltageAck(AckOutcome::Rejected) => SessionEvent::VoltageRejected,
            Decoded::SetCurrentAck(AckOutcome::Accepted) => SessionEvent::CurrentAccepted,
            Decoded::SetCurrentAck(AckOutcome::Rejected) => SessionEvent::CurrentRejected,
            Decoded::Unhandled { code } => {
                trace!("ignoring frame with unhandled code {code:#06x}");
                SessionEvent::Ignored
            }
            Decoded::Malformed => {
                trace!("discarding malformed frame: {}", hex::encode(buffer));
                SessionEvent::Ignored
            }
        }
    }

    /// Record a locally issued command before the device confirms it.
    /// Optimistic: the setpoint is updated and presets re-reconciled, but a
    /// detected model selection stays (only echoes invalidate it).
    pub fn note_sent(&mut self, command: &Command) {
        match command {
            Command::SetVoltage(volts) => {
                self.setpoint.voltage = *volts;
                self.reconcile_preset();
            }
            Command::SetCurrent(amps) => {
                self.setpoint.current = *amps;
                self.reconcile_preset();
            }
            _ => {}
        }
    }

    fn push_sample(&mut self, sample: TelemetrySample) {
        self.history.push(sample);
        if let Some(limit) = self.history_limit {
            let excess = self.history.len().saturating_sub(limit);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }
    }

    fn try_detect(&mut self) {
        let observed = match self.history.last() {
            Some(sample) => sample.status.dc_output_voltage,
            None => return,
        };
        if let Some(index) = self.registry.detect(self.setpoint.voltage, observed) {
            if let Some(model) = self.registry.get(index) {
                debug!("detected attached pack: {}", model.name);
            }
            self.selection = Some(Selection::Detected(index));
        }
    }

    // ---- telemetry ----

    pub fn history(&self) -> &[TelemetrySample] {
        &self.history
    }

    /// The most recent telemetry sample.
    pub fn current_status(&self) -> Option<&TelemetrySample> {
        self.history.last()
    }

    /// Age of the newest sample. There is no per-command timeout; staleness
    /// here is how a caller notices the device has gone quiet.
    pub fn telemetry_age(&self, now: Instant) -> Option<Duration> {
        self.current_status()
            .map(|sample| now.duration_since(sample.received_at))
    }

    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    // ---- model selection ----

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn selected_model(&self) -> Option<&BatteryModel> {
        match self.selection? {
            Selection::Detected(index) | Selection::Explicit(index) => self.registry.get(index),
        }
    }

    pub fn selection_is_detected(&self) -> bool {
        matches!(self.selection, Some(Selection::Detected(_)))
    }

    /// Explicitly select a catalog model. Explicit selections are never
    /// cleared by setpoint echoes. Returns false for an out-of-range index.
    pub fn select_model(&mut self, index: usize) -> bool {
        if self.registry.get(index).is_none() {
            return false;
        }
        self.selection = Some(Selection::Explicit(index));
        self.reconcile_preset();
        true
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn series_cells(&self) -> Option<u32> {
        self.selected_model().map(|model| model.series_cells)
    }

    fn pack_resistance_ohms(&self) -> f32 {
        self.selected_model()
            .map(|model| model.pack_resistance_ohms)
            .unwrap_or(FALLBACK_PACK_RESISTANCE_OHMS)
    }

    fn max_current_a(&self) -> f32 {
        self.selected_model()
            .map(|model| model.max_current_a)
            .unwrap_or(DISPLAY_FALLBACK_CURRENT_A)
    }

    // ---- estimation ----

    /// Pack voltage with the IR drop from the charge current subtracted.
    pub fn rest_voltage(&self) -> Option<f32> {
        let sample = self.current_status()?;
        Some(estimate::rest_voltage(
            sample.status.dc_output_voltage,
            sample.status.dc_output_current,
            self.pack_resistance_ohms(),
        ))
    }

    pub fn rest_cell_voltage(&self) -> Option<f32> {
        let cells = self.series_cells()?;
        Some(self.rest_voltage()? / cells as f32)
    }

    /// Estimated state of charge of the attached pack.
    pub fn state_of_charge(&self) -> Option<f32> {
        Some(curve::soc_from_voltage(self.rest_cell_voltage()?))
    }

    /// The SOC the current setpoint voltage corresponds to.
    pub fn setpoint_soc(&self) -> Option<f32> {
        let cells = self.series_cells()?;
        if self.setpoint.voltage == 0.0 {
            return None;
        }
        Some(estimate::soc_from_pack_voltage(self.setpoint.voltage, cells))
    }

    /// Nominal capacity of the selected pack in amp-hours.
    pub fn capacity_amp_hours(&self) -> Option<f32> {
        let model = self.selected_model()?;
        Some(estimate::capacity_amp_hours(
            model.capacity_wh,
            model.series_cells,
        ))
    }

    /// Seconds until the given SOC target (the setpoint's SOC when `None`)
    /// at the present output power. A linear-power approximation.
    pub fn time_estimate_secs(&self, target_soc_pct: Option<f32>) -> Option<f32> {
        let soc = self.state_of_charge()?;
        let target = match target_soc_pct {
            Some(target) => target,
            None => self.setpoint_soc()?,
        };
        let model = self.selected_model()?;
        let sample = self.current_status()?;
        let power = sample.status.dc_output_voltage * sample.status.dc_output_current;
        estimate::time_to_target_secs(target, soc, model.capacity_wh, power)
    }

    /// SOC the pack voltage will settle toward under the current setpoint.
    pub fn asymptote_soc(&self) -> Option<f32> {
        let model = self.selected_model()?;
        estimate::asymptote_soc(
            self.setpoint.voltage,
            self.setpoint.current,
            model.series_cells,
            model.pack_resistance_ohms,
        )
    }

    // ---- presets ----

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn user_preset(&self) -> &Preset {
        &self.user_preset
    }

    pub fn active_preset(&self) -> ActivePreset {
        self.active_preset
    }

    /// The values behind the active-preset tag.
    pub fn active_preset_values(&self) -> &Preset {
        match self.active_preset {
            ActivePreset::Catalog(index) => &self.presets[index],
            ActivePreset::User => &self.user_preset,
        }
    }

    /// Catalog entries, plus the user preset when it holds live values.
    pub fn all_presets(&self) -> Vec<&Preset> {
        let mut all: Vec<&Preset> = self.presets.iter().collect();
        if self.user_preset.is_set() {
            all.push(&self.user_preset);
        }
        all
    }

    /// A display label for the given preset in the context of this session.
    pub fn describe_preset(&self, preset: &Preset) -> String {
        preset.describe(self.series_cells().unwrap_or(1), self.max_current_a())
    }

    /// Re-derive which preset the live setpoint corresponds to: the first
    /// catalog entry within tolerance, else the user preset overwritten with
    /// the live values.
    fn reconcile_preset(&mut self) {
        let setpoint_soc = self.setpoint_soc().unwrap_or(0.0);
        if let Some(index) = self
            .presets
            .iter()
            .position(|preset| preset.matches(setpoint_soc, self.setpoint.current))
        {
            self.active_preset = ActivePreset::Catalog(index);
            return;
        }
        self.user_preset.target_soc_pct = setpoint_soc;
        self.user_preset.target_current = CurrentTarget::Amps(self.setpoint.current);
        self.active_preset = ActivePreset::User;
    }

    /// The commands that put `preset` into effect.
    ///
    /// An all-zero preset yields a single output-disable. A real target
    /// yields a voltage and a current command, resolving `Unlimited` to the
    /// selected model's maximum. A non-off preset with no model selected
    /// yields nothing: without a cell count there is no pack voltage to
    /// command.
    pub fn preset_commands(&self, preset: &Preset) -> Vec<Command> {
        if preset.is_off() {
            return vec![Command::SetOutputEnabled(false)];
        }
        let Some(model) = self.selected_model() else {
            return Vec::new();
        };
        vec![
            Command::SetVoltage(preset.target_voltage(model.series_cells)),
            Command::SetCurrent(preset.resolve_current(model.max_current_a)),
        ]
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{SETPOINT_ECHO_CODE, STATUS_UPDATE_CODE};

    fn status_frame(dc_voltage: f32, dc_current: f32) -> Vec<u8> {
        let mut buffer = vec![0u8; 38];
        buffer[0..2].copy_from_slice(&STATUS_UPDATE_CODE.to_le_bytes());
        buffer[22..26].copy_from_slice(&dc_voltage.to_le_bytes());
        buffer[26..30].copy_from_slice(&dc_current.to_le_bytes());
        buffer
    }

    fn echo_frame(voltage: f32, current: f32) -> Vec<u8> {
        let mut buffer = vec![0u8; 10];
        buffer[0..2].copy_from_slice(&SETPOINT_ECHO_CODE.to_le_bytes());
        buffer[2..6].copy_from_slice(&voltage.to_le_bytes());
        buffer[6..10].copy_from_slice(&current.to_le_bytes());
        buffer
    }

    fn connected_session() -> Session {
        let mut session = Session::new();
        session.mark_connected();
        session
    }

    #[test]
    fn link_state_transitions() {
        let mut session = Session::new();
        assert_eq!(session.link_state(), LinkState::Disconnected);
        session.mark_connected();
        assert_eq!(session.link_state(), LinkState::Connected);
        session.handle_frame(&status_frame(140.0, 2.0), Instant::now());
        assert_eq!(session.link_state(), LinkState::Streaming);
        session.mark_disconnected();
        assert_eq!(session.link_state(), LinkState::Disconnected);
    }

    #[test]
    fn detects_model_once_both_voltages_are_known() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&echo_frame(151.2, 5.0), now);
        // No telemetry yet, so no detection.
        assert!(session.selected_model().is_none());
        session.handle_frame(&status_frame(140.0, 2.0), now);
        assert_eq!(session.selected_model().unwrap().name, "Leaperkim Lynx");
        assert!(session.selection_is_detected());
    }

    #[test]
    fn echo_clears_a_detected_selection() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&status_frame(120.0, 2.0), now);
        session.handle_frame(&echo_frame(134.0, 10.0), now);
        // 134 V setpoint and 120 V observed fit a 32S pack.
        let model = session.selected_model().unwrap();
        assert_eq!(model.series_cells, 32);
        assert!(session.selection_is_detected());

        session.handle_frame(&echo_frame(0.0, 0.0), now);
        // The detected selection is gone and cannot re-detect from a zero
        // setpoint.
        assert!(session.selected_model().is_none());
    }

    #[test]
    fn explicit_selection_survives_echoes() {
        let mut session = connected_session();
        assert!(session.select_model(3));
        session.handle_frame(&echo_frame(10.0, 10.0), Instant::now());
        assert_eq!(session.selected_model().unwrap().name, "Leaperkim Lynx");
        assert!(!session.selection_is_detected());
    }

    #[test]
    fn optimistic_writes_keep_the_detected_selection() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&echo_frame(151.2, 5.0), now);
        session.handle_frame(&status_frame(140.0, 2.0), now);
        assert!(session.selection_is_detected());
        session.note_sent(&Command::SetVoltage(150.0));
        assert!(session.selection_is_detected());
        assert_eq!(session.setpoint().voltage, 150.0);
    }

    #[test]
    fn history_is_capped_when_asked() {
        let mut session = connected_session();
        session.set_history_limit(Some(2));
        let now = Instant::now();
        for voltage in [130.0, 131.0, 132.0] {
            session.handle_frame(&status_frame(voltage, 1.0), now);
        }
        assert_eq!(session.history().len(), 2);
        assert_eq!(
            session.current_status().unwrap().status.dc_output_voltage,
            132.0
        );
        assert_eq!(session.history()[0].status.dc_output_voltage, 131.0);
    }

    #[test]
    fn estimation_is_undefined_without_inputs() {
        let session = Session::new();
        assert_eq!(session.rest_voltage(), None);
        assert_eq!(session.state_of_charge(), None);
        assert_eq!(session.setpoint_soc(), None);
        assert_eq!(session.capacity_amp_hours(), None);
        assert_eq!(session.time_estimate_secs(None), None);
        assert_eq!(session.asymptote_soc(), None);
    }

    #[test]
    fn estimates_soc_from_rest_voltage() {
        let mut session = connected_session();
        assert!(session.select_model(3)); // 36S, 0.198 ohm
        session.handle_frame(&status_frame(151.2, 2.0), Instant::now());

        let rest = session.rest_voltage().unwrap();
        assert!((rest - 150.804).abs() < 1e-3);
        let per_cell = session.rest_cell_voltage().unwrap();
        assert!((per_cell - 4.189).abs() < 1e-3);
        let soc = session.state_of_charge().unwrap();
        assert!((soc - 99.78).abs() < 0.05, "{soc}");
    }

    #[test]
    fn time_estimate_needs_current_flow() {
        let mut session = connected_session();
        assert!(session.select_model(3));
        session.handle_frame(&status_frame(140.0, 0.0), Instant::now());
        assert_eq!(session.time_estimate_secs(Some(90.0)), None);

        session.handle_frame(&status_frame(140.0, 2.0), Instant::now());
        let secs = session.time_estimate_secs(Some(100.0)).unwrap();
        assert!(secs >= 0.0);
    }

    #[test]
    fn setpoint_matching_a_catalog_preset_becomes_active() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&status_frame(140.0, 2.0), now);
        // voltage_from_soc(90) * 36 cells, 5 A: the Casual preset.
        let voltage = curve::voltage_from_soc(90.0) * 36.0;
        session.handle_frame(&echo_frame(voltage, 5.0), now);
        assert_eq!(session.active_preset(), ActivePreset::Catalog(2));
        assert_eq!(session.active_preset_values().name, "Casual");
    }

    #[test]
    fn unmatched_setpoint_overwrites_the_user_preset() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&status_frame(140.0, 2.0), now);
        let voltage = curve::voltage_from_soc(75.0) * 36.0;
        session.handle_frame(&echo_frame(voltage, 7.0), now);
        assert_eq!(session.active_preset(), ActivePreset::User);
        let user = session.user_preset();
        assert!((user.target_soc_pct - 75.0).abs() < 0.1);
        assert_eq!(user.target_current, CurrentTarget::Amps(7.0));
        // The user preset now shows up in the listing.
        assert_eq!(session.all_presets().len(), session.presets().len() + 1);
    }

    #[test]
    fn full_soc_setpoint_does_not_match_the_unlimited_preset() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&status_frame(140.0, 2.0), now);
        session.handle_frame(&echo_frame(151.2, 18.0), now);
        // Max targets 100% but its Unlimited current is symbolic.
        assert_eq!(session.active_preset(), ActivePreset::User);
    }

    #[test]
    fn preset_commands_for_a_real_target() {
        let mut session = connected_session();
        assert!(session.select_model(3)); // Leaperkim Lynx, 36S, 18 A
        let casual = Preset::new("Casual", 90.0, CurrentTarget::Amps(5.0));
        let commands = session.preset_commands(&casual);
        assert_eq!(commands.len(), 2);
        let Command::SetVoltage(volts) = commands[0] else {
            panic!("expected a voltage command, got {:?}", commands[0]);
        };
        assert!((volts - curve::voltage_from_soc(90.0) * 36.0).abs() < 1e-3);
        assert_eq!(commands[1], Command::SetCurrent(5.0));
    }

    #[test]
    fn unlimited_resolves_to_the_model_maximum() {
        let mut session = connected_session();
        assert!(session.select_model(3));
        let max = Preset::new("Max", 100.0, CurrentTarget::Unlimited);
        let commands = session.preset_commands(&max);
        assert_eq!(commands[1], Command::SetCurrent(18.0));
    }

    #[test]
    fn off_preset_only_disables_the_output() {
        let session = Session::new();
        let off = Preset::new("Off", 0.0, CurrentTarget::Amps(0.0));
        assert_eq!(
            session.preset_commands(&off),
            vec![Command::SetOutputEnabled(false)]
        );
    }

    #[test]
    fn non_off_preset_needs_a_model() {
        let session = Session::new();
        let casual = Preset::new("Casual", 90.0, CurrentTarget::Amps(5.0));
        assert!(session.preset_commands(&casual).is_empty());
    }

    #[test]
    fn unlimited_label_falls_back_without_a_model() {
        let session = Session::new();
        let max = Preset::new("Max", 100.0, CurrentTarget::Unlimited);
        // No model selected: the label shows the display fallback, but no
        // command is ever resolved from it.
        assert_eq!(session.describe_preset(&max), "Max 5A 100% 4.2V");
        assert!(session.preset_commands(&max).is_empty());
    }

    #[test]
    fn telemetry_age_tracks_the_newest_sample() {
        let mut session = connected_session();
        let t0 = Instant::now();
        session.handle_frame(&status_frame(140.0, 2.0), t0);
        let age = session.telemetry_age(t0 + Duration::from_secs(6)).unwrap();
        assert_eq!(age, Duration::from_secs(6));
    }

    #[test]
    fn junk_frames_are_ignored() {
        let mut session = connected_session();
        assert_eq!(
            session.handle_frame(&[0x99, 0x99, 0x00], Instant::now()),
            SessionEvent::Ignored
        );
        assert_eq!(
            session.handle_frame(&[0x30], Instant::now()),
            SessionEvent::Ignored
        );
        assert_eq!(session.history().len(), 0);
        assert_eq!(session.link_state(), LinkState::Connected);
    }

    #[test]
    fn acks_do_not_touch_state() {
        let mut session = connected_session();
        let now = Instant::now();
        session.handle_frame(&echo_frame(151.2, 5.0), now);
        let before = session.setpoint();
        assert_eq!(
            session.handle_frame(&[0x03, 0x07, 0x00, 0x07], now),
            SessionEvent::VoltageRejected
        );
        assert_eq!(
            session.handle_frame(&[0x03, 0x08, 0x01, 0x09], now),
            SessionEvent::CurrentAccepted
        );
        assert_eq!(session.setpoint(), before);
    }
}
