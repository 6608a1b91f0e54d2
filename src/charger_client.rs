//! BLE transport glue and the poll/notify event loop.

use anyhow::anyhow;
use bluest::Adapter;
use bluest::AdvertisingDevice;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use futures_util::StreamExt;
use std::time::Instant;
use tokio::time::timeout;
use tokio::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::frame::Command;
use crate::preset::Preset;
use crate::session::{Session, SessionEvent};

/// A connected charger: the BLE handles plus the owned [`Session`].
///
/// All decode, estimation and preset work runs synchronously inside
/// [`ChargerClient::run`], driven by inbound notifications and a periodic
/// status poll. Nothing else mutates the session, which is what makes its
/// single-context assumption hold.
pub struct ChargerClient {
    adapter: Adapter,
    device: Device,
    write: Characteristic,
    notify: Characteristic,
    session: Session,
}

impl ChargerClient {
    const SERVICE_ID: &'static str = "0000ffe1-0000-1000-8000-00805f9b34fb";
    const NOTIFY_CHARACTERISTIC_ID: &'static str = "0000ffe2-0000-1000-8000-00805f9b34fb";
    const WRITE_CHARACTERISTIC_ID: &'static str = "0000ffe3-0000-1000-8000-00805f9b34fb";
    // How long to scan before giving up on finding the charger.
    const DISCOVERY_TIMEOUT_S: u64 = 30;
    // Interval between status-request polls.
    const POLL_INTERVAL_MS: u64 = 2000;

    /// Connect to the first advertising charger, whatever its name.
    pub async fn new_any() -> anyhow::Result<Self> {
        Self::new(None).await
    }

    /// Create a new `ChargerClient`, which includes attempting to discover
    /// and connect to the device.
    pub async fn new(device_name: Option<&str>) -> anyhow::Result<Self> {
        let adapter = bluest::Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;

        let device = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            Self::discover_device(device_name, &adapter),
        )
        .await
        .map_err(|_| anyhow!("Charger not found"))??;

        adapter.connect_device(&device.device).await?;

        let control_service = device
            .device
            .discover_services_with_uuid(Self::service_id())
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not offer the charger control service."
            ))?
            .clone();
        let notify = control_service
            .discover_characteristics_with_uuid(Self::notify_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not offer the notify characteristic."
            ))?
            .clone();
        let write = control_service
            .discover_characteristics_with_uuid(Self::write_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not offer the write characteristic."
            ))?
            .clone();

        let mut session = Session::new();
        session.mark_connected();

        Ok(Self {
            adapter: adapter.clone(),
            device: device.device,
            write,
            notify,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session until the device disconnects or the transport
    /// fails. `on_event` is called after every applied frame.
    ///
    /// Writes are fire-and-forget: the next write may be issued before the
    /// previous one's acknowledgment frame arrives, and the device makes no
    /// ordering promise between acknowledgments.
    pub async fn run<F>(&mut self, mut on_event: F) -> anyhow::Result<()>
    where
        F: FnMut(&Session, SessionEvent),
    {
        // The notification stream borrows the characteristic it came from,
        // and the sends below need `&mut self`, so the stream gets its own
        // handle.
        let notify = self.notify.clone();
        let mut frames = notify.notify().await?;

        // Prime the setpoint so detection and preset matching have an input.
        if let Err(err) = self.send(Command::RequestSetpoint).await {
            self.session.mark_disconnected();
            return Err(err);
        }

        let mut poll = tokio::time::interval(Duration::from_millis(Self::POLL_INTERVAL_MS));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(err) = self.send(Command::RequestStatus).await {
                        self.session.mark_disconnected();
                        return Err(err);
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(data)) => {
                        trace!("rx: {}", hex::encode(&data));
                        let event = self.session.handle_frame(&data, Instant::now());
                        if matches!(
                            event,
                            SessionEvent::VoltageRejected | SessionEvent::CurrentRejected
                        ) {
                            warn!("device rejected a setpoint write: {event:?}");
                        }
                        on_event(&self.session, event);
                    }
                    Some(Err(err)) => {
                        self.session.mark_disconnected();
                        return Err(err.into());
                    }
                    None => {
                        debug!("notification stream ended");
                        self.session.mark_disconnected();
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Encode and write one command, recording it optimistically in the
    /// session before any acknowledgment arrives.
    pub async fn send(&mut self, command: Command) -> anyhow::Result<()> {
        let frame = command.encode();
        trace!("tx: {}", hex::encode(&frame));
        self.write.write(&frame).await?;
        self.session.note_sent(&command);
        Ok(())
    }

    pub async fn set_output_voltage(&mut self, volts: f32) -> anyhow::Result<()> {
        self.send(Command::SetVoltage(volts)).await
    }

    pub async fn set_output_current(&mut self, amps: f32) -> anyhow::Result<()> {
        self.send(Command::SetCurrent(amps)).await
    }

    pub async fn set_output_enabled(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.send(Command::SetOutputEnabled(enabled)).await
    }

    /// Issue the commands that put `preset` into effect.
    pub async fn send_preset(&mut self, preset: &Preset) -> anyhow::Result<()> {
        let commands = self.session.preset_commands(preset);
        if commands.is_empty() {
            return Err(anyhow!(
                "No pack model selected; cannot resolve the preset to a pack voltage"
            ));
        }
        for command in commands {
            self.send(command).await?;
        }
        Ok(())
    }

    /// Disconnect from the charger.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        self.session.mark_disconnected();
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }

    async fn discover_device(
        name: Option<&str>,
        adapter: &Adapter,
    ) -> anyhow::Result<AdvertisingDevice> {
        let required_services = [Self::service_id()];
        let mut scan = adapter.scan(&required_services).await?;
        while let Some(device) = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            scan.next(),
        )
        .await
        .map_err(|_| anyhow!("Charger not found"))?
        {
            match name {
                None => return Ok(device),
                Some(name) => {
                    let device_name = device.device.name_async().await.unwrap_or_default();
                    if device_name == name {
                        return Ok(device);
                    }
                }
            }
        }

        Err(anyhow!("Charger not found"))
    }

    fn service_id() -> Uuid {
        Uuid::parse_str(Self::SERVICE_ID).unwrap()
    }

    fn notify_characteristic_id() -> Uuid {
        Uuid::parse_str(Self::NOTIFY_CHARACTERISTIC_ID).unwrap()
    }

    fn write_characteristic_id() -> Uuid {
        Uuid::parse_str(Self::WRITE_CHARACTERISTIC_ID).unwrap()
    }
}
