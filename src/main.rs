//! Command-line monitor: connects to the charger and prints telemetry and
//! battery estimates as status frames arrive.

use benchcharge::estimate::format_duration;
use benchcharge::{ChargerClient, SessionEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Optional device name filter; otherwise the first advertising charger.
    let device_name = std::env::args().nth(1);
    let mut client = ChargerClient::new(device_name.as_deref()).await?;
    tracing::info!("connected");

    client
        .run(|session, event| {
            if event != SessionEvent::StatusUpdated {
                return;
            }
            let Some(sample) = session.current_status() else {
                return;
            };
            let s = &sample.status;
            println!(
                "AC {:5.1}V {:4.1}A {:4.1}Hz | DC {:6.2}V {:5.2}A | eff {:4.1}% | temp {:2.0}/{:2.0}",
                s.ac_input_voltage,
                s.ac_input_current,
                s.ac_input_frequency,
                s.dc_output_voltage,
                s.dc_output_current,
                s.efficiency_pct,
                s.temperature_1,
                s.temperature_2,
            );

            if let Some(model) = session.selected_model() {
                let soc = session
                    .state_of_charge()
                    .map(|soc| format!("{soc:.1}%"))
                    .unwrap_or_else(|| "?".into());
                let eta = session
                    .time_estimate_secs(None)
                    .map(format_duration)
                    .unwrap_or_else(|| "?".into());
                println!(
                    "  {} ({}S) | SOC {} | target {} | {}",
                    model.name,
                    model.series_cells,
                    soc,
                    eta,
                    session.describe_preset(session.active_preset_values()),
                );
            }
        })
        .await
}
