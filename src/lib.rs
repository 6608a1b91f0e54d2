//! Monitor and control certain models of DC bench charger over Bluetooth Low Energy.
//!
//! The charger exposes a proprietary command/response protocol over a GATT
//! service: 7-byte checksummed command frames go out over a write
//! characteristic, and coded notification frames (status telemetry, setpoint
//! echoes, command acknowledgments) come back over a notify characteristic.
//!
//! On top of the raw telemetry this crate estimates battery state: which
//! known pack is attached (inferred from the commanded and observed
//! voltages), its state of charge (rest voltage through a fixed charge
//! curve), nominal capacity, and the time remaining to a charge target. A
//! small preset catalog maps named charge targets to setpoint commands and
//! back.
//!
//! # Example
//!
//! ```no_run
//! # #[tokio::main]
//! # pub async fn main() {
//!     let mut client = benchcharge::ChargerClient::new_any().await.unwrap();
//!     client
//!         .run(|session, _event| {
//!             if let Some(soc) = session.state_of_charge() {
//!                 println!("state of charge: {soc:.1}%");
//!             }
//!         })
//!         .await
//!         .unwrap();
//! # }
//! ```

pub mod curve;
pub mod estimate;
pub mod frame;
pub mod model;
pub mod preset;
pub mod session;

mod charger_client;

pub use charger_client::ChargerClient;
pub use frame::Command;
pub use model::{BatteryModel, ModelRegistry};
pub use preset::{ActivePreset, CurrentTarget, Preset};
pub use session::{LinkState, Session, SessionEvent, Setpoint, TelemetrySample};
