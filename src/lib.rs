//! BLE GATT peripheral served to BlueZ over D-Bus.
//!
//! One primary service with read/write/notify characteristics, an LE
//! advertisement, an optional media endpoint stub, and a background sampler
//! feeding sensor readings into a characteristic.

pub mod domain;
pub mod infrastructure;

pub use domain::lifecycle::GattServer;
pub use domain::settings::{Settings, SettingsService};
