//! BlueZ error replies
//!
//! Error names used when talking to `bluetoothd` and the mapping of failed
//! calls onto [`DaemonError`].

use crate::domain::error::DaemonError;

/// Interface whose `Value` and `Notifying` changes are signalled
pub const GATT_CHARACTERISTIC_INTERFACE: &str = "org.bluez.GattCharacteristic1";

/// Generic failure name used when the reply carried no error name
pub const ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";
pub const ERROR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";

/// Map a failed zbus call to the daemon's error name and message.
pub fn daemon_error(err: zbus::Error) -> DaemonError {
    match err {
        zbus::Error::MethodError(name, message, _) => {
            DaemonError::new(name.to_string(), message.unwrap_or_default())
        }
        zbus::Error::FDO(fdo) => DaemonError::new(ERROR_FAILED, fdo.to_string()),
        other => DaemonError::new(ERROR_FAILED, other.to_string()),
    }
}
