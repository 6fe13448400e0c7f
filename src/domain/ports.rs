//! Port traits between the peripheral logic and the bus it talks over.
//!
//! ```text
//!   BlueZ adapter (zbus) ──▶ port trait ──▶ GattServer / RegistrationOrchestrator
//! ```
//!
//! The production implementations live in `infrastructure::bluez`; tests use
//! in-memory fakes.

use crate::domain::error::{DaemonError, PeripheralError, SensorError};
use crate::domain::models::{CharacteristicEvent, MediaEndpoint};
use crate::domain::object_tree::Entity;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Acquires a bus connection (`ConnectionError` on failure).
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn PeripheralBus>, PeripheralError>;
}

/// One live bus connection: export surface, dispatch loop, remote handles.
#[async_trait]
pub trait PeripheralBus: Send + Sync {
    /// Publish one entity so the daemon can introspect it.
    async fn export(&self, entity: &Entity) -> Result<(), PeripheralError>;

    /// Withdraw a previously published entity.
    async fn retract(&self, entity: &Entity) -> Result<(), PeripheralError>;

    /// Start serving inbound calls and delivering value-store events as
    /// change signals.
    fn start_dispatch(
        &self,
        events: mpsc::UnboundedReceiver<CharacteristicEvent>,
    ) -> Result<(), PeripheralError>;

    /// Stop the dispatch loop immediately. Idempotent.
    fn stop_dispatch(&self);

    fn is_dispatching(&self) -> bool;

    /// Handle on the daemon's adapter object.
    async fn adapter(&self) -> Result<Arc<dyn AdapterControl>, PeripheralError>;

    /// Registration surface of the daemon (GATT, advertising, media managers).
    fn registrar(&self) -> Arc<dyn DaemonRegistrar>;
}

/// Remote adapter power property.
#[async_trait]
pub trait AdapterControl: Send + Sync {
    async fn powered(&self) -> Result<bool, PeripheralError>;
    async fn set_powered(&self, powered: bool) -> Result<(), PeripheralError>;
}

/// Registration methods of the daemon's manager interfaces.
#[async_trait]
pub trait DaemonRegistrar: Send + Sync {
    async fn register_application(&self, path: &str) -> Result<(), DaemonError>;
    async fn unregister_application(&self, path: &str) -> Result<(), DaemonError>;

    async fn register_advertisement(&self, path: &str) -> Result<(), DaemonError>;
    async fn unregister_advertisement(&self, path: &str) -> Result<(), DaemonError>;

    async fn register_endpoint(&self, endpoint: &MediaEndpoint) -> Result<(), DaemonError>;
    async fn unregister_endpoint(&self, path: &str) -> Result<(), DaemonError>;
}

/// External scalar sensor, read in integer milli-units.
pub trait SensorSource: Send + Sync {
    fn read_milli(&self) -> Result<i32, SensorError>;
}
