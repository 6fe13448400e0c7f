//! Exported Objects
//!
//! D-Bus interfaces the daemon calls into. Each one is a thin view over a
//! domain entity; the characteristic forwards to its value store so the bus
//! dispatcher and the sampler share the same state.

use crate::domain::characteristic::CharacteristicStore;
use crate::domain::error::PeripheralError;
use crate::domain::models::{Advertisement, GattService, MediaEndpoint};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use zbus::interface;
use zbus::zvariant::{OwnedObjectPath, Value};

pub(crate) fn object_path(path: &str) -> Result<OwnedObjectPath, PeripheralError> {
    OwnedObjectPath::try_from(path.to_string()).map_err(|e| PeripheralError::export(path, e))
}

/// `org.bluez.GattService1`
pub struct ServiceObject {
    uuid: String,
    primary: bool,
    characteristics: Vec<OwnedObjectPath>,
}

impl ServiceObject {
    pub fn new(service: &GattService) -> Result<Self, PeripheralError> {
        let characteristics = service
            .characteristics
            .iter()
            .map(|path| object_path(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            uuid: service.uuid.clone(),
            primary: service.primary,
            characteristics,
        })
    }
}

#[interface(name = "org.bluez.GattService1")]
impl ServiceObject {
    #[zbus(property, name = "UUID")]
    fn uuid(&self) -> String {
        self.uuid.clone()
    }

    #[zbus(property)]
    fn primary(&self) -> bool {
        self.primary
    }

    #[zbus(property)]
    fn includes(&self) -> Vec<OwnedObjectPath> {
        Vec::new()
    }

    #[zbus(property)]
    fn characteristics(&self) -> Vec<OwnedObjectPath> {
        self.characteristics.clone()
    }
}

/// `org.bluez.GattCharacteristic1`
pub struct CharacteristicObject {
    store: Arc<CharacteristicStore>,
    service: OwnedObjectPath,
}

impl CharacteristicObject {
    pub fn new(store: Arc<CharacteristicStore>) -> Result<Self, PeripheralError> {
        let service = object_path(store.service_path())?;
        Ok(Self { store, service })
    }
}

#[interface(name = "org.bluez.GattCharacteristic1")]
impl CharacteristicObject {
    fn read_value(&self, _options: HashMap<&str, Value<'_>>) -> Vec<u8> {
        self.store.read()
    }

    fn write_value(&self, value: Vec<u8>, _options: HashMap<&str, Value<'_>>) {
        self.store.write(value);
    }

    fn start_notify(&self) {
        self.store.start_notify();
    }

    fn stop_notify(&self) {
        self.store.stop_notify();
    }

    #[zbus(property, name = "UUID")]
    fn uuid(&self) -> String {
        self.store.uuid().to_string()
    }

    #[zbus(property)]
    fn service(&self) -> OwnedObjectPath {
        self.service.clone()
    }

    #[zbus(property)]
    fn flags(&self) -> Vec<String> {
        self.store
            .flags()
            .iter()
            .map(|flag| flag.as_str().to_string())
            .collect()
    }

    #[zbus(property)]
    fn value(&self) -> Vec<u8> {
        self.store.value()
    }

    #[zbus(property)]
    fn notifying(&self) -> bool {
        self.store.is_notifying()
    }

    #[zbus(property)]
    fn descriptors(&self) -> Vec<OwnedObjectPath> {
        Vec::new()
    }
}

/// `org.bluez.LEAdvertisement1`
pub struct AdvertisementObject {
    advertisement: Advertisement,
}

impl AdvertisementObject {
    pub fn new(advertisement: &Advertisement) -> Self {
        Self {
            advertisement: advertisement.clone(),
        }
    }
}

#[interface(name = "org.bluez.LEAdvertisement1")]
impl AdvertisementObject {
    /// Called by the daemon when it drops the advertisement on its own.
    fn release(&self) {
        info!("Advertisement {} released", self.advertisement.path);
    }

    #[zbus(property, name = "Type")]
    fn adv_type(&self) -> String {
        self.advertisement.adv_type.clone()
    }

    #[zbus(property, name = "ServiceUUIDs")]
    fn service_uuids(&self) -> Vec<String> {
        self.advertisement.service_uuids.clone()
    }

    #[zbus(property)]
    fn local_name(&self) -> String {
        self.advertisement.local_name.clone()
    }

    #[zbus(property)]
    fn discoverable(&self) -> bool {
        self.advertisement.discoverable
    }
}

/// `org.bluez.MediaEndpoint1`. Registration only: configurations are
/// accepted and logged, no transport is ever acquired.
pub struct MediaEndpointObject {
    endpoint: MediaEndpoint,
}

impl MediaEndpointObject {
    pub fn new(endpoint: &MediaEndpoint) -> Self {
        Self {
            endpoint: endpoint.clone(),
        }
    }
}

#[interface(name = "org.bluez.MediaEndpoint1")]
impl MediaEndpointObject {
    fn set_configuration(
        &self,
        transport: OwnedObjectPath,
        _properties: HashMap<&str, Value<'_>>,
    ) {
        info!("SetConfiguration: transport {}", transport.as_str());
    }

    fn select_configuration(&self, capabilities: Vec<u8>) -> Vec<u8> {
        capabilities
    }

    fn clear_configuration(&self, transport: OwnedObjectPath) {
        info!("ClearConfiguration: transport {}", transport.as_str());
    }

    fn release(&self) {
        info!("Media endpoint {} released", self.endpoint.path);
    }

    #[zbus(property, name = "UUID")]
    fn uuid(&self) -> String {
        self.endpoint.uuid.clone()
    }

    #[zbus(property)]
    fn codec(&self) -> u8 {
        self.endpoint.codec
    }

    #[zbus(property)]
    fn capabilities(&self) -> Vec<u8> {
        self.endpoint.capabilities.clone()
    }
}
