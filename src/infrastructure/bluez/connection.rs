//! BlueZ Connection Module
//!
//! System-bus implementations of the peripheral ports.

use crate::domain::error::{DaemonError, PeripheralError};
use crate::domain::models::{CharacteristicEvent, MediaEndpoint};
use crate::domain::object_tree::Entity;
use crate::domain::ports::{AdapterControl, BusConnector, DaemonRegistrar, PeripheralBus};
use crate::infrastructure::bluez::objects::{
    AdvertisementObject, CharacteristicObject, MediaEndpointObject, ServiceObject,
};
use crate::infrastructure::bluez::protocol::{
    daemon_error, ERROR_INVALID_ARGS, GATT_CHARACTERISTIC_INTERFACE,
};
use crate::infrastructure::bluez::proxies::{
    AdapterProxy, GattManagerProxy, LEAdvertisingManagerProxy, MediaProxy,
};
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};
use zbus::fdo::{ObjectManager, Properties};
use zbus::names::InterfaceName;
use zbus::object_server::SignalEmitter;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{ObjectPath, Value};
use zbus::Connection;

/// Opens the system bus.
pub struct BluezConnector {
    adapter_path: String,
    span: Span,
}

impl BluezConnector {
    pub fn new(adapter_path: impl Into<String>, span: Span) -> Self {
        Self {
            adapter_path: adapter_path.into(),
            span,
        }
    }
}

#[async_trait]
impl BusConnector for BluezConnector {
    async fn connect(&self) -> Result<Arc<dyn PeripheralBus>, PeripheralError> {
        let connection = Connection::system()
            .instrument(self.span.clone())
            .await
            .map_err(|e| PeripheralError::Connection(e.to_string()))?;
        info!(parent: &self.span, "Connected to system bus");
        Ok(Arc::new(BluezBus::new(
            connection,
            self.adapter_path.clone(),
            self.span.clone(),
        )))
    }
}

/// One system-bus connection with its object server and dispatcher.
pub struct BluezBus {
    connection: Connection,
    adapter_path: String,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    dispatching: Arc<AtomicBool>,
    span: Span,
}

impl BluezBus {
    pub fn new(connection: Connection, adapter_path: String, span: Span) -> Self {
        Self {
            connection,
            adapter_path,
            dispatcher: Mutex::new(None),
            dispatching: Arc::new(AtomicBool::new(false)),
            span,
        }
    }

    async fn at<I>(&self, path: &str, object: I) -> Result<(), PeripheralError>
    where
        I: zbus::object_server::Interface,
    {
        let added = self
            .connection
            .object_server()
            .at(path, object)
            .await
            .map_err(|e| PeripheralError::export(path, e))?;
        if !added {
            return Err(PeripheralError::export(path, "already exposed"));
        }
        Ok(())
    }

    async fn remove<I>(&self, path: &str) -> Result<(), PeripheralError>
    where
        I: zbus::object_server::Interface,
    {
        self.connection
            .object_server()
            .remove::<I, _>(path)
            .await
            .map(|_| ())
            .map_err(|e| PeripheralError::Teardown(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl PeripheralBus for BluezBus {
    async fn export(&self, entity: &Entity) -> Result<(), PeripheralError> {
        let path = entity.path();
        match entity {
            Entity::Application { .. } => self.at(path, ObjectManager).await,
            Entity::Service(service) => self.at(path, ServiceObject::new(service)?).await,
            Entity::Characteristic(store) => {
                self.at(path, CharacteristicObject::new(store.clone())?).await
            }
            Entity::Advertisement(advertisement) => {
                self.at(path, AdvertisementObject::new(advertisement)).await
            }
            Entity::MediaEndpoint(endpoint) => {
                self.at(path, MediaEndpointObject::new(endpoint)).await
            }
        }
    }

    async fn retract(&self, entity: &Entity) -> Result<(), PeripheralError> {
        let path = entity.path();
        match entity {
            Entity::Application { .. } => self.remove::<ObjectManager>(path).await,
            Entity::Service(_) => self.remove::<ServiceObject>(path).await,
            Entity::Characteristic(_) => self.remove::<CharacteristicObject>(path).await,
            Entity::Advertisement(_) => self.remove::<AdvertisementObject>(path).await,
            Entity::MediaEndpoint(_) => self.remove::<MediaEndpointObject>(path).await,
        }
    }

    fn start_dispatch(
        &self,
        events: mpsc::UnboundedReceiver<CharacteristicEvent>,
    ) -> Result<(), PeripheralError> {
        let mut dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if dispatcher.is_some() {
            debug!(parent: &self.span, "Dispatch loop already running");
            return Ok(());
        }

        let connection = self.connection.clone();
        let dispatching = self.dispatching.clone();
        dispatching.store(true, Ordering::Release);
        *dispatcher = Some(tokio::spawn(
            async move {
                info!("Dispatch loop started");
                pump_events(&connection, events).await;
                dispatching.store(false, Ordering::Release);
                info!("Dispatch loop finished");
            }
            .instrument(self.span.clone()),
        ));
        Ok(())
    }

    fn stop_dispatch(&self) {
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!(parent: &self.span, "Dispatch loop stopped");
        }
        self.dispatching.store(false, Ordering::Release);
    }

    fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    async fn adapter(&self) -> Result<Arc<dyn AdapterControl>, PeripheralError> {
        let proxy = AdapterProxy::builder(&self.connection)
            .path(self.adapter_path.clone())
            .map_err(|e| PeripheralError::Adapter(e.to_string()))?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(|e| PeripheralError::Adapter(e.to_string()))?;
        Ok(Arc::new(BluezAdapter { proxy }))
    }

    fn registrar(&self) -> Arc<dyn DaemonRegistrar> {
        Arc::new(BluezRegistrar {
            connection: self.connection.clone(),
            adapter_path: self.adapter_path.clone(),
        })
    }
}

/// Turn value-store events into `PropertiesChanged` signals, in order.
async fn pump_events(
    connection: &Connection,
    mut events: mpsc::UnboundedReceiver<CharacteristicEvent>,
) {
    while let Some(event) = events.recv().await {
        if let Err(e) = emit_change(connection, &event).await {
            warn!("Dropped change signal for {}: {}", event.path(), e);
        }
    }
}

/// Signal the event's own payload, not the store's current value, so a
/// burst of updates reaches subscribers one by one.
async fn emit_change(connection: &Connection, event: &CharacteristicEvent) -> zbus::Result<()> {
    let emitter = SignalEmitter::new(connection, event.path())?;
    let mut changed = HashMap::new();
    match event {
        CharacteristicEvent::ValueChanged { value, .. } => {
            changed.insert("Value", Value::Array(value.as_slice().into()));
        }
        CharacteristicEvent::NotifyingChanged { notifying, .. } => {
            changed.insert("Notifying", Value::from(*notifying));
        }
    }
    Properties::properties_changed(
        &emitter,
        InterfaceName::from_static_str_unchecked(GATT_CHARACTERISTIC_INTERFACE),
        changed,
        Cow::Borrowed(&[]),
    )
    .await
}

/// `org.bluez.Adapter1` on the configured adapter path.
pub struct BluezAdapter {
    proxy: AdapterProxy<'static>,
}

#[async_trait]
impl AdapterControl for BluezAdapter {
    async fn powered(&self) -> Result<bool, PeripheralError> {
        self.proxy
            .powered()
            .await
            .map_err(|e| PeripheralError::Adapter(daemon_error(e).to_string()))
    }

    async fn set_powered(&self, powered: bool) -> Result<(), PeripheralError> {
        self.proxy
            .set_powered(powered)
            .await
            .map_err(|e| PeripheralError::Adapter(daemon_error(e).to_string()))
    }
}

/// GATT, advertising and media managers of the adapter.
pub struct BluezRegistrar {
    connection: Connection,
    adapter_path: String,
}

fn target_path(path: &str) -> Result<ObjectPath<'_>, DaemonError> {
    ObjectPath::try_from(path).map_err(|e| DaemonError::new(ERROR_INVALID_ARGS, e.to_string()))
}

impl BluezRegistrar {
    async fn gatt_manager(&self) -> Result<GattManagerProxy<'static>, DaemonError> {
        GattManagerProxy::new(&self.connection, self.adapter_path.clone())
            .await
            .map_err(daemon_error)
    }

    async fn advertising_manager(&self) -> Result<LEAdvertisingManagerProxy<'static>, DaemonError> {
        LEAdvertisingManagerProxy::new(&self.connection, self.adapter_path.clone())
            .await
            .map_err(daemon_error)
    }

    async fn media(&self) -> Result<MediaProxy<'static>, DaemonError> {
        MediaProxy::new(&self.connection, self.adapter_path.clone())
            .await
            .map_err(daemon_error)
    }
}

#[async_trait]
impl DaemonRegistrar for BluezRegistrar {
    async fn register_application(&self, path: &str) -> Result<(), DaemonError> {
        let application = target_path(path)?;
        self.gatt_manager()
            .await?
            .register_application(&application, HashMap::new())
            .await
            .map_err(daemon_error)
    }

    async fn unregister_application(&self, path: &str) -> Result<(), DaemonError> {
        let application = target_path(path)?;
        self.gatt_manager()
            .await?
            .unregister_application(&application)
            .await
            .map_err(daemon_error)
    }

    async fn register_advertisement(&self, path: &str) -> Result<(), DaemonError> {
        let advertisement = target_path(path)?;
        self.advertising_manager()
            .await?
            .register_advertisement(&advertisement, HashMap::new())
            .await
            .map_err(daemon_error)
    }

    async fn unregister_advertisement(&self, path: &str) -> Result<(), DaemonError> {
        let advertisement = target_path(path)?;
        self.advertising_manager()
            .await?
            .unregister_advertisement(&advertisement)
            .await
            .map_err(daemon_error)
    }

    async fn register_endpoint(&self, endpoint: &MediaEndpoint) -> Result<(), DaemonError> {
        let path = target_path(&endpoint.path)?;
        let mut properties = HashMap::new();
        properties.insert("UUID", Value::from(endpoint.uuid.as_str()));
        properties.insert("Codec", Value::from(endpoint.codec));
        properties.insert(
            "Capabilities",
            Value::Array(endpoint.capabilities.as_slice().into()),
        );
        self.media()
            .await?
            .register_endpoint(&path, properties)
            .await
            .map_err(daemon_error)
    }

    async fn unregister_endpoint(&self, path: &str) -> Result<(), DaemonError> {
        let endpoint = target_path(path)?;
        self.media()
            .await?
            .unregister_endpoint(&endpoint)
            .await
            .map_err(daemon_error)
    }
}
