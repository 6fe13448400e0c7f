//! In-memory port implementations for tests.

use crate::domain::error::{DaemonError, PeripheralError, SensorError};
use crate::domain::models::{CharacteristicEvent, MediaEndpoint, RegistrationStep};
use crate::domain::object_tree::Entity;
use crate::domain::ports::{
    AdapterControl, BusConnector, DaemonRegistrar, PeripheralBus, SensorSource,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrarCall {
    RegisterApplication(String),
    UnregisterApplication(String),
    RegisterAdvertisement(String),
    UnregisterAdvertisement(String),
    RegisterEndpoint(String),
    UnregisterEndpoint(String),
}

#[derive(Default)]
pub struct FakeRegistrar {
    calls: Mutex<Vec<RegistrarCall>>,
    rejections: Mutex<Vec<(RegistrationStep, DaemonError)>>,
    delays: Mutex<Vec<(RegistrationStep, Duration)>>,
    fail_unregister: AtomicBool,
    delayed_completions: AtomicUsize,
    dispatch_flag: Mutex<Option<Arc<AtomicBool>>>,
    saw_dispatching: AtomicBool,
}

impl FakeRegistrar {
    pub fn reject(&self, step: RegistrationStep, error: DaemonError) {
        self.rejections.lock().unwrap().push((step, error));
    }

    pub fn delay(&self, step: RegistrationStep, delay: Duration) {
        self.delays.lock().unwrap().push((step, delay));
    }

    pub fn fail_unregister(&self) {
        self.fail_unregister.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RegistrarCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn register_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RegistrarCall::RegisterApplication(_)
                        | RegistrarCall::RegisterAdvertisement(_)
                        | RegistrarCall::RegisterEndpoint(_)
                )
            })
            .count()
    }

    /// Delayed calls that eventually finished.
    pub fn completed_late(&self) -> usize {
        self.delayed_completions.load(Ordering::SeqCst)
    }

    /// Whether the dispatch loop was running when `RegisterApplication` came in.
    pub fn saw_dispatching(&self) -> bool {
        self.saw_dispatching.load(Ordering::SeqCst)
    }

    async fn register(&self, step: RegistrationStep, call: RegistrarCall) -> Result<(), DaemonError> {
        self.calls.lock().unwrap().push(call);
        if step == RegistrationStep::Application {
            let dispatching = self
                .dispatch_flag
                .lock()
                .unwrap()
                .as_ref()
                .map(|flag| flag.load(Ordering::SeqCst))
                .unwrap_or(false);
            self.saw_dispatching.store(dispatching, Ordering::SeqCst);
        }

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            self.delayed_completions.fetch_add(1, Ordering::SeqCst);
        }

        let rejection = self
            .rejections
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, e)| e.clone());
        match rejection {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn unregister(&self, call: RegistrarCall) -> Result<(), DaemonError> {
        self.calls.lock().unwrap().push(call);
        if self.fail_unregister.load(Ordering::SeqCst) {
            Err(DaemonError::new("org.bluez.Error.DoesNotExist", "Does Not Exist"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DaemonRegistrar for FakeRegistrar {
    async fn register_application(&self, path: &str) -> Result<(), DaemonError> {
        self.register(
            RegistrationStep::Application,
            RegistrarCall::RegisterApplication(path.to_string()),
        )
        .await
    }

    async fn unregister_application(&self, path: &str) -> Result<(), DaemonError> {
        self.unregister(RegistrarCall::UnregisterApplication(path.to_string()))
    }

    async fn register_advertisement(&self, path: &str) -> Result<(), DaemonError> {
        self.register(
            RegistrationStep::Advertisement,
            RegistrarCall::RegisterAdvertisement(path.to_string()),
        )
        .await
    }

    async fn unregister_advertisement(&self, path: &str) -> Result<(), DaemonError> {
        self.unregister(RegistrarCall::UnregisterAdvertisement(path.to_string()))
    }

    async fn register_endpoint(&self, endpoint: &MediaEndpoint) -> Result<(), DaemonError> {
        self.register(
            RegistrationStep::Endpoint,
            RegistrarCall::RegisterEndpoint(endpoint.path.clone()),
        )
        .await
    }

    async fn unregister_endpoint(&self, path: &str) -> Result<(), DaemonError> {
        self.unregister(RegistrarCall::UnregisterEndpoint(path.to_string()))
    }
}

pub struct FakeAdapter {
    powered: AtomicBool,
    set_calls: AtomicUsize,
    failing: bool,
}

impl FakeAdapter {
    pub fn new(powered: bool) -> Self {
        Self {
            powered: AtomicBool::new(powered),
            set_calls: AtomicUsize::new(0),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(false)
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdapterControl for FakeAdapter {
    async fn powered(&self) -> Result<bool, PeripheralError> {
        if self.failing {
            return Err(PeripheralError::Adapter("org.bluez.Error.NotReady".to_string()));
        }
        Ok(self.is_powered())
    }

    async fn set_powered(&self, powered: bool) -> Result<(), PeripheralError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.powered.store(powered, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeBus {
    registrar: Arc<FakeRegistrar>,
    adapter: Arc<FakeAdapter>,
    dispatching: Arc<AtomicBool>,
    exported: Mutex<Vec<String>>,
    retracted: Mutex<Vec<String>>,
    fail_export: Mutex<Option<String>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<CharacteristicEvent>>>,
    dispatch_starts: AtomicUsize,
}

impl FakeBus {
    pub fn with_registrar(registrar: Arc<FakeRegistrar>) -> Self {
        let dispatching = Arc::new(AtomicBool::new(false));
        *registrar.dispatch_flag.lock().unwrap() = Some(dispatching.clone());
        Self {
            registrar,
            adapter: Arc::new(FakeAdapter::new(false)),
            dispatching,
            exported: Mutex::new(Vec::new()),
            retracted: Mutex::new(Vec::new()),
            fail_export: Mutex::new(None),
            events: Mutex::new(None),
            dispatch_starts: AtomicUsize::new(0),
        }
    }

    pub fn set_dispatching(&self, dispatching: bool) {
        self.dispatching.store(dispatching, Ordering::SeqCst);
    }

    pub fn fail_export_of(&self, path: &str) {
        *self.fail_export.lock().unwrap() = Some(path.to_string());
    }

    pub fn exported(&self) -> Vec<String> {
        self.exported.lock().unwrap().clone()
    }

    pub fn retracted(&self) -> Vec<String> {
        self.retracted.lock().unwrap().clone()
    }

    pub fn adapter_handle(&self) -> Arc<FakeAdapter> {
        self.adapter.clone()
    }

    pub fn dispatch_starts(&self) -> usize {
        self.dispatch_starts.load(Ordering::SeqCst)
    }

    /// Drain the change events the dispatch loop would have turned into signals.
    pub fn drain_events(&self) -> Vec<CharacteristicEvent> {
        let mut events = Vec::new();
        if let Some(rx) = self.events.lock().unwrap().as_mut() {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

#[async_trait]
impl PeripheralBus for FakeBus {
    async fn export(&self, entity: &Entity) -> Result<(), PeripheralError> {
        if self.fail_export.lock().unwrap().as_deref() == Some(entity.path()) {
            return Err(PeripheralError::export(entity.path(), "object server refused"));
        }
        self.exported.lock().unwrap().push(entity.path().to_string());
        Ok(())
    }

    async fn retract(&self, entity: &Entity) -> Result<(), PeripheralError> {
        self.retracted.lock().unwrap().push(entity.path().to_string());
        Ok(())
    }

    fn start_dispatch(
        &self,
        events: mpsc::UnboundedReceiver<CharacteristicEvent>,
    ) -> Result<(), PeripheralError> {
        self.dispatch_starts.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events);
        self.set_dispatching(true);
        Ok(())
    }

    fn stop_dispatch(&self) {
        self.set_dispatching(false);
    }

    fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::SeqCst)
    }

    async fn adapter(&self) -> Result<Arc<dyn AdapterControl>, PeripheralError> {
        Ok(self.adapter.clone())
    }

    fn registrar(&self) -> Arc<dyn DaemonRegistrar> {
        self.registrar.clone()
    }
}

pub struct FakeConnector {
    bus: Arc<FakeBus>,
    connects: AtomicUsize,
    refuse: bool,
}

impl FakeConnector {
    pub fn new(bus: Arc<FakeBus>) -> Self {
        Self {
            bus,
            connects: AtomicUsize::new(0),
            refuse: false,
        }
    }

    pub fn refusing(bus: Arc<FakeBus>) -> Self {
        Self {
            refuse: true,
            ..Self::new(bus)
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn PeripheralBus>, PeripheralError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(PeripheralError::Connection(
                "org.freedesktop.DBus.Error.FileNotFound".to_string(),
            ));
        }
        Ok(self.bus.clone())
    }
}

/// Sensor that replays a script of readings (`Err(())` = failed read).
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Result<i32, ()>>>,
    repeat: Option<i32>,
    reads: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new(script: Vec<Result<i32, ()>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn repeating(reading: i32) -> Self {
        Self {
            repeat: Some(reading),
            ..Self::new(Vec::new())
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SensorSource for ScriptedSensor {
    fn read_milli(&self) -> Result<i32, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(reading)) => Ok(reading),
            Some(Err(())) => Err(SensorError::Parse("scripted failure".to_string())),
            None => self
                .repeat
                .ok_or_else(|| SensorError::Parse("script exhausted".to_string())),
        }
    }
}
