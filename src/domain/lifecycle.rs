//! Lifecycle Manager
//!
//! `start()` order: connect → build tree → export (application root first)
//! → start dispatch → adapter handle → power on + registration handshake
//! → sampler. Any failure is returned and leaves the partial state in place
//! for `stop()`.
//!
//! `stop()` order: unregister (best effort) → stop dispatch → join sampler
//! → retract entities in reverse → drop the connection. It never fails.
//!
//! Calling `stop()` while `start()` is still running is not supported; the
//! internal lock serialises the two, so `stop()` simply waits.
//!
//! Dropping a started server without `stop()` only halts the sampler and the
//! dispatch loop; nothing is unregistered or retracted.

use crate::domain::adapter::PowerController;
use crate::domain::characteristic::CharacteristicStore;
use crate::domain::error::PeripheralError;
use crate::domain::object_tree::{Entity, ObjectPaths, ObjectTree};
use crate::domain::ports::{BusConnector, PeripheralBus, SensorSource};
use crate::domain::registration::{unregister_all, RegistrationOrchestrator, RegistrationTargets};
use crate::domain::sampler::{SampleLoop, Sampler};
use crate::domain::settings::Settings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Everything `start()` allocated, in construction order.
struct Running {
    bus: Arc<dyn PeripheralBus>,
    tree: Option<ObjectTree>,
    exported: Vec<Entity>,
    targets: Option<RegistrationTargets>,
    sampler: Option<Sampler>,
}

pub struct GattServer {
    settings: Settings,
    connector: Arc<dyn BusConnector>,
    sensor: Arc<dyn SensorSource>,
    started: AtomicBool,
    running: Mutex<Option<Running>>,
    span: Span,
}

impl GattServer {
    pub fn new(
        settings: Settings,
        connector: Arc<dyn BusConnector>,
        sensor: Arc<dyn SensorSource>,
    ) -> Self {
        let span = info_span!("gatt_server", name = %settings.local_name);
        Self {
            settings,
            connector,
            sensor,
            started: AtomicBool::new(false),
            running: Mutex::new(None),
            span,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Bring the peripheral up. A second call while started is a no-op.
    pub async fn start(&self) -> Result<(), PeripheralError> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("start() ignored, already started");
            return Ok(());
        }
        self.start_inner().instrument(self.span.clone()).await
    }

    async fn start_inner(&self) -> Result<(), PeripheralError> {
        let mut slot = self.running.lock().await;

        let bus = self.connector.connect().await?;
        let running = slot.insert(Running {
            bus: bus.clone(),
            tree: None,
            exported: Vec::new(),
            targets: None,
            sampler: None,
        });

        let (event_sender, events) = mpsc::unbounded_channel();
        let tree = ObjectTree::build(
            &self.settings,
            &ObjectPaths::default(),
            event_sender,
            &self.span,
        )?;
        let targets = RegistrationTargets::from_tree(&tree)?;
        running.targets = Some(targets.clone());
        let sampled = tree.sampled_characteristic();

        let mut failure = None;
        for entity in tree.entities() {
            info!("Export {:?}...", entity);
            if let Err(e) = bus.export(entity).await {
                failure = Some(e);
                break;
            }
            running.exported.push(entity.clone());
        }
        running.tree = Some(tree);
        if let Some(e) = failure {
            warn!("Export failed: {}", e);
            return Err(e);
        }

        // The daemon calls back into us while handling RegisterApplication.
        bus.start_dispatch(events)?;

        let power = PowerController::new(bus.adapter().await?);
        let mut orchestrator = RegistrationOrchestrator::new(
            bus.registrar(),
            self.settings.registration_timeout(),
            info_span!(parent: &self.span, "registration"),
        );
        orchestrator.run(bus.as_ref(), &power, &targets).await?;

        match sampled {
            Some(target) => {
                let path = target.path().to_string();
                let sampler = Sampler::start(
                    SampleLoop::new(self.sensor.clone(), target),
                    self.settings.sample_period(),
                    info_span!(parent: &self.span, "sampler", target = %path),
                )?;
                running.sampler = Some(sampler);
            }
            None => info!("No sampled characteristic, sampler not started"),
        }

        info!(
            "Started GATT server: LocalName='{}' service={}",
            self.settings.local_name, self.settings.service_uuid
        );
        Ok(())
    }

    /// Tear everything down. Safe before `start()`, twice, or after a failed start.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop_inner().instrument(self.span.clone()).await
    }

    async fn stop_inner(&self) {
        let Some(mut running) = self.running.lock().await.take() else {
            return;
        };
        let bus = running.bus.clone();

        if let Some(targets) = &running.targets {
            unregister_all(
                bus.registrar().as_ref(),
                targets,
                self.settings.registration_timeout(),
            )
            .await;
        }

        bus.stop_dispatch();

        if let Some(mut sampler) = running.sampler.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || sampler.stop()).await {
                warn!("Sampler shutdown warning: {}", e);
            }
        }

        for entity in running.exported.iter().rev() {
            if let Err(e) = bus.retract(entity).await {
                warn!("Retract {} warning: {}", entity.path(), e);
            }
        }
        running.exported.clear();
        running.tree = None;
        drop(running);
        info!("Stopped GATT server");
    }

    /// Live characteristic stores (empty when not started).
    pub async fn characteristics(&self) -> Vec<Arc<CharacteristicStore>> {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|running| running.tree.as_ref())
            .map(|tree| tree.characteristics().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_sampling(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|running| running.sampler.as_ref())
            .map(Sampler::is_running)
            .unwrap_or(false)
    }
}

impl Drop for GattServer {
    fn drop(&mut self) {
        if !*self.started.get_mut() {
            return;
        }
        warn!(
            parent: &self.span,
            "Dropped without stop(), daemon registrations left in place"
        );
        if let Some(running) = self.running.get_mut().as_mut() {
            running.bus.stop_dispatch();
            if let Some(sampler) = running.sampler.take() {
                sampler.detach();
            }
        }
    }
}
