//! Registration Orchestrator
//!
//! Ordered handshake with the Bluetooth daemon:
//!
//! ```text
//! Idle → PoweringAdapter → RegisteringApplication → RegisteringAdvertisement
//!      → RegisteringEndpoint (optional) → Running
//!                     (any in-progress state) → Failed
//! ```
//!
//! Every step issues its call on a separate task and waits on a fresh
//! one-shot latch with a timeout, so the caller never blocks the dispatch
//! loop that has to answer the daemon's re-entrant calls. A call that
//! replies after its wait expired finds the latch gone and is ignored.
//! The first failure aborts the remaining steps; nothing is retried.

use crate::domain::adapter::PowerController;
use crate::domain::error::{DaemonError, PeripheralError};
use crate::domain::models::{MediaEndpoint, RegistrationState, RegistrationStep};
use crate::domain::object_tree::ObjectTree;
use crate::domain::ports::{DaemonRegistrar, PeripheralBus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn, Instrument, Span};

/// Object paths the handshake registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationTargets {
    pub application: String,
    pub advertisement: String,
    pub endpoint: Option<MediaEndpoint>,
}

impl RegistrationTargets {
    pub fn from_tree(tree: &ObjectTree) -> Result<Self, PeripheralError> {
        let application = tree
            .application()
            .ok_or_else(|| PeripheralError::export("/", "object tree has no application root"))?;
        let advertisement = tree
            .advertisement()
            .ok_or_else(|| PeripheralError::export("/", "object tree has no advertisement"))?;
        Ok(Self {
            application: application.to_string(),
            advertisement: advertisement.to_string(),
            endpoint: tree.media_endpoint().cloned(),
        })
    }
}

/// Start-scoped record of one handshake; dropped once `start()` returns.
#[derive(Debug, Default)]
pub struct RegistrationSession {
    completed: Vec<RegistrationStep>,
    adapter_powered: bool,
}

impl RegistrationSession {
    pub fn completed(&self) -> &[RegistrationStep] {
        &self.completed
    }

    pub fn is_complete(&self, step: RegistrationStep) -> bool {
        self.completed.contains(&step)
    }

    pub fn adapter_powered(&self) -> bool {
        self.adapter_powered
    }
}

pub struct RegistrationOrchestrator {
    registrar: Arc<dyn DaemonRegistrar>,
    step_timeout: Duration,
    state: RegistrationState,
    span: Span,
}

impl RegistrationOrchestrator {
    pub fn new(registrar: Arc<dyn DaemonRegistrar>, step_timeout: Duration, span: Span) -> Self {
        Self {
            registrar,
            step_timeout,
            state: RegistrationState::Idle,
            span,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Run the handshake. The bus must already be dispatching.
    pub async fn run(
        &mut self,
        bus: &dyn PeripheralBus,
        power: &PowerController,
        targets: &RegistrationTargets,
    ) -> Result<RegistrationSession, PeripheralError> {
        let span = self.span.clone();
        let result = self.run_steps(bus, power, targets).instrument(span).await;
        self.state = match &result {
            Ok(_) => RegistrationState::Running,
            Err(_) => RegistrationState::Failed,
        };
        result
    }

    async fn run_steps(
        &mut self,
        bus: &dyn PeripheralBus,
        power: &PowerController,
        targets: &RegistrationTargets,
    ) -> Result<RegistrationSession, PeripheralError> {
        if !bus.is_dispatching() {
            return Err(PeripheralError::DispatchNotRunning);
        }
        let mut session = RegistrationSession::default();

        self.state = RegistrationState::PoweringAdapter;
        session.adapter_powered = power.ensure_powered_on_logged().await;

        let registrar = self.registrar.clone();
        let path = targets.application.clone();
        self.step(&mut session, RegistrationStep::Application, async move {
            registrar.register_application(&path).await
        })
        .await?;

        let registrar = self.registrar.clone();
        let path = targets.advertisement.clone();
        self.step(&mut session, RegistrationStep::Advertisement, async move {
            registrar.register_advertisement(&path).await
        })
        .await?;

        if let Some(endpoint) = targets.endpoint.clone() {
            let registrar = self.registrar.clone();
            self.step(&mut session, RegistrationStep::Endpoint, async move {
                registrar.register_endpoint(&endpoint).await
            })
            .await?;
        }

        info!("Registered {:?}", session.completed());
        Ok(session)
    }

    async fn step<F>(
        &mut self,
        session: &mut RegistrationSession,
        step: RegistrationStep,
        call: F,
    ) -> Result<(), PeripheralError>
    where
        F: Future<Output = Result<(), DaemonError>> + Send + 'static,
    {
        self.state = RegistrationState::for_step(step);
        debug!("{}...", step);

        let (latch, completion) = oneshot::channel();
        tokio::spawn(
            async move {
                let result = call.await;
                if latch.send(result).is_err() {
                    debug!("{} replied after its wait expired; ignored", step);
                }
            }
            .instrument(Span::current()),
        );

        match tokio::time::timeout(self.step_timeout, completion).await {
            Ok(Ok(Ok(()))) => {
                debug!("{} OK", step);
                session.completed.push(step);
                Ok(())
            }
            Ok(Ok(Err(source))) => Err(PeripheralError::RegistrationRejected { step, source }),
            Ok(Err(_)) => Err(PeripheralError::RegistrationRejected {
                step,
                source: DaemonError::new("org.freedesktop.DBus.Error.NoReply", "call abandoned"),
            }),
            Err(_) => Err(PeripheralError::RegistrationTimeout {
                step,
                timeout: self.step_timeout,
            }),
        }
    }
}

/// Best-effort teardown: endpoint, advertisement, then application,
/// whether or not each was registered. Failures are logged only.
pub async fn unregister_all(
    registrar: &dyn DaemonRegistrar,
    targets: &RegistrationTargets,
    call_timeout: Duration,
) {
    if let Some(endpoint) = &targets.endpoint {
        log_teardown(
            "UnregisterEndpoint",
            call_timeout,
            registrar.unregister_endpoint(&endpoint.path),
        )
        .await;
    }
    log_teardown(
        "UnregisterAdvertisement",
        call_timeout,
        registrar.unregister_advertisement(&targets.advertisement),
    )
    .await;
    log_teardown(
        "UnregisterApplication",
        call_timeout,
        registrar.unregister_application(&targets.application),
    )
    .await;
}

async fn log_teardown<F>(what: &str, call_timeout: Duration, call: F)
where
    F: Future<Output = Result<(), DaemonError>>,
{
    match tokio::time::timeout(call_timeout, call).await {
        Ok(Ok(())) => debug!("{} OK", what),
        Ok(Err(e)) => warn!("{} warning: {}", what, e),
        Err(_) => warn!("{} warning: no reply within {:?}", what, call_timeout),
    }
}
