//! Adapter power control.

use crate::domain::error::PeripheralError;
use crate::domain::ports::AdapterControl;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PowerController {
    adapter: Arc<dyn AdapterControl>,
}

impl PowerController {
    pub fn new(adapter: Arc<dyn AdapterControl>) -> Self {
        Self { adapter }
    }

    /// Turn the adapter on unless it already is.
    pub async fn ensure_powered_on(&self) -> Result<(), PeripheralError> {
        if self.adapter.powered().await? {
            return Ok(());
        }
        info!("Adapter is off, powering on");
        self.adapter.set_powered(true).await
    }

    /// Like [`ensure_powered_on`](Self::ensure_powered_on) but never fails;
    /// an unpowered adapter surfaces later as a registration error.
    pub async fn ensure_powered_on_logged(&self) -> bool {
        match self.ensure_powered_on().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not power on adapter, continuing: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fakes::FakeAdapter;

    #[tokio::test]
    async fn test_powers_on_when_off() {
        let adapter = Arc::new(FakeAdapter::new(false));
        let controller = PowerController::new(adapter.clone());

        controller.ensure_powered_on().await.unwrap();
        assert!(adapter.is_powered());
        assert_eq!(adapter.set_calls(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_when_already_on() {
        let adapter = Arc::new(FakeAdapter::new(true));
        let controller = PowerController::new(adapter.clone());

        controller.ensure_powered_on().await.unwrap();
        controller.ensure_powered_on().await.unwrap();
        assert_eq!(adapter.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_logged_not_raised() {
        let adapter = Arc::new(FakeAdapter::failing());
        let controller = PowerController::new(adapter);
        assert!(!controller.ensure_powered_on_logged().await);
    }
}
