//! Characteristic Value Store
//!
//! Holds the only mutable state of the exposed tree: a characteristic's
//! current value and its subscription flag. Both live behind one mutex, and
//! change events are queued while that mutex is held so subscribers observe
//! them in mutation order.
//!
//! Two contexts call in here concurrently: the bus dispatcher
//! (`read`/`write`/`start_notify`/`stop_notify`) and the background sampler
//! (`update_value`).

use crate::domain::models::{hex_bytes, CharacteristicEvent, CharacteristicFlag};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, Span};

#[derive(Debug)]
struct ValueState {
    value: Vec<u8>,
    notifying: bool,
}

pub struct CharacteristicStore {
    path: String,
    uuid: String,
    service_path: String,
    flags: Vec<CharacteristicFlag>,
    state: Mutex<ValueState>,
    event_sender: mpsc::UnboundedSender<CharacteristicEvent>,
    span: Span,
}

impl std::fmt::Debug for CharacteristicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacteristicStore")
            .field("path", &self.path)
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl CharacteristicStore {
    pub fn new(
        path: impl Into<String>,
        uuid: impl Into<String>,
        service_path: impl Into<String>,
        initial_value: Vec<u8>,
        event_sender: mpsc::UnboundedSender<CharacteristicEvent>,
        span: Span,
    ) -> Self {
        Self {
            path: path.into(),
            uuid: uuid.into(),
            service_path: service_path.into(),
            flags: CharacteristicFlag::ALL.to_vec(),
            state: Mutex::new(ValueState {
                value: initial_value,
                notifying: false,
            }),
            event_sender,
            span,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    pub fn flags(&self) -> &[CharacteristicFlag] {
        &self.flags
    }

    /// Current value without the audit entry (property getter path).
    pub fn value(&self) -> Vec<u8> {
        self.lock().value.clone()
    }

    pub fn is_notifying(&self) -> bool {
        self.lock().notifying
    }

    /// `ReadValue`: returns the current value.
    pub fn read(&self) -> Vec<u8> {
        let value = self.lock().value.clone();
        let _enter = self.span.enter();
        info!("ReadValue: client read {}", hex_bytes(&value));
        value
    }

    /// `WriteValue`: replaces the value and always emits value-changed,
    /// whether or not anyone is subscribed.
    pub fn write(&self, value: Vec<u8>) {
        let _enter = self.span.enter();
        info!(
            "WriteValue: client wrote {} bytes {}",
            value.len(),
            hex_bytes(&value)
        );
        let mut state = self.lock();
        state.value = value;
        self.emit_value(&state);
    }

    /// `StartNotify`: subscribes, then pushes the current value right away.
    ///
    /// A repeated call emits no second `Notifying` signal but still re-emits
    /// the current value.
    pub fn start_notify(&self) {
        let _enter = self.span.enter();
        info!("StartNotify: client subscribed");
        let mut state = self.lock();
        if !state.notifying {
            state.notifying = true;
            self.emit(CharacteristicEvent::NotifyingChanged {
                path: self.path.clone(),
                notifying: true,
            });
        }
        self.emit_value(&state);
    }

    /// `StopNotify`: unsubscribes; a no-op when not subscribed.
    pub fn stop_notify(&self) {
        let _enter = self.span.enter();
        info!("StopNotify: client unsubscribed");
        let mut state = self.lock();
        if state.notifying {
            state.notifying = false;
            self.emit(CharacteristicEvent::NotifyingChanged {
                path: self.path.clone(),
                notifying: false,
            });
        }
    }

    /// Sampler push: replaces the value, emits only while subscribed.
    pub fn update_value(&self, value: Vec<u8>) {
        let _enter = self.span.enter();
        let mut state = self.lock();
        state.value = value;
        if state.notifying {
            debug!("Pushing {} to subscribers", hex_bytes(&state.value));
            self.emit_value(&state);
        } else {
            trace!("Value updated without subscribers");
        }
    }

    fn emit_value(&self, state: &ValueState) {
        self.emit(CharacteristicEvent::ValueChanged {
            path: self.path.clone(),
            value: state.value.clone(),
        });
    }

    fn emit(&self, event: CharacteristicEvent) {
        if self.event_sender.send(event).is_err() {
            // Dispatch loop already gone (shutdown); nothing to deliver to.
            trace!("Dropped change event for {}", self.path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ValueState> {
        // A panic elsewhere cannot leave the pair half-written: each
        // operation assigns whole fields.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
