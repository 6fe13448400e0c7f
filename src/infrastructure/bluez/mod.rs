//! BlueZ Module
//!
//! Serves the peripheral to the BlueZ daemon over the D-Bus system bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      BluezConnector                      │
//! │   (opens the system bus, hands out a BluezBus)           │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┬──────────────┐
//!         │             │             │              │
//!         ▼             ▼             ▼              ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐
//! │  Objects  │  │ Dispatcher │  │ Proxies  │  │ Protocol │
//! │           │  │            │  │          │  │          │
//! │ - Service │  │ - Property │  │ - Adapter│  │ - Error  │
//! │ - Charac. │  │   changes  │  │ - GATT / │  │   names  │
//! │ - Advert. │  │            │  │   LE adv │  │          │
//! │ - Endpoint│  │            │  │ - Media  │  │          │
//! └───────────┘  └────────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Daemon error names and mapping
//! - [`objects`] - Interfaces exported for the daemon to call into
//! - [`proxies`] - Interfaces of the daemon this process calls
//! - [`connection`] - Port implementations tying the above together

pub mod connection;
pub mod objects;
pub mod protocol;
pub mod proxies;

pub use connection::BluezConnector;
