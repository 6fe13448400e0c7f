//! Peripheral state and logic, independent of the bus it is served over.

pub mod adapter;
pub mod characteristic;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod object_tree;
pub mod ports;
pub mod registration;
pub mod sampler;
pub mod settings;

#[cfg(test)]
pub(crate) mod fakes;
