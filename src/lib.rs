//! nRF52820 S140 Light Indicator Library
//!
//! Host-testable core of the light firmware, organized as:
//!
//! - `core`: infrastructure (cooperative timers, stack transport boundary)
//! - `ble`: connection table, subscriptions, indication scheduling, advertising
//! - `light`: the light domain object
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod core;
pub mod error;
pub mod light;

pub use ble::controller::IndicationController;
pub use ble::scheduler::FlowState;
pub use error::Error;
