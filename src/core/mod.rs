//! Core System Infrastructure
//!
//! Pieces that are not light- or GATT-specific: cooperative timers and the
//! boundary trait towards the BLE stack.

pub mod timer;
pub mod transport;
