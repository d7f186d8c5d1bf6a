//! BLE Light Service
//!
//! GATT-side state of the light service: who is connected, what they
//! subscribed to, and the indication flow that keeps the subscriber current.

pub mod advertising;
pub mod connection;
pub mod controller;
pub mod events;
pub mod scheduler;
pub mod services;
#[cfg(feature = "embedded")]
pub mod softdevice;
pub mod subscription;
