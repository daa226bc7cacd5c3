/// Shipping Orchestrator: Shared Library
///
/// Multi-carrier rate shopping, rate selection, shipment creation with
/// provider fallback, and webhook normalization, behind a single
/// `ShippingEngine`.
///
/// Each serverless function in `api/` imports from this library
/// to keep handlers thin and logic reusable.

pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod provider;
pub mod registry;
pub mod report;
pub mod simulator;
pub mod webhook;

pub use engine::ShippingEngine;
pub use error::{Result, ShippingError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
