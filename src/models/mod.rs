//! Domain models for the shipping orchestration engine.
//!
//! These types are shared across all modules: providers, cache, engine,
//! webhook, data, and report.

pub mod event;
pub mod provider;
pub mod rate;
pub mod report;
pub mod selection;
pub mod shipment;
pub mod webhook;
