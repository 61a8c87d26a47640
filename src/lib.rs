//! Live monitor for distributed energy resources (solar and wind entities).
//!
//! One authoritative entity store, mutated only through the engine's
//! single-writer queue, with name-sorted category views, a twelve-slot link
//! topology, an append-only measurement log and an undo stack kept in step
//! with every mutation. A background generator feeds random measurements
//! through the same queue.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generator;
pub mod measurement;
pub mod store;
pub mod telemetry;
pub mod topology;
pub mod undo;
pub mod views;

pub use error::{CoreError, CoreResult};
