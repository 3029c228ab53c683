//! Versioned record schemas for Mod Garden.
//!
//! Every persisted record carries the schema version it was authored under.
//! This crate holds:
//!
//! - [`CodecRegistry`]: the shape contract of each known version
//! - [`MigrationChain`]: one pure step per `vN -> vN+1`, checked gap-free at startup
//! - [`MigrationEngine`]: walks a record up to a target version, validating each hop
//! - [`ops`]: field operations steps are written with
//! - [`builtin`]: the project record schema

#![deny(unsafe_code)]

pub mod builtin;
pub mod chain;
pub mod contract;
pub mod engine;
pub mod ops;
pub mod record;
pub mod registry;

pub use chain::{ChainBuilder, MigrationChain, MigrationStep, StepError};
pub use contract::{FieldKind, FieldSpec, ShapeContract, ShapeContractBuilder, StringFormat};
pub use engine::MigrationEngine;
pub use record::{Fields, VersionedRecord};
pub use registry::{CodecRegistry, RegistryBuilder};
