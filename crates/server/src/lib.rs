//! Mod Garden record core service.
//!
//! Wires the schema engine, identifier issuer and credential issuer into a
//! [`SubmissionOrchestrator`](orchestrator::SubmissionOrchestrator) and
//! exposes it through the `modgarden-core` binary: one-shot commands and a
//! line-delimited JSON intake on stdin.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod config_reload;
pub mod intake;
pub mod orchestrator;
pub mod shutdown;
pub mod storage;
