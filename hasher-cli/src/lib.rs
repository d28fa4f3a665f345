// HASHER CLI
// Pipeline orchestration, host supervision, and evolutionary seed training

//! # HASHER CLI
//!
//! The command-line surface of the HASHER training system: the stage
//! pipeline scheduler, the host-service supervisor and client, the
//! group-relative seed-search harness, and the terminal UI that ties them
//! together.

pub mod commands;
pub mod config;
pub mod counters;
pub mod host_client;
pub mod pipeline;
pub mod supervisor;
pub mod training;
pub mod tui;
