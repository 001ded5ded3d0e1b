//! Tooling around the range guard membrane.
//!
//! This crate provides:
//! - Scenario runs: drive a JSON-described workload through a unit of work
//! - Dump decoding: turn an exported log into an explainable report
//! - Rendering: human-readable diagnostics for a decoded report
//! - Structured logging: JSONL evidence lines plus an artifact index

#![forbid(unsafe_code)]

pub mod decode;
pub mod render;
pub mod scenario;
pub mod structured_log;

pub use decode::{DecodeReport, DumpDecodeError, decode_dump, decode_dump_bytes, decode_dump_file};
pub use scenario::{Scenario, ScenarioError, ScenarioOutcome, run_scenario};
