//! sql-warden - natural-language SQL behind a validation and approval gate.
//!
//! Generated (or hand-written) SQL is parsed, classified by risk, and
//! tracked by an approval state machine before anything reaches the
//! database. This library exposes the core modules for the `warden` binary
//! and for integration tests.

pub mod app;
pub mod approval;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod query;
pub mod safety;
pub mod service;
