//! Synthtrace - run-time defined trace events with packed binary records
//!
//! This library lets a caller describe a trace event at run time as an
//! ordered list of typed fields, compiles that description into a fixed
//! record layout, and emits records into a bounded log channel that
//! tolerates nested and concurrent writers.

pub mod channel;
pub mod cli;
pub mod command;
pub mod config;
pub mod emit;
pub mod error;
pub mod field;
pub mod flags;
pub mod format;
pub mod layout;
pub mod record;
pub mod registry;
pub mod schema;
pub mod types;
