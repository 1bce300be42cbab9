//! Command-line front end for the inventory engine.
//!
//! The binary opens an engine over an in-memory graph, so every invocation
//! starts from an empty inventory. Request scripts replay a sequence of
//! PUT/GET/DELETE calls against it.

pub mod commands;
pub mod output;
pub mod script;

pub use output::OutputFormat;
