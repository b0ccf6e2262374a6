//! End-to-end runs through the public API.

mod config_runs;
mod scenarios;
