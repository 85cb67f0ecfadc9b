//! The `aiperf` controller binary's library half: CLI parsing and the
//! system-controller orchestration (component C8, spec §4.8). Kept as
//! a library so the orchestration logic is unit-testable independent
//! of `main`'s process-level concerns (signal handling, exit codes).

pub mod cli;
pub mod controller;

pub use cli::Cli;
