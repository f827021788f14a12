//! Tuxlog - leveled logging for provisioning scripts
//!
//! This library provides the core functionality for the tuxlog tool: a log
//! session with console and rotating file sinks, and a wrapper that runs a
//! command while capturing its combined output into the log.

pub mod config;
pub mod logging;
pub mod runner;
