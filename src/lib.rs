//! ECHO-INTELNET: a scripted network-intrusion training terminal.
//!
//! - `scenario` - scenario descriptors and where they are loaded from
//! - `engine` - the session engine: link state machine, commands, decoding, progress
//! - `config` - timing configuration

pub mod config;
pub mod engine;
pub mod scenario;
