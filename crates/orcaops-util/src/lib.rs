//! Ambient stack shared by every OrcaOps crate: atomic filesystem writes,
//! duration parsing, configuration resolution, and logging setup. Nothing
//! spec-shaped lives here — see `orcaops-base` for that.

pub mod config;
pub mod duration;
pub mod fs;
pub mod logging;

pub use config::Config;
pub use fs::Fs;
