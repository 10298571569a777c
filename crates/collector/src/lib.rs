//! IISRecon collector: read-only enumeration of IIS hosts.
//!
//! Scripts are fixed in [`commands`]; nothing the collector runs changes
//! the target.

pub mod collector;
pub mod commands;
pub mod enumerator;
pub mod executor;
pub mod parsers;

pub use collector::{CollectionMode, Collector, CollectorConfig, HostScan};
pub use enumerator::IisEnumerator;
pub use executor::{CommandOutput, Executor, LocalExecutor, WinRmConfig, WinRmExecutor};
