//! Common utilities and types shared across iisrecon crates.

pub mod error;
pub mod hash;
pub mod settings;
pub mod timestamp;

pub use error::{Error, Result};
pub use settings::Settings;
pub use timestamp::Timestamp;
