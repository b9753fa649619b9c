//! Types shared across the MrDoc client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
