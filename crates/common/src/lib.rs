//! Common types shared by the session crates and the host binary

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
