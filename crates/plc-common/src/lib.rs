#![doc = "Common types shared across the PLC simulator workspace."]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod section;

pub use config::*;
pub use error::*;
pub use section::*;
