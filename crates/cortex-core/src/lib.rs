pub mod config;
pub mod error;

pub use config::CortexConfig;
pub use error::{CortexError, Result};
