pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::SemgraphConfig;
pub use error::{Result, SemgraphError};
pub use types::*;
