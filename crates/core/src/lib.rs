pub mod config;
pub mod error;
pub mod glob;
pub mod sourcemap;
pub mod types;

pub use config::{BuildConfig, load_config};
pub use error::{Error, Result};
pub use types::*;
