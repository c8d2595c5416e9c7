pub mod config;
pub mod error;
pub mod host;
pub mod naming;
pub mod path_safety;
pub mod seed;
pub mod symbolize;
pub mod transfer;

pub use error::{ConfigError, Disposition, ErrorKind, SymfileError};
