pub mod baseline;
pub mod config;
pub mod drift;
pub mod error;
pub mod exec;
pub mod health;
pub mod io;
pub mod killswitch;
pub mod paths;
pub mod review;
pub mod secrets;

pub use error::{LeashError, Result};
