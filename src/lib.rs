pub mod connector;
pub mod error;
pub mod relay;
pub mod relay_config;
pub mod resolver;
pub mod transport;

pub use error::{Error, Result};
