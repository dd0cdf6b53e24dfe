pub mod config;
pub mod error;
pub mod fetch;
pub mod package;

pub use config::*;
pub use error::*;
pub use fetch::*;
pub use package::*;
