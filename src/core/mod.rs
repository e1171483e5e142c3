pub mod config;
pub mod config_loader;
pub mod error;
pub mod session;
pub mod traits;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader, ConfigValidationResult};
pub use error::*;
pub use session::*;
pub use traits::*;
