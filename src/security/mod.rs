pub mod command_executor;
pub mod credentials;
pub mod token_manager;

pub use command_executor::{CommandError, CommandOutput, SafeCommandExecutor};
pub use credentials::{EnvCredentialProvider, GcloudCredentialProvider, StaticCredentialProvider};
pub use token_manager::SecureTokenManager;
