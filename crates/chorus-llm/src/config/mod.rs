pub mod credentials;
pub mod settings;

pub use credentials::{CredentialSource, StaticCredentials};
pub use settings::{builtin_presets, ClientConfig, HttpSettings, ProviderSettings};
