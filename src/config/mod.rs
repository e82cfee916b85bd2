pub mod settings;

pub use settings::{
    LimitsConfig, PersistenceConfig, ProviderCredential, ProvidersConfig, PromptsConfig,
    RagConfig, ServerConfig, Settings, UploadsConfig,
};
