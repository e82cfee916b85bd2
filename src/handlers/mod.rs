pub mod chat;
pub mod health;
pub mod metrics;
pub mod status;
pub mod upload;

pub use chat::chat_completions;
pub use health::health;
pub use metrics::metrics;
pub use status::status;
pub use upload::upload_files;
