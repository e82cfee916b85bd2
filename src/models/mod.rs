pub mod chat;

pub use chat::{
    ChatCompletionErrorBody, ChatCompletionRequest, ChatCompletionResponse, IncomingMessage,
    UploadResponse, UploadedFileResult,
};
