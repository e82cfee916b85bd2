pub mod classifier;
pub mod context_builder;
pub mod embedding;
pub mod enrichment;
pub mod ingestion;
pub mod llm;
pub mod orchestrator;
pub mod retriever;
pub mod summarizer;
pub mod tokenizer;
pub mod topk;

pub use classifier::{ClassificationResult, ToolUseClassifier};
pub use context_builder::{ContextBuilder, ContextBundle};
pub use embedding::EmbeddingService;
pub use enrichment::{EnrichmentResult, EnrichmentService};
pub use ingestion::IngestionPipeline;
pub use llm::{ChatMessage, Completer, LlmClient};
pub use orchestrator::{CompletionOrchestrator, OrchestratorResponse};
pub use retriever::Retriever;
pub use summarizer::{SummarizeResult, SummarizeStatus, Summarizer};
pub use tokenizer::{TokenizerError, TokenizerRegistry};
pub use topk::TopKSelector;
