use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::database::PersistenceClient;
use crate::document::{Chunker, DocumentParser, MultimodalExtractor};
use crate::metrics::MetricsService;
use crate::services::classifier::ToolUseClassifier;
use crate::services::context_builder::ContextBuilder;
use crate::services::embedding::EmbeddingService;
use crate::services::enrichment::EnrichmentService;
use crate::services::ingestion::IngestionPipeline;
use crate::services::llm::{Completer, LlmClient};
use crate::services::orchestrator::CompletionOrchestrator;
use crate::services::retriever::Retriever;
use crate::services::summarizer::Summarizer;
use crate::services::tokenizer::TokenizerRegistry;
use crate::services::topk::TopKSelector;
use crate::utils::limiters::Limiters;

/// Everything an axum handler needs, constructed once at startup and
/// shared behind cheap `Arc` clones per request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub persistence: Arc<PersistenceClient>,
    pub ingestion: Arc<IngestionPipeline>,
    pub orchestrator: Arc<CompletionOrchestrator>,
    pub tokenizer: Arc<TokenizerRegistry>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let limiters = Arc::new(Limiters::new(&settings.limits));

        let persistence = Arc::new(PersistenceClient::new(&settings.persistence));
        let embedding = Arc::new(EmbeddingService::new(&settings.providers, limiters.clone()));

        let llm_timeout = Duration::from_secs(settings.limits.llm_completion_timeout_seconds);
        let llm_client = Arc::new(LlmClient::new(&settings.providers.llm, llm_timeout, limiters));
        let completer: Arc<dyn Completer> = llm_client.clone();
        let multimodal: Arc<dyn MultimodalExtractor> = llm_client;

        let parser = Arc::new(DocumentParser::new(multimodal));
        let chunker = Chunker::new(settings.rag.chunk_size, settings.rag.chunk_overlap);
        let tokenizer = Arc::new(TokenizerRegistry::new());
        let summarizer = Arc::new(Summarizer::new(completer.clone(), tokenizer.clone()));
        let classifier = Arc::new(ToolUseClassifier::new(completer.clone()));
        let enrichment = Arc::new(EnrichmentService::new(settings.providers.clone()));
        let top_k = Arc::new(TopKSelector::new(completer.clone()));
        let retriever = Arc::new(Retriever::new(
            persistence.clone(),
            embedding.clone(),
            top_k,
            settings.rag.similarity_threshold,
            settings.rag.retrieval_top_k,
        ));
        let context_builder = Arc::new(ContextBuilder::new(tokenizer.clone(), summarizer));

        let ingestion = Arc::new(IngestionPipeline::new(
            persistence.clone(),
            parser,
            embedding.clone(),
            chunker,
            settings.uploads.clone(),
            &settings.limits,
        ));

        let orchestrator = Arc::new(CompletionOrchestrator::new(
            persistence.clone(),
            ingestion.clone(),
            classifier,
            enrichment,
            retriever,
            context_builder,
            completer,
            embedding,
            tokenizer.clone(),
            settings.prompts.system_preamble.clone(),
            settings.rag.max_context_tokens,
            (settings.rag.weight_query, settings.rag.weight_query_context, settings.rag.weight_local_context),
            settings.rag.use_summarization,
        ));

        let metrics = Arc::new(MetricsService::new());

        Self { settings, persistence, ingestion, orchestrator, tokenizer, metrics }
    }
}
