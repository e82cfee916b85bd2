use std::sync::Arc;

use tracing::{info, warn};

use crate::database::{Author, PersistenceClient, Role, Thread, VectorMetadata, VectorSource};
use crate::models::chat::ChatCompletionRequest;
use crate::services::classifier::ToolUseClassifier;
use crate::services::context_builder::ContextBuilder;
use crate::services::embedding::EmbeddingService;
use crate::services::enrichment::EnrichmentService;
use crate::services::ingestion::IngestionPipeline;
use crate::services::llm::{ChatMessage, Completer};
use crate::services::retriever::Retriever;
use crate::services::tokenizer::TokenizerRegistry;
use crate::utils::error::ApiError;

const REASONER_PURPOSE: &str = "reasoner";
const PLACEHOLDER_REPLY: &str = "I'm sorry, I wasn't able to generate a response right now. Please try again shortly.";

#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    pub thread_id: String,
    pub message_id: String,
    pub content: String,
    pub tokens_spent: u64,
    pub cost: f64,
}

/// Drives one completion request end to end: thread resolution,
/// message persistence and file vectorization, query extraction,
/// optional tool-use enrichment, retrieval, context fitting, the LLM
/// call, and response persistence.
///
/// State machine: `Received -> ThreadResolved -> MessagesPersisted ->
/// QueryIdentified -> (Enriched?) -> ContextFit -> LLMCalled ->
/// ResponsePersisted -> Done`. A failure past `ThreadResolved` never
/// rolls back already-persisted messages or vectors.
pub struct CompletionOrchestrator {
    persistence: Arc<PersistenceClient>,
    ingestion: Arc<IngestionPipeline>,
    classifier: Arc<ToolUseClassifier>,
    enrichment: Arc<EnrichmentService>,
    retriever: Arc<Retriever>,
    context_builder: Arc<ContextBuilder>,
    llm: Arc<dyn Completer>,
    embedding: Arc<EmbeddingService>,
    tokenizer: Arc<TokenizerRegistry>,
    system_preamble: String,
    max_context_tokens: usize,
    weights: (f32, f32, f32),
    use_summarization: bool,
}

impl CompletionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persistence: Arc<PersistenceClient>,
        ingestion: Arc<IngestionPipeline>,
        classifier: Arc<ToolUseClassifier>,
        enrichment: Arc<EnrichmentService>,
        retriever: Arc<Retriever>,
        context_builder: Arc<ContextBuilder>,
        llm: Arc<dyn Completer>,
        embedding: Arc<EmbeddingService>,
        tokenizer: Arc<TokenizerRegistry>,
        system_preamble: String,
        max_context_tokens: usize,
        weights: (f32, f32, f32),
        use_summarization: bool,
    ) -> Self {
        Self {
            persistence,
            ingestion,
            classifier,
            enrichment,
            retriever,
            context_builder,
            llm,
            embedding,
            tokenizer,
            system_preamble,
            max_context_tokens,
            weights,
            use_summarization,
        }
    }

    pub async fn complete(&self, request: ChatCompletionRequest) -> Result<OrchestratorResponse, ApiError> {
        if request.messages.is_empty() {
            return Err(ApiError::Validation("messages must not be empty".to_string()));
        }

        let thread = self.resolve_thread(&request).await?;
        info!(thread_id = %thread.thread_id, "orchestrator: ThreadResolved");

        let mut query: Option<(String, String)> = None;
        for incoming in &request.messages {
            let role = parse_role(&incoming.role)?;
            let (file_refs, query_context_parts) = self.validate_attachments(&incoming.attachments).await;

            self.persistence
                .create_message(&thread.thread_id, role, &incoming.content, request.author.clone(), file_refs.clone())
                .await?;

            for file_id in &file_refs {
                if let Err(e) = self.ingestion.vectorize_file(&thread.thread_id, file_id).await {
                    warn!("orchestrator: vectorization failed for file {file_id}: {e}");
                }
            }

            if role == Role::User {
                query = Some((incoming.content.clone(), query_context_parts.join("\n\n")));
            }
        }
        info!(thread_id = %thread.thread_id, "orchestrator: MessagesPersisted");

        let (query_text, mut query_context) = query
            .ok_or_else(|| ApiError::Validation("request must contain at least one user message".to_string()))?;
        info!(thread_id = %thread.thread_id, "orchestrator: QueryIdentified");

        if request.purpose == REASONER_PURPOSE {
            let classification = self.classifier.classify(&query_text, &request.model).await;
            if !classification.tools.is_empty() {
                let enrichment_text = self.enrichment.enrich(&classification).await;
                if !enrichment_text.is_empty() {
                    if !query_context.is_empty() {
                        query_context.push_str("\n\n");
                    }
                    query_context.push_str(&enrichment_text);
                }
                info!(thread_id = %thread.thread_id, tools = ?classification.tools, "orchestrator: Enriched");
            }
        }

        let local_context = match self.retriever.retrieve(&thread.thread_id, &query_text, &request.model).await {
            Ok(text) => text,
            Err(e) => {
                warn!("orchestrator: retrieval failed, proceeding without local context: {e}");
                String::new()
            }
        };

        let bundle = self
            .context_builder
            .build(
                &query_text,
                &query_context,
                &local_context,
                self.max_context_tokens,
                &request.provider,
                &request.model,
                self.weights,
                self.use_summarization,
            )
            .await;
        info!(thread_id = %thread.thread_id, total_tokens = bundle.total_tokens, "orchestrator: ContextFit");

        let mut system_content = self.system_preamble.clone();
        if !bundle.local_context.is_empty() {
            system_content.push_str(&format!("\n\n[LOCAL DOCUMENT CONTEXT]\n{}", bundle.local_context));
        }
        let mut user_content = bundle.query.clone();
        if !bundle.query_context.is_empty() {
            user_content.push_str(&format!("\n\n[QUERY CONTEXT]\n{}", bundle.query_context));
        }

        let llm_messages = [ChatMessage::system(system_content), ChatMessage::user(user_content)];
        let reply = match self.llm.complete(&request.model, &llm_messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("orchestrator: LLM call failed, persisting placeholder reply: {e}");
                PLACEHOLDER_REPLY.to_string()
            }
        };
        info!(thread_id = %thread.thread_id, "orchestrator: LLMCalled");

        let assistant_message = self
            .persistence
            .create_message(&thread.thread_id, Role::Assistant, &reply, assistant_author(), Vec::new())
            .await?;

        if let Some(vector) = self.embedding.embed(&reply).await {
            let metadata = VectorMetadata {
                namespace: "messages".to_string(),
                source: Some(VectorSource::Message),
                message_id: Some(assistant_message.message_id.clone()),
                role: Some("assistant".to_string()),
                ..VectorMetadata::default()
            };
            if let Err(e) = self.persistence.create_vector(&thread.thread_id, vector, &reply, metadata, "llm").await {
                warn!("orchestrator: failed to store assistant reply vector: {e}");
            }
        }
        info!(thread_id = %thread.thread_id, "orchestrator: ResponsePersisted");

        let reply_tokens = self.tokenizer.count(&reply, &request.provider, &request.model).unwrap_or_else(|e| {
            warn!("orchestrator: tokenizer lookup failed for {}/{}, falling back to length estimate: {e}", request.provider, request.model);
            reply.chars().count() / 4
        });
        let tokens_spent = (bundle.total_tokens + reply_tokens) as u64;
        let cost = 0.0;

        if let Err(e) = self.persistence.update_thread_usage(&thread.thread_id, tokens_spent, cost).await {
            warn!("orchestrator: failed to record thread usage: {e}");
        }
        info!(thread_id = %thread.thread_id, "orchestrator: Done");

        Ok(OrchestratorResponse {
            thread_id: thread.thread_id,
            message_id: assistant_message.message_id,
            content: reply,
            tokens_spent,
            cost,
        })
    }

    async fn resolve_thread(&self, request: &ChatCompletionRequest) -> Result<Thread, ApiError> {
        if let Some(thread_id) = &request.thread_id {
            if let Some(thread) = self.persistence.get_thread(thread_id).await? {
                return Ok(thread);
            }
        }
        self.persistence
            .create_thread(&request.model, &request.provider, &request.purpose, request.author.clone())
            .await
    }

    /// Drops unknown attachments, keeps the rest; returns the surviving
    /// file ids and their decoded text (for `query_context`) in request order.
    async fn validate_attachments(&self, attachments: &[String]) -> (Vec<String>, Vec<String>) {
        let mut file_refs = Vec::with_capacity(attachments.len());
        let mut texts = Vec::new();

        for file_id in attachments {
            match self.persistence.get_file(file_id).await {
                Ok(Some(file)) => {
                    file_refs.push(file.file_id.clone());
                    if !file.content_text.is_empty() {
                        texts.push(file.content_text.clone());
                    }
                }
                Ok(None) => warn!("orchestrator: dropping unknown attachment {file_id}"),
                Err(e) => warn!("orchestrator: dropping attachment {file_id} after lookup error: {e}"),
            }
        }

        (file_refs, texts)
    }
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    match role {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "system" => Ok(Role::System),
        other => Err(ApiError::Validation(format!("unknown message role: {other}"))),
    }
}

fn assistant_author() -> Author {
    Author { author_type: "assistant".to_string(), user_id: "assistant".to_string(), name: "assistant".to_string() }
}
