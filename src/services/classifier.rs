use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::services::llm::{ChatMessage, Completer};

const SYSTEM_PROMPT: &str = "You are an expert at tools indicator. You have access to the following tools:\n\n\
1. web_search\n   - When the user's request requires up-to-date or real-time information.\n   \
- Parameters: query (string) - a concise query describing the information to retrieve.\n\n\
2. video\n   - When the user provides valid video URLs that require video-related processing.\n   \
- Parameters: urls (string[]) - an array of video URLs.\n\n\
3. web_scrap\n   - When the user provides non-video URLs that require direct content extraction.\n   \
- Parameters: urls (string[]) - an array of webpage URLs to scrape.\n\n\
Respond with JSON: {\"tool\": [...], \"web_search\": \"...\", \"videos\": [...], \"web_scrap\": [...]}.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    pub tools: Vec<String>,
    pub web_search: Option<String>,
    pub videos: Option<Vec<String>>,
    pub web_scrap: Option<Vec<String>>,
}

/// Schema-constrained tool-use classification.
pub struct ToolUseClassifier {
    llm: Arc<dyn Completer>,
}

impl ToolUseClassifier {
    pub fn new(llm: Arc<dyn Completer>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query_text: &str, model: &str) -> ClassificationResult {
        if query_text.trim().chars().count() < 3 {
            return ClassificationResult::default();
        }

        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query_text)];
        match self.llm.complete_json(model, &messages).await {
            Ok(raw) => normalize_result(raw, query_text),
            Err(e) => {
                warn!("tool-use classifier failed, defaulting to web_search: {e}");
                default_web_search(query_text)
            }
        }
    }
}

fn default_web_search(query_text: &str) -> ClassificationResult {
    ClassificationResult {
        tools: vec!["web_search".to_string()],
        web_search: Some(query_text.to_string()),
        videos: None,
        web_scrap: None,
    }
}

/// Synthesizes a missing `tools` list from whichever argument key is
/// present, and fills in sensible defaults for listed tools whose
/// arguments are missing.
fn normalize_result(raw: Value, query_text: &str) -> ClassificationResult {
    let obj = match raw.as_object() {
        Some(o) => o.clone(),
        None => return default_web_search(query_text),
    };

    let tool_list = obj.get("tool").and_then(Value::as_array);
    let web_search_value = obj.get("web_search").and_then(Value::as_str).filter(|s| !s.is_empty());
    let videos_value = obj.get("videos").and_then(Value::as_array);
    let web_scrap_value = obj.get("web_scrap").and_then(Value::as_array);

    if web_search_value.is_some() && tool_list.is_none() {
        return ClassificationResult {
            tools: vec!["web_search".to_string()],
            web_search: web_search_value.map(str::to_string),
            videos: None,
            web_scrap: None,
        };
    }

    if videos_value.is_some() && tool_list.is_none() {
        return ClassificationResult {
            tools: vec!["video".to_string()],
            web_search: None,
            videos: videos_value.map(to_string_vec),
            web_scrap: None,
        };
    }

    if web_scrap_value.is_some() && tool_list.is_none() {
        return ClassificationResult {
            tools: vec!["web_scrap".to_string()],
            web_search: None,
            videos: None,
            web_scrap: web_scrap_value.map(to_string_vec),
        };
    }

    if let Some(tools) = tool_list {
        let tools: Vec<String> = tools.iter().filter_map(Value::as_str).map(str::to_string).collect();

        let web_search = tools
            .iter()
            .any(|t| t == "web_search")
            .then(|| web_search_value.map(str::to_string).unwrap_or_else(|| query_text.to_string()));
        let videos = tools
            .iter()
            .any(|t| t == "video")
            .then(|| videos_value.map(to_string_vec).unwrap_or_default());
        let web_scrap = tools
            .iter()
            .any(|t| t == "web_scrap")
            .then(|| web_scrap_value.map(to_string_vec).unwrap_or_default());

        return ClassificationResult { tools, web_search, videos, web_scrap };
    }

    if let Some(web_search) = web_search_value {
        return ClassificationResult {
            tools: vec!["web_search".to_string()],
            web_search: Some(web_search.to_string()),
            videos: None,
            web_scrap: None,
        };
    }

    ClassificationResult::default()
}

fn to_string_vec(arr: &Vec<Value>) -> Vec<String> {
    arr.iter().filter_map(Value::as_str).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use crate::utils::error::ApiError;

    struct JsonCompleter(Value);

    #[async_trait]
    impl Completer for JsonCompleter {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, ApiError> {
            unimplemented!()
        }

        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            Ok(self.0.clone())
        }
    }

    struct FailingCompleter;

    #[async_trait]
    impl Completer for FailingCompleter {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, ApiError> {
            unimplemented!()
        }

        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            Err(ApiError::UpstreamTransient("classifier unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn short_query_short_circuits_without_calling_llm() {
        let classifier = ToolUseClassifier::new(Arc::new(FailingCompleter));
        let result = classifier.classify("hi", "gpt-4o").await;
        assert_eq!(result, ClassificationResult::default());
    }

    #[tokio::test]
    async fn synthesizes_tools_from_bare_web_search() {
        let raw = json!({"web_search": "weather in Tokyo"});
        let classifier = ToolUseClassifier::new(Arc::new(JsonCompleter(raw)));
        let result = classifier.classify("what's the weather in Tokyo", "gpt-4o").await;
        assert_eq!(result.tools, vec!["web_search"]);
        assert_eq!(result.web_search.as_deref(), Some("weather in Tokyo"));
    }

    #[tokio::test]
    async fn tool_list_without_web_search_argument_defaults_to_query() {
        let raw = json!({"tool": ["web_search"]});
        let classifier = ToolUseClassifier::new(Arc::new(JsonCompleter(raw)));
        let result = classifier.classify("who won the election today", "gpt-4o").await;
        assert_eq!(result.tools, vec!["web_search"]);
        assert_eq!(result.web_search.as_deref(), Some("who won the election today"));
    }

    #[tokio::test]
    async fn tool_list_with_video_fills_empty_urls_when_missing() {
        let raw = json!({"tool": ["video"]});
        let classifier = ToolUseClassifier::new(Arc::new(JsonCompleter(raw)));
        let result = classifier.classify("summarize this video please", "gpt-4o").await;
        assert_eq!(result.tools, vec!["video"]);
        assert_eq!(result.videos, Some(Vec::new()));
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_default_web_search() {
        let classifier = ToolUseClassifier::new(Arc::new(FailingCompleter));
        let result = classifier.classify("tell me about rust ownership", "gpt-4o").await;
        assert_eq!(result.tools, vec!["web_search"]);
        assert_eq!(result.web_search.as_deref(), Some("tell me about rust ownership"));
    }
}
