use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{ProviderCredential, ProvidersConfig};
use crate::services::classifier::ClassificationResult;

const SCRAPE_TRUNCATE_CHARS: usize = 10_000;

/// Normalized result of one enrichment adapter call.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub success: bool,
    pub payload_text: String,
    pub error: Option<String>,
}

impl EnrichmentResult {
    fn ok(payload_text: String) -> Self {
        Self { success: true, payload_text, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { success: false, payload_text: String::new(), error: Some(error.into()) }
    }
}

/// Web search, video transcript, and page scrape adapters, plus
/// the labeled-section assembly used to append enrichment output to a
/// query's context.
pub struct EnrichmentService {
    client: Client,
    providers: ProvidersConfig,
}

impl EnrichmentService {
    pub fn new(providers: ProvidersConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, providers }
    }

    /// Runs whichever adapters the classifier recommended and returns
    /// one text block with the non-empty sections, in
    /// web-search/video/scrape order.
    pub async fn enrich(&self, classification: &ClassificationResult) -> String {
        let mut sections = Vec::new();

        if classification.tools.iter().any(|t| t == "web_search") {
            if let Some(query) = &classification.web_search {
                let result = self.web_search(query).await;
                sections.push(format_section("WEB SEARCH RESULTS", &result, "No results found."));
            }
        }

        if classification.tools.iter().any(|t| t == "video") {
            for url in classification.videos.iter().flatten() {
                let result = self.video_transcript(url).await;
                sections.push(format_section(
                    "VIDEO TRANSCRIPT",
                    &result,
                    "Could not retrieve video transcript.",
                ));
            }
        }

        if classification.tools.iter().any(|t| t == "web_scrap") {
            for url in classification.web_scrap.iter().flatten() {
                let result = self.page_scrape(url).await;
                sections.push(format_section("WEB CONTENT", &result, "Could not retrieve web content."));
            }
        }

        sections.join("\n\n")
    }

    /// The preferred provider is configuration-driven; if it has no
    /// credential, fall back to any other configured provider.
    fn preferred_search_provider(&self) -> Option<(&'static str, &ProviderCredential)> {
        let preference = self.providers.search_preference.as_str();

        if preference == "linkup" && self.providers.linkup.is_configured() {
            return Some(("linkup", &self.providers.linkup));
        }
        if preference == "tavily" && self.providers.tavily.is_configured() {
            return Some(("tavily", &self.providers.tavily));
        }
        if self.providers.tavily.is_configured() {
            return Some(("tavily", &self.providers.tavily));
        }
        if self.providers.linkup.is_configured() {
            return Some(("linkup", &self.providers.linkup));
        }
        None
    }

    pub async fn web_search(&self, query: &str) -> EnrichmentResult {
        let Some((provider, credential)) = self.preferred_search_provider() else {
            warn!("web_search requested but no provider is configured");
            return EnrichmentResult::failed("no search provider configured");
        };

        match provider {
            "tavily" => self.tavily_search(credential, query).await,
            "linkup" => self.linkup_search(credential, query).await,
            _ => EnrichmentResult::failed("unknown search provider"),
        }
    }

    async fn tavily_search(&self, credential: &ProviderCredential, query: &str) -> EnrichmentResult {
        #[derive(Deserialize)]
        struct TavilyResponse {
            #[serde(default)]
            results: Vec<TavilyResult>,
        }
        #[derive(Deserialize)]
        struct TavilyResult {
            #[serde(default)]
            title: String,
            #[serde(default)]
            url: String,
            #[serde(default)]
            content: String,
        }

        let url = credential
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.tavily.com/search".to_string());
        let response = self
            .client
            .post(&url)
            .json(&json!({"api_key": credential.api_key, "query": query}))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => return EnrichmentResult::failed(format!("tavily returned {}", r.status())),
            Err(e) => return EnrichmentResult::failed(format!("tavily request failed: {e}")),
        };

        let parsed: TavilyResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return EnrichmentResult::failed(format!("failed to parse tavily response: {e}")),
        };

        if parsed.results.is_empty() {
            return EnrichmentResult::ok(String::new());
        }

        let mut text = String::new();
        for (i, result) in parsed.results.iter().enumerate() {
            text.push_str(&format!(
                "{}. **{}**\n   URL: {}\n   {}\n\n",
                i + 1,
                if result.title.is_empty() { "No Title" } else { &result.title },
                if result.url.is_empty() { "No URL" } else { &result.url },
                if result.content.is_empty() { "No content" } else { &result.content },
            ));
        }
        EnrichmentResult::ok(text)
    }

    async fn linkup_search(&self, credential: &ProviderCredential, query: &str) -> EnrichmentResult {
        #[derive(Deserialize)]
        struct LinkupResponse {
            #[serde(default)]
            results: Vec<LinkupResult>,
        }
        #[derive(Deserialize)]
        struct LinkupResult {
            #[serde(default)]
            name: String,
            #[serde(default)]
            url: String,
            #[serde(default)]
            content: String,
        }

        let url = credential
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.linkup.so/v1/search".to_string());
        let mut request = self.client.post(&url).json(&json!({"q": query}));
        if let Some(key) = &credential.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => return EnrichmentResult::failed(format!("linkup returned {}", r.status())),
            Err(e) => return EnrichmentResult::failed(format!("linkup request failed: {e}")),
        };

        let parsed: LinkupResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return EnrichmentResult::failed(format!("failed to parse linkup response: {e}")),
        };

        if parsed.results.is_empty() {
            return EnrichmentResult::ok(String::new());
        }

        let mut text = String::new();
        for (i, result) in parsed.results.iter().enumerate() {
            text.push_str(&format!(
                "{}. **{}**\n   URL: {}\n   {}\n\n",
                i + 1,
                if result.name.is_empty() { "No Title" } else { &result.name },
                if result.url.is_empty() { "No URL" } else { &result.url },
                if result.content.is_empty() { "No content" } else { &result.content },
            ));
        }
        EnrichmentResult::ok(text)
    }

    pub async fn video_transcript(&self, url_or_id: &str) -> EnrichmentResult {
        let video_id = extract_video_id(url_or_id);
        if !self.providers.transcript.is_configured() {
            return EnrichmentResult::failed("no transcript provider configured");
        }

        #[derive(Deserialize)]
        struct TranscriptResponse {
            #[serde(default)]
            segments: Vec<TranscriptSegment>,
        }
        #[derive(Deserialize)]
        struct TranscriptSegment {
            #[serde(default)]
            text: String,
        }

        let base = self
            .providers
            .transcript
            .base_url
            .clone()
            .unwrap_or_else(|| "https://transcript.example/api".to_string());
        let url = format!("{}/transcripts/{video_id}", base.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(key) = &self.providers.transcript.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => return EnrichmentResult::failed(format!("transcript provider returned {}", r.status())),
            Err(e) => return EnrichmentResult::failed(format!("transcript request failed: {e}")),
        };

        let parsed: TranscriptResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return EnrichmentResult::failed(format!("failed to parse transcript response: {e}")),
        };

        let text = parsed.segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
        debug!(video_id, "fetched transcript");
        EnrichmentResult::ok(format!("Video ID: {video_id}\n\n{text}"))
    }

    pub async fn page_scrape(&self, url: &str) -> EnrichmentResult {
        if !self.providers.firecrawl.is_configured() {
            return EnrichmentResult::failed("no scrape provider configured");
        }

        #[derive(Deserialize)]
        struct ScrapeResponse {
            #[serde(default)]
            success: bool,
            data: Option<ScrapeData>,
        }
        #[derive(Deserialize)]
        struct ScrapeData {
            markdown: Option<String>,
            html: Option<String>,
        }

        let base = self
            .providers
            .firecrawl
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.firecrawl.dev/v1/scrape".to_string());
        let mut request = self.client.post(&base).json(&json!({"url": url}));
        if let Some(key) = &self.providers.firecrawl.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => return EnrichmentResult::failed(format!("firecrawl returned {}", r.status())),
            Err(e) => return EnrichmentResult::failed(format!("scrape request failed: {e}")),
        };

        let parsed: ScrapeResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return EnrichmentResult::failed(format!("failed to parse scrape response: {e}")),
        };

        if !parsed.success {
            return EnrichmentResult::failed("scrape provider reported failure");
        }

        let content = parsed
            .data
            .and_then(|d| d.markdown.or(d.html))
            .unwrap_or_default();
        EnrichmentResult::ok(format!("Source: {url}\n\n{}", truncate_scrape(&content)))
    }
}

fn truncate_scrape(content: &str) -> String {
    if content.chars().count() > SCRAPE_TRUNCATE_CHARS {
        let truncated: String = content.chars().take(SCRAPE_TRUNCATE_CHARS).collect();
        format!("{truncated}... [content truncated]")
    } else {
        content.to_string()
    }
}

fn format_section(label: &str, result: &EnrichmentResult, empty_message: &str) -> String {
    let body = if result.success && !result.payload_text.trim().is_empty() {
        result.payload_text.clone()
    } else if let Some(err) = &result.error {
        format!("{empty_message} ({err})")
    } else {
        empty_message.to_string()
    };
    format!("### {label}\n\n{body}")
}

/// Extracts a YouTube video id from several URL shapes, or returns the
/// input unchanged if it already looks like a bare id.
fn extract_video_id(url_or_id: &str) -> String {
    if let Some(rest) = url_or_id.split("watch?v=").nth(1) {
        return rest.split('&').next().unwrap_or(rest).to_string();
    }
    if let Some(rest) = url_or_id.split("youtu.be/").nth(1) {
        return rest.split('?').next().unwrap_or(rest).to_string();
    }
    url_or_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_watch_url() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=abc123&t=5s"), "abc123");
    }

    #[test]
    fn extracts_id_from_short_url() {
        assert_eq!(extract_video_id("https://youtu.be/xyz789?t=3"), "xyz789");
    }

    #[test]
    fn bare_id_passes_through() {
        assert_eq!(extract_video_id("already-an-id"), "already-an-id");
    }

    #[test]
    fn truncates_long_scrape_content() {
        let content = "a".repeat(SCRAPE_TRUNCATE_CHARS + 500);
        let truncated = truncate_scrape(&content);
        assert!(truncated.ends_with("... [content truncated]"));
        assert!(truncated.len() < content.len());
    }

    #[test]
    fn short_scrape_content_is_untouched() {
        assert_eq!(truncate_scrape("hello"), "hello");
    }

    #[test]
    fn failed_section_still_renders_with_label() {
        let result = EnrichmentResult::failed("no credential");
        let section = format_section("WEB CONTENT", &result, "Could not retrieve web content.");
        assert!(section.starts_with("### WEB CONTENT"));
        assert!(section.contains("Could not retrieve web content."));
        assert!(section.contains("no credential"));
    }
}
