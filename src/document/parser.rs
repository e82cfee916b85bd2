use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::utils::error::ApiError;

use super::formats::{self, FormatFamily};
use super::native;

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub text: String,
    pub tools_used: Vec<String>,
}

/// Adapter over the multimodal LLM call that backs PDF, rich-text,
/// image, audio, and video extraction. Implemented by the LLM
/// provider client; kept as a trait here so the parser has no direct
/// dependency on the services layer.
#[async_trait]
pub trait MultimodalExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], mime: &str, instruction: &str) -> Result<String, ApiError>;
}

/// Dispatches a file to a format-specific extractor and returns plain
/// text plus provenance. Extensions shared by more than one family
/// are tried in order until one succeeds. PDF, rich text, and
/// spreadsheets attempt a native in-process reader first and only
/// fall back to the multimodal extractor if that reader is unavailable
/// for the extension, errors, or returns nothing.
pub struct DocumentParser {
    extractor: Arc<dyn MultimodalExtractor>,
}

impl DocumentParser {
    pub fn new(extractor: Arc<dyn MultimodalExtractor>) -> Self {
        Self { extractor }
    }

    pub async fn parse(&self, filename: &str, bytes: &[u8], mime: &str) -> Result<ParsedDocument, ApiError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let families = formats::families_for_extension(&ext);
        if families.is_empty() {
            return Err(ApiError::Validation(format!(
                "unsupported file extension '.{ext}' for '{filename}'"
            )));
        }

        let mut tools_used = Vec::new();

        for family in &families {
            let attempt = self.attempt_family(&ext, bytes, mime, *family).await;

            match attempt {
                Ok((text, tool)) => {
                    tools_used.push(tool);
                    return Ok(ParsedDocument { text, tools_used });
                }
                Err(e) => {
                    tracing::debug!(extension = %ext, family = ?family, error = %e, "parser attempt failed");
                    tools_used.push(format!("{}_failed", family.label()));
                }
            }
        }

        Err(ApiError::Validation(format!(
            "no parser succeeded for '{filename}' (tried: {})",
            tools_used.join(", ")
        )))
    }

    async fn attempt_family(
        &self,
        ext: &str,
        bytes: &[u8],
        mime: &str,
        family: FormatFamily,
    ) -> Result<(String, String), ApiError> {
        match family {
            FormatFamily::TextLike => self.decode_text(ext, bytes),
            FormatFamily::Markdown => Ok((native::render_markdown_as_text(&decode_lossy(bytes)), "native_markdown".to_string())),
            FormatFamily::Html => Ok((native::render_html_as_text(&decode_lossy(bytes)), "native_html".to_string())),
            FormatFamily::Pdf => self.extract_with_native_fallback(bytes, mime, family, native::extract_pdf_text(bytes)).await,
            FormatFamily::Spreadsheet => {
                self.extract_with_native_fallback(bytes, mime, family, native::extract_spreadsheet_text(ext, bytes)).await
            }
            FormatFamily::RichText => self.extract_rich_text(ext, bytes, mime).await,
            FormatFamily::Image | FormatFamily::Audio | FormatFamily::Video => {
                self.extract_multimodal(bytes, mime, family).await
            }
        }
    }

    /// Subdivides rich text by concrete extension: `docx`/`dotx`/`rtf`/
    /// `hwpx` have a native reader and fall back to multimodal only on
    /// failure; `doc`/`dot`/`hwp` (legacy binary Word, HWP) have none
    /// and go straight to multimodal.
    async fn extract_rich_text(&self, ext: &str, bytes: &[u8], mime: &str) -> Result<(String, String), ApiError> {
        if !formats::has_native_rich_text_reader(ext) {
            return self.extract_multimodal(bytes, mime, FormatFamily::RichText).await;
        }

        let native_result = match ext {
            "docx" | "dotx" => native::extract_docx_text(bytes),
            "rtf" => native::extract_rtf_text(bytes),
            "hwpx" => native::extract_hwpx_text(bytes),
            _ => unreachable!("has_native_rich_text_reader gates this match"),
        };

        self.extract_with_native_fallback(bytes, mime, FormatFamily::RichText, native_result).await
    }

    async fn extract_with_native_fallback(
        &self,
        bytes: &[u8],
        mime: &str,
        family: FormatFamily,
        native_result: Result<String, String>,
    ) -> Result<(String, String), ApiError> {
        match native_result {
            Ok(text) if !text.trim().is_empty() => Ok((text, format!("native_{}", family.label().trim_start_matches("multimodal_")))),
            Ok(_) => {
                debug!(family = ?family, "native extraction returned no text, falling back to multimodal");
                self.extract_multimodal(bytes, mime, family).await
            }
            Err(e) => {
                debug!(family = ?family, error = %e, "native extraction failed, falling back to multimodal");
                self.extract_multimodal(bytes, mime, family).await
            }
        }
    }

    async fn extract_multimodal(
        &self,
        bytes: &[u8],
        mime: &str,
        family: FormatFamily,
    ) -> Result<(String, String), ApiError> {
        let text = self.extractor.extract(bytes, mime, family.instruction()).await?;
        Ok((text, family.label().to_string()))
    }

    fn decode_text(&self, ext: &str, bytes: &[u8]) -> Result<(String, String), ApiError> {
        let text = decode_lossy(bytes);

        if formats::is_tabular(ext) {
            let delimiter = if ext == "tsv" { '\t' } else { ',' };
            Ok((render_delimited_as_markdown_table(&text, delimiter), "text_tabular".to_string()))
        } else {
            Ok((text, "text_direct".to_string()))
        }
    }
}

fn decode_lossy(bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::UTF_8.decode(bytes);
    decoded.into_owned()
}

fn render_delimited_as_markdown_table(text: &str, delimiter: char) -> String {
    let mut lines = text.lines();
    let header = match lines.next() {
        Some(h) if !h.trim().is_empty() => h,
        _ => return String::new(),
    };

    let header_cells: Vec<&str> = header.split(delimiter).collect();
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&header_cells.join(" | "));
    out.push_str(" |\n|");
    out.push_str(&" --- |".repeat(header_cells.len()));
    out.push('\n');

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(delimiter).collect();
        out.push_str("| ");
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingExtractor;

    #[async_trait]
    impl MultimodalExtractor for FailingExtractor {
        async fn extract(&self, _bytes: &[u8], _mime: &str, _instruction: &str) -> Result<String, ApiError> {
            Err(ApiError::UpstreamTransient("no extractor configured in test".into()))
        }
    }

    fn parser() -> DocumentParser {
        DocumentParser::new(Arc::new(FailingExtractor))
    }

    #[tokio::test]
    async fn plain_text_is_decoded_directly() {
        let doc = parser().parse("notes.txt", b"hello world", "text/plain").await.unwrap();
        assert_eq!(doc.text, "hello world");
        assert_eq!(doc.tools_used, vec!["text_direct"]);
    }

    #[tokio::test]
    async fn csv_is_rendered_as_markdown_table() {
        let doc = parser()
            .parse("data.csv", b"name,age\nalice,30\nbob,40", "text/csv")
            .await
            .unwrap();
        assert!(doc.text.starts_with("| name | age |"));
        assert!(doc.text.contains("| alice | 30 |"));
        assert_eq!(doc.tools_used, vec!["text_tabular"]);
    }

    #[tokio::test]
    async fn markdown_is_rendered_as_plain_text() {
        let doc = parser()
            .parse("notes.md", b"# Title\n\nSome *text*.", "text/markdown")
            .await
            .unwrap();
        assert!(doc.text.contains("Title"));
        assert!(doc.text.contains("Some"));
        assert_eq!(doc.tools_used, vec!["native_markdown"]);
    }

    #[tokio::test]
    async fn html_is_stripped_to_visible_text() {
        let doc = parser()
            .parse("page.html", b"<html><body><p>hello <b>world</b></p></body></html>", "text/html")
            .await
            .unwrap();
        assert_eq!(doc.text, "hello world");
        assert_eq!(doc.tools_used, vec!["native_html"]);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_before_any_parser_runs() {
        let err = parser().parse("payload.exe", b"MZ\x90\x00", "application/octet-stream").await.unwrap_err();
        match err {
            ApiError::Validation(msg) => assert!(msg.contains("unsupported file extension")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_multimodal_file_fails_with_provenance() {
        let err = parser().parse("photo.png", b"\x89PNG", "image/png").await.unwrap_err();
        match err {
            ApiError::Validation(msg) => assert!(msg.contains("multimodal_image_failed")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ambiguous_extension_tries_video_then_audio_before_failing() {
        let err = parser().parse("clip.mp4", b"\x00\x00\x00", "video/mp4").await.unwrap_err();
        match err {
            ApiError::Validation(msg) => {
                assert!(msg.contains("multimodal_video_failed"));
                assert!(msg.contains("multimodal_audio_failed"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_docx_falls_back_to_multimodal_extractor() {
        let err = parser().parse("report.docx", b"not a real zip", "application/vnd.openxmlformats").await.unwrap_err();
        match err {
            ApiError::Validation(msg) => assert!(msg.contains("multimodal_richtext_failed")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn legacy_doc_extension_skips_native_reader_entirely() {
        let err = parser().parse("old.doc", b"\xd0\xcf\x11\xe0", "application/msword").await.unwrap_err();
        match err {
            ApiError::Validation(msg) => assert_eq!(msg, "no parser succeeded for 'old.doc' (tried: multimodal_richtext_failed)"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
