/// Extension to format family mapping for the parser registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    Pdf,
    RichText,
    Spreadsheet,
    Markdown,
    Html,
    Image,
    Audio,
    Video,
    TextLike,
}

impl FormatFamily {
    pub fn label(&self) -> &'static str {
        match self {
            FormatFamily::Pdf => "multimodal_pdf",
            FormatFamily::RichText => "multimodal_richtext",
            FormatFamily::Spreadsheet => "multimodal_spreadsheet",
            FormatFamily::Markdown => "native_markdown",
            FormatFamily::Html => "native_html",
            FormatFamily::Image => "multimodal_image",
            FormatFamily::Audio => "multimodal_audio",
            FormatFamily::Video => "multimodal_video",
            FormatFamily::TextLike => "text_direct",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            FormatFamily::Pdf | FormatFamily::RichText | FormatFamily::Spreadsheet => {
                "extract all original content as plain text"
            }
            FormatFamily::Image => "describe and OCR this image",
            FormatFamily::Audio => "transcribe this audio",
            FormatFamily::Video => "analyze this video",
            FormatFamily::Markdown | FormatFamily::Html | FormatFamily::TextLike => "",
        }
    }
}

const RICH_TEXT_EXTENSIONS: &[&str] = &["doc", "docx", "rtf", "dot", "dotx", "hwp", "hwpx"];
/// Rich-text extensions with a native reader in `document::native`; the
/// rest (`doc`, `dot`, `hwp` — legacy binary Word and Korean HWP) have
/// none and go straight to the multimodal extractor.
const NATIVE_RICH_TEXT_EXTENSIONS: &[&str] = &["docx", "dotx", "rtf", "hwpx"];
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls"];
const MARKDOWN_EXTENSIONS: &[&str] = &["md"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &["aac", "flac", "mp3", "m4a", "mpeg", "mpga", "opus", "pcm", "wav"];
const VIDEO_EXTENSIONS: &[&str] = &["flv", "mov", "mpg", "mpegps", "mp4", "webm", "wmv", "3gpp"];
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "py", "java", "js", "css", "c", "cpp", "h", "hpp", "cs", "php", "rb", "go",
    "rs", "sql", "ts", "swift", "kt", "csv", "tsv", "json", "xml", "yaml", "yml",
];
const TABULAR_EXTENSIONS: &[&str] = &["csv", "tsv"];
/// Extensions that exist in more than one family; tried video-then-audio.
const AMBIGUOUS_EXTENSIONS: &[&str] = &["mp4", "webm", "mpeg"];

/// Returns the ordered list of families to try for a given extension.
/// Most extensions resolve to exactly one family; the ambiguous set
/// resolves to `[Video, Audio]`; an extension outside every known set
/// resolves to an empty list, which callers must treat as "unsupported"
/// rather than falling back to a text read.
pub fn families_for_extension(ext: &str) -> Vec<FormatFamily> {
    let ext = ext.to_lowercase();

    if AMBIGUOUS_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Video, FormatFamily::Audio];
    }
    if ext == "pdf" {
        return vec![FormatFamily::Pdf];
    }
    if RICH_TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::RichText];
    }
    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Spreadsheet];
    }
    if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Markdown];
    }
    if HTML_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Html];
    }
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Image];
    }
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Audio];
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::Video];
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return vec![FormatFamily::TextLike];
    }
    Vec::new()
}

/// Whether a native (non-multimodal) reader exists for this rich-text
/// extension. Used by the parser to skip straight to the multimodal
/// fallback for `doc`/`dot`/`hwp`.
pub fn has_native_rich_text_reader(ext: &str) -> bool {
    NATIVE_RICH_TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

pub fn is_tabular(ext: &str) -> bool {
    TABULAR_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

pub fn is_text_like(ext: &str) -> bool {
    !ext.is_empty() && families_for_extension(ext) == vec![FormatFamily::TextLike]
}

/// The allowlist gate for ingestion: an extension with no resolvable
/// family is rejected outright rather than silently treated as text.
pub fn is_supported_extension(ext: &str) -> bool {
    !families_for_extension(ext).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_extensions_try_video_then_audio() {
        for ext in AMBIGUOUS_EXTENSIONS {
            assert_eq!(
                families_for_extension(ext),
                vec![FormatFamily::Video, FormatFamily::Audio]
            );
        }
    }

    #[test]
    fn pdf_resolves_to_pdf_family() {
        assert_eq!(families_for_extension("PDF"), vec![FormatFamily::Pdf]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        assert_eq!(families_for_extension("xyz123"), Vec::new());
        assert!(!is_supported_extension("exe"));
    }

    #[test]
    fn csv_and_tsv_are_tabular() {
        assert!(is_tabular("csv"));
        assert!(is_tabular("TSV"));
        assert!(!is_tabular("txt"));
    }

    #[test]
    fn spreadsheet_markdown_and_html_resolve_to_their_own_families() {
        assert_eq!(families_for_extension("xlsx"), vec![FormatFamily::Spreadsheet]);
        assert_eq!(families_for_extension("xls"), vec![FormatFamily::Spreadsheet]);
        assert_eq!(families_for_extension("md"), vec![FormatFamily::Markdown]);
        assert_eq!(families_for_extension("html"), vec![FormatFamily::Html]);
        assert_eq!(families_for_extension("htm"), vec![FormatFamily::Html]);
        assert!(!is_text_like("html"));
    }

    #[test]
    fn native_rich_text_reader_covers_docx_family_but_not_legacy_formats() {
        assert!(has_native_rich_text_reader("docx"));
        assert!(has_native_rich_text_reader("rtf"));
        assert!(has_native_rich_text_reader("hwpx"));
        assert!(!has_native_rich_text_reader("doc"));
        assert!(!has_native_rich_text_reader("hwp"));
    }
}
