use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-document cap on extracted text, applied before prompt assembly.
pub const MAX_DOC_CHARS: usize = 5000;
/// Suffix appended when a document's extracted text is cut at the cap.
pub const TRUNCATION_MARKER: &str = "\n[Truncated]";
/// Upper bound on uploaded files per report request.
pub const MAX_FILES: usize = 5;
pub const CSV_PREVIEW_ROWS: usize = 20;
pub const CSV_PREVIEW_COLS: usize = 8;
/// Buffer substitute when a stream fails before emitting any text.
pub const PARTIAL_OUTPUT_PLACEHOLDER: &str = "[Partial output received]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Csv,
    Docx,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "csv" => Some(DocumentKind::Csv),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Self::from_extension(ext)
    }
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
    /// None when the filename carries an unrecognized extension.
    pub kind: Option<DocumentKind>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub source_name: String,
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub extracted: ExtractedText,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptContext {
    pub user_name: String,
    pub organization: String,
    pub documents: Vec<DocumentEntry>,
}

/// The only state that outlives a single action. Overwritten wholesale on
/// each generate action; follow-up answers never write back into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user_name: String,
    pub organization: String,
    pub full_prompt: String,
    pub report_text: String,
    pub generated_at: DateTime<Utc>,
}

pub use bpr_error::{BprError as Error, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("Csv"), Some(DocumentKind::Csv));
        assert_eq!(
            DocumentKind::from_extension("docx"),
            Some(DocumentKind::Docx)
        );
        assert_eq!(DocumentKind::from_extension("xlsx"), None);
    }

    #[test]
    fn kind_from_file_name() {
        assert_eq!(
            DocumentKind::from_file_name("report.final.PDF"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::from_file_name("no_extension"), None);
        assert_eq!(DocumentKind::from_file_name(".docx"), None);
    }
}
