mod formats;

pub use formats::{handler_for, CsvHandler, DocxHandler, FormatHandler, PdfHandler};

use bpr_core::{ExtractedText, UploadedDocument, MAX_DOC_CHARS, TRUNCATION_MARKER};
use bpr_error::BprError;
use tracing::warn;

/// Extract a single uploaded document into plain text.
///
/// This boundary never fails: a parse error (corrupt file, unsupported
/// internal structure, unrecognized extension) degrades into a visible
/// inline marker that is fed forward as if it were extracted text, so one
/// bad file never aborts the batch.
pub async fn extract_document(doc: &UploadedDocument) -> ExtractedText {
    let raw = match doc.kind {
        Some(kind) => handler_for(kind).extract(&doc.name, &doc.bytes).await,
        None => Err(BprError::Extraction {
            source_name: doc.name.clone(),
            message: "unsupported file type".to_string(),
        }),
    };

    let text = match raw {
        Ok(text) => text,
        Err(err) => {
            warn!(source = %doc.name, error = %err, "extraction degraded to inline marker");
            format!("[Error reading {}: {}]", doc.name, error_cause(&err))
        }
    };

    truncate_extracted(&doc.name, text)
}

fn error_cause(err: &BprError) -> String {
    match err {
        BprError::Extraction { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Apply the per-document cap. Content of at most `MAX_DOC_CHARS` characters
/// passes through unchanged; longer content is cut at exactly the cap and
/// the truncation marker appended.
pub fn truncate_extracted(source_name: &str, text: String) -> ExtractedText {
    if text.chars().count() <= MAX_DOC_CHARS {
        return ExtractedText {
            source_name: source_name.to_string(),
            text,
            truncated: false,
        };
    }

    let mut cut: String = text.chars().take(MAX_DOC_CHARS).collect();
    cut.push_str(TRUNCATION_MARKER);
    ExtractedText {
        source_name: source_name.to_string(),
        text: cut,
        truncated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpr_core::DocumentKind;

    fn doc(name: &str, bytes: Vec<u8>, kind: Option<DocumentKind>) -> UploadedDocument {
        UploadedDocument {
            name: name.to_string(),
            bytes,
            kind,
            description: None,
        }
    }

    #[test]
    fn short_text_passes_through_unchanged() {
        let text = "a".repeat(MAX_DOC_CHARS);
        let out = truncate_extracted("a.csv", text.clone());
        assert_eq!(out.text, text);
        assert!(!out.truncated);
        assert!(!out.text.contains("[Truncated]"));
    }

    #[test]
    fn long_text_is_cut_at_cap_with_marker() {
        let text = "b".repeat(MAX_DOC_CHARS + 17);
        let out = truncate_extracted("b.csv", text.clone());
        assert!(out.truncated);
        assert_eq!(
            out.text.chars().count(),
            MAX_DOC_CHARS + TRUNCATION_MARKER.chars().count()
        );
        let head: String = out.text.chars().take(MAX_DOC_CHARS).collect();
        let expected: String = text.chars().take(MAX_DOC_CHARS).collect();
        assert_eq!(head, expected);
        assert!(out.text.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn unknown_extension_yields_inline_marker() {
        let out = extract_document(&doc("notes.xyz", b"whatever".to_vec(), None)).await;
        assert_eq!(
            out.text,
            "[Error reading notes.xyz: unsupported file type]"
        );
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn corrupt_docx_yields_inline_marker() {
        let out = extract_document(&doc(
            "broken.docx",
            b"this is not a zip archive".to_vec(),
            Some(DocumentKind::Docx),
        ))
        .await;
        assert!(out.text.starts_with("[Error reading broken.docx: "));
        assert!(out.text.ends_with(']'));
    }

    #[tokio::test]
    async fn csv_extraction_feeds_the_cap() {
        let mut body = String::from("Cost\n");
        for i in 0..3 {
            body.push_str(&format!("{}\n", i * 100));
        }
        let out = extract_document(&doc(
            "costs.csv",
            body.into_bytes(),
            Some(DocumentKind::Csv),
        ))
        .await;
        assert!(out.text.contains("Cost"));
        assert!(!out.truncated);
    }
}
