use async_trait::async_trait;
use bpr_core::{DocumentKind, CSV_PREVIEW_COLS, CSV_PREVIEW_ROWS};
use bpr_error::{BprError, Result};
use docx_rs::read_docx;

/// Format-specific document handlers. Each handler turns the raw upload
/// bytes into plain text; callers decide what to do with failures.
#[async_trait]
pub trait FormatHandler: Send + Sync {
    async fn extract(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

pub fn handler_for(kind: DocumentKind) -> Box<dyn FormatHandler> {
    match kind {
        DocumentKind::Pdf => Box::new(PdfHandler),
        DocumentKind::Csv => Box::new(CsvHandler),
        DocumentKind::Docx => Box::new(DocxHandler),
    }
}

fn extraction_error(name: &str, message: impl Into<String>) -> BprError {
    BprError::Extraction {
        source_name: name.to_string(),
        message: message.into(),
    }
}

/// PDF: text page by page, pages joined with newlines. A page with no
/// extractable text contributes an empty string, not an error.
pub struct PdfHandler;

#[async_trait]
impl FormatHandler for PdfHandler {
    async fn extract(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let data = bytes.to_vec();
        // pdf parsing is CPU-bound; keep it off the async runtime
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&data)
        })
        .await
        .map_err(BprError::from)?
        .map_err(|e| extraction_error(name, format!("pdf parse failed: {}", e)))?;

        Ok(pages.join("\n"))
    }
}

/// CSV: a bounded preview rather than full-fidelity extraction, since the
/// downstream prompt has a size budget.
pub struct CsvHandler;

#[async_trait]
impl FormatHandler for CsvHandler {
    async fn extract(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| extraction_error(name, format!("csv parse failed: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut more_rows = false;
        for record in reader.records() {
            let record =
                record.map_err(|e| extraction_error(name, format!("csv parse failed: {}", e)))?;
            if rows.len() == CSV_PREVIEW_ROWS {
                more_rows = true;
                break;
            }
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(render_preview(&headers, &rows, more_rows))
    }
}

fn render_preview(headers: &[String], rows: &[Vec<String>], more_rows: bool) -> String {
    let shown_cols = headers.len().min(CSV_PREVIEW_COLS);
    let more_cols = headers.len() > CSV_PREVIEW_COLS
        || rows.iter().any(|r| r.len() > CSV_PREVIEW_COLS);

    let mut widths = vec![0usize; shown_cols];
    for (i, h) in headers.iter().take(shown_cols).enumerate() {
        widths[i] = widths[i].max(h.chars().count());
    }
    for row in rows {
        for (i, cell) in row.iter().take(shown_cols).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render_line = |cells: &[String]| -> String {
        let mut line = String::new();
        for i in 0..shown_cols {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            if i > 0 {
                line.push_str("  ");
            }
            line.push_str(cell);
            for _ in cell.chars().count()..widths[i] {
                line.push(' ');
            }
        }
        if more_cols {
            line.push_str("  ...");
        }
        line.trim_end().to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(render_line(headers));
    for row in rows {
        out.push(render_line(row));
    }
    if more_rows {
        out.push("...".to_string());
    }
    out.join("\n")
}

/// DOCX: paragraph texts in document order, joined with newlines.
pub struct DocxHandler;

#[async_trait]
impl FormatHandler for DocxHandler {
    async fn extract(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let docx = read_docx(bytes)
            .map_err(|e| extraction_error(name, format!("docx parse failed: {}", e)))?;

        let json_value: serde_json::Value = serde_json::from_str(&docx.json())
            .map_err(|e| extraction_error(name, format!("docx structure unreadable: {}", e)))?;

        let mut paragraphs: Vec<String> = Vec::new();
        if let Some(children) = json_value
            .pointer("/document/children")
            .and_then(|v| v.as_array())
        {
            for node in children {
                if node.get("type").and_then(|t| t.as_str()) != Some("paragraph") {
                    continue;
                }
                let mut paragraph = String::new();
                if let Some(runs) = node.pointer("/data/children").and_then(|v| v.as_array()) {
                    for run in runs {
                        if let Some(texts) =
                            run.pointer("/data/children").and_then(|v| v.as_array())
                        {
                            for text in texts {
                                if let Some(s) =
                                    text.pointer("/data/text").and_then(|v| v.as_str())
                                {
                                    paragraph.push_str(s);
                                }
                            }
                        }
                    }
                }
                paragraphs.push(paragraph);
            }
        }

        Ok(paragraphs.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};
    use std::io::Cursor;

    #[tokio::test]
    async fn csv_preview_is_bounded() {
        let mut body = String::new();
        // 12 columns, 30 data rows
        let header: Vec<String> = (0..12).map(|i| format!("col{}", i)).collect();
        body.push_str(&header.join(","));
        body.push('\n');
        for row in 0..30 {
            let cells: Vec<String> = (0..12).map(|c| format!("r{}c{}", row, c)).collect();
            body.push_str(&cells.join(","));
            body.push('\n');
        }

        let out = CsvHandler
            .extract("big.csv", body.as_bytes())
            .await
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();

        // header + CSV_PREVIEW_ROWS rows + ellipsis row
        assert_eq!(lines.len(), 1 + CSV_PREVIEW_ROWS + 1);
        assert_eq!(*lines.last().unwrap(), "...");
        assert!(lines[0].contains("col7"));
        assert!(!lines[0].contains("col8"));
        assert!(lines[0].ends_with("..."));
        assert!(out.contains("r19c0"));
        assert!(!out.contains("r20c0"));
    }

    #[tokio::test]
    async fn csv_small_table_renders_fully() {
        let out = CsvHandler
            .extract("costs.csv", b"Cost\n100\n200\n300" as &[u8])
            .await
            .unwrap();
        assert_eq!(out, "Cost\n100\n200\n300");
    }

    #[tokio::test]
    async fn docx_paragraphs_join_with_newlines() {
        let docx = Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("First paragraph")))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Second paragraph")));
        let mut buf = Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();

        let out = DocxHandler
            .extract("doc.docx", buf.get_ref())
            .await
            .unwrap();
        assert_eq!(out, "First paragraph\nSecond paragraph");
    }

    #[tokio::test]
    async fn corrupt_pdf_reports_parse_failure() {
        let err = PdfHandler
            .extract("broken.pdf", b"%PDF-not-really" as &[u8])
            .await
            .unwrap_err();
        assert!(matches!(err, BprError::Extraction { .. }));
    }
}
