use bpr_error::{BprError, Result};
use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use tracing::warn;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 15.0;
const BODY_WRAP_COLS: usize = 95;
const PT_TO_MM: f32 = 0.3528;

const REPLACEMENT: char = '?';

/// A character set the export font can render, with its membership test.
struct ExportEncoding {
    name: &'static str,
    keeps: fn(char) -> bool,
}

fn in_latin1(c: char) -> bool {
    (c as u32) <= 0xFF
}

fn in_ascii(c: char) -> bool {
    c.is_ascii()
}

/// Narrowing tiers, tried in order. The builtin PDF fonts carry a
/// single-byte character set, so anything wider is replaced rather than
/// allowed to fail the whole export.
const ENCODINGS: [ExportEncoding; 2] = [
    ExportEncoding {
        name: "latin-1",
        keeps: in_latin1,
    },
    ExportEncoding {
        name: "ascii",
        keeps: in_ascii,
    },
];

impl ExportEncoding {
    fn try_narrow(&self, s: &str) -> Option<String> {
        Some(
            s.chars()
                .map(|c| if (self.keeps)(c) { c } else { REPLACEMENT })
                .collect(),
        )
    }
}

/// Best-effort narrowing to the export character set. Idempotent:
/// narrowing an already-narrowed string returns it unchanged.
pub fn sanitize_for_export(s: &str) -> String {
    for encoding in &ENCODINGS {
        if let Some(narrowed) = encoding.try_narrow(s) {
            return narrowed;
        }
        warn!(encoding = encoding.name, "narrowing tier declined, falling through");
    }
    s.chars()
        .map(|c| if c.is_ascii() { c } else { REPLACEMENT })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Render the final report into a downloadable artifact.
///
/// The primary format is PDF; if rendering fails the raw, unsanitized
/// report text is offered as a plain-text download instead, so a completed
/// generation always has some exportable artifact.
pub fn export_report(
    user_name: &str,
    organization: &str,
    report_text: &str,
    generated_at: DateTime<Utc>,
) -> ExportArtifact {
    let safe_name = fallback_if_blank(sanitize_for_export(user_name.trim()), "User");
    let safe_org = fallback_if_blank(sanitize_for_export(organization.trim()), "Organization");
    let safe_report = sanitize_for_export(report_text);

    match render_pdf(&safe_name, &safe_org, &safe_report, generated_at) {
        Ok(bytes) => ExportArtifact {
            file_name: format!("BPR_Report_{}.pdf", safe_name),
            content_type: "application/pdf",
            bytes,
        },
        Err(err) => {
            err.log("export");
            warn!("pdf rendering failed, serving plain-text fallback");
            ExportArtifact {
                file_name: format!("BPR_Report_{}.txt", safe_name),
                content_type: "text/plain",
                bytes: report_text.as_bytes().to_vec(),
            }
        }
    }
}

fn fallback_if_blank(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn export_error(stage: &str, message: impl ToString) -> BprError {
    BprError::Export {
        stage: stage.to_string(),
        message: message.to_string(),
    }
}

fn render_pdf(
    name: &str,
    organization: &str,
    body: &str,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let title = "Business Process Reengineering Report";
    let (doc, page, layer) = PdfDocument::new(
        title,
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| export_error("font", e))?;
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| export_error("font", e))?;

    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT_MM - 20.0;

    // builtin fonts expose no metrics; center on the average glyph width
    let title_width = title.chars().count() as f32 * 14.0 * 0.5 * PT_TO_MM;
    let title_x = ((PAGE_WIDTH_MM - title_width) / 2.0).max(MARGIN_MM);
    current.use_text(title, 14.0, Mm(title_x), Mm(y), &bold);
    y -= 10.0;

    for line in [
        format!("Name: {}", name),
        format!("Organization: {}", organization),
        format!(
            "Generated: {}",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        ),
    ] {
        current.use_text(line, 11.0, Mm(MARGIN_MM), Mm(y), &regular);
        y -= 6.0;
    }
    y -= 4.0;

    for line in wrap_text(body, BODY_WRAP_COLS) {
        if y < MARGIN_MM {
            let (next_page, next_layer) =
                doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            current = doc.get_page(next_page).get_layer(next_layer);
            y = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        if !line.is_empty() {
            current.use_text(line, 10.0, Mm(MARGIN_MM), Mm(y), &regular);
        }
        y -= 5.0;
    }

    let mut bytes = Vec::new();
    doc.save(&mut std::io::BufWriter::new(&mut bytes))
        .map_err(|e| export_error("save", e))?;
    Ok(bytes)
}

/// Word-wrap to a column budget, preserving blank lines. Words wider than
/// the budget are hard-split.
fn wrap_text(text: &str, max_cols: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_cols = 0usize;
        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max_cols {
                if line_cols > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_cols = 0;
                }
                lines.push(chars[..max_cols].iter().collect());
                chars.drain(..max_cols);
            }
            if chars.is_empty() {
                continue;
            }
            let word_cols = chars.len();
            if line_cols > 0 && line_cols + word_cols + 1 > max_cols {
                lines.push(std::mem::take(&mut line));
                line_cols = 0;
            }
            if line_cols > 0 {
                line.push(' ');
                line_cols += 1;
            }
            line.extend(chars.iter());
            line_cols += word_cols;
        }
        lines.push(std::mem::take(&mut line));
    }
    lines
}
