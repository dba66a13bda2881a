pub mod export;
pub mod prompt;

pub use export::{export_report, sanitize_for_export, ExportArtifact};
pub use prompt::{
    build_followup_prompt, build_report_prompt, format_document_block, session_context,
};
